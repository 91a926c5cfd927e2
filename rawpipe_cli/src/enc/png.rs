// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use rawpipe::api::RenderResult;

pub fn save(result: &RenderResult, path: &Path) -> Result<()> {
    let buffer: image::RgbaImage = image::ImageBuffer::from_raw(
        result.width as u32,
        result.height as u32,
        result.pixels.clone(),
    )
    .ok_or_else(|| eyre!("Render result does not match its declared dimensions"))?;
    buffer
        .save_with_format(path, image::ImageFormat::Png)
        .wrap_err_with(|| format!("Failed to write {:?}", path))?;
    Ok(())
}
