// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use image::codecs::jpeg::JpegEncoder;
use rawpipe::api::RenderResult;
use rawpipe::error::Error;

pub fn save(result: &RenderResult, path: &Path, quality: u32) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(Error::InvalidQuality(quality).into());
    }
    // JPEG has no alpha; drop it.
    let rgb: Vec<u8> = result
        .pixels
        .chunks(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    let file = File::create(path).wrap_err_with(|| format!("Failed to create {:?}", path))?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality as u8);
    encoder
        .encode(
            &rgb,
            result.width as u32,
            result.height as u32,
            image::ExtendedColorType::Rgb8,
        )
        .wrap_err_with(|| format!("Failed to encode {:?}", path))?;
    Ok(())
}
