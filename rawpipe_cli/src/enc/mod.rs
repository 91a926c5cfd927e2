// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Encoded export of a finished render. Format is picked by extension; the
//! high-bit TIFF paths read the pipeline's float back buffer instead of the
//! packed 8-bit result.

pub mod jpeg;
pub mod png;
pub mod tiff;

use std::path::Path;

use color_eyre::eyre::{Result, eyre};
use rawpipe::api::RenderResult;
use rawpipe::pipeline::Pipeline;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Tiff,
}

pub fn for_path(path: &Path) -> Result<OutputFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
        "png" => Ok(OutputFormat::Png),
        "tif" | "tiff" => Ok(OutputFormat::Tiff),
        other => Err(eyre!(
            "Unsupported output extension {:?}; expected jpg, png or tif",
            other
        )),
    }
}

pub fn export(
    pipe: &Pipeline,
    result: &RenderResult,
    path: &Path,
    quality: u32,
    bits: u32,
) -> Result<()> {
    match for_path(path)? {
        OutputFormat::Jpeg => jpeg::save(result, path, quality),
        OutputFormat::Png => png::save(result, path),
        OutputFormat::Tiff => tiff::save(pipe, result, path, bits),
    }
}
