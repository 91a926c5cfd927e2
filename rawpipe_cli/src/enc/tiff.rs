// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use image::ImageEncoder;
use image::codecs::tiff::TiffEncoder;
use rawpipe::api::RenderResult;
use rawpipe::error::Error;
use rawpipe::pipeline::Pipeline;

/// TIFF export at 8, 16 or 32 bits per sample. The high-bit variants re-read
/// the pipeline's float back buffer so no precision is lost to the packed
/// 8-bit result.
pub fn save(pipe: &Pipeline, result: &RenderResult, path: &Path, bits: u32) -> Result<()> {
    let file = File::create(path).wrap_err_with(|| format!("Failed to create {:?}", path))?;
    let encoder = TiffEncoder::new(BufWriter::new(file));
    let (w, h) = (result.width as u32, result.height as u32);
    let encoded = match bits {
        8 => {
            let rgb: Vec<u8> = result
                .pixels
                .chunks(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            encoder.write_image(&rgb, w, h, image::ExtendedColorType::Rgb8)
        }
        16 => {
            let bytes: Vec<u8> = float_pixels(pipe)?
                .chunks(4)
                .flat_map(|px| {
                    [
                        (px[0].clamp(0.0, 1.0) * 65535.0) as u16,
                        (px[1].clamp(0.0, 1.0) * 65535.0) as u16,
                        (px[2].clamp(0.0, 1.0) * 65535.0) as u16,
                    ]
                })
                .flat_map(|v| v.to_ne_bytes())
                .collect();
            encoder.write_image(&bytes, w, h, image::ExtendedColorType::Rgb16)
        }
        32 => {
            let bytes: Vec<u8> = float_pixels(pipe)?
                .chunks(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .flat_map(|v| v.to_ne_bytes())
                .collect();
            encoder.write_image(&bytes, w, h, image::ExtendedColorType::Rgb32F)
        }
        other => return Err(Error::InvalidBitDepth(other).into()),
    };
    encoded.wrap_err_with(|| format!("Failed to encode {:?}", path))?;
    Ok(())
}

fn float_pixels(pipe: &Pipeline) -> Result<&[f32]> {
    pipe.backbuffer()
        .map(|(data, _, _)| data)
        .ok_or_else(|| eyre!("No rendered image available"))
}
