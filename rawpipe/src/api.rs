// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The external surface: render calls returning packed RGBA, parameter and
//! module access, history and sidecar round-trips. The thin C wrapper that
//! would expose these over FFI is a separate collaborator; `Error::status`
//! carries the status codes it needs.

use std::path::Path;

use crate::error::{Error, Result};
use crate::history;
use crate::pipeline::Pipeline;
use crate::render;
use crate::roi::{Roi, scaled_dim};
use crate::sidecar;

/// A finished render: 8-bit RGBA, row-major, stride = width * 4.
#[derive(Debug)]
pub struct RenderResult {
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

fn pack_backbuffer(pipe: &Pipeline) -> Result<RenderResult> {
    let (data, width, height) = pipe
        .backbuffer()
        .ok_or(Error::InvalidRegion(0, 0, 0, 0))?;
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(width * height * 4)?;
    for px in data.chunks(4) {
        pixels.push((px[0].clamp(0.0, 1.0) * 255.0) as u8);
        pixels.push((px[1].clamp(0.0, 1.0) * 255.0) as u8);
        pixels.push((px[2].clamp(0.0, 1.0) * 255.0) as u8);
        pixels.push(255);
    }
    Ok(RenderResult {
        pixels,
        width,
        height,
        stride: width * 4,
    })
}

fn check_scale(scale: f32) -> Result<()> {
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(Error::InvalidScale(scale));
    }
    Ok(())
}

/// Renders the full image at `scale` and returns packed RGBA.
pub fn render(pipe: &mut Pipeline, scale: f32) -> Result<RenderResult> {
    check_scale(scale)?;
    let (w, h) = render::get_dimensions(pipe)?;
    let roi = Roi::new(0, 0, scaled_dim(w, scale), scaled_dim(h, scale), scale);
    render::process(pipe, roi)?;
    pack_backbuffer(pipe)
}

/// Renders a region given in full-resolution coordinates; the result is that
/// region scaled by `scale`.
pub fn render_region(
    pipe: &mut Pipeline,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    scale: f32,
) -> Result<RenderResult> {
    check_scale(scale)?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidRegion(x as i32, y as i32, width, height));
    }
    let roi = Roi::new(
        (x as f32 * scale).floor() as i32,
        (y as f32 * scale).floor() as i32,
        scaled_dim(width, scale),
        scaled_dim(height, scale),
        scale,
    );
    render::process(pipe, roi)?;
    pack_backbuffer(pipe)
}

pub fn set_param_f32(pipe: &mut Pipeline, op: &str, field: &str, value: f32) -> Result<()> {
    pipe.set_param_f32(op, field, value)
}

pub fn get_param_f32(pipe: &Pipeline, op: &str, field: &str) -> Result<f32> {
    pipe.get_param_f32(op, field)
}

pub fn set_param_i32(pipe: &mut Pipeline, op: &str, field: &str, value: i32) -> Result<()> {
    pipe.set_param_i32(op, field, value)
}

pub fn get_param_i32(pipe: &Pipeline, op: &str, field: &str) -> Result<i32> {
    pipe.get_param_i32(op, field)
}

pub fn enable_module(pipe: &mut Pipeline, op: &str, enabled: bool) -> Result<()> {
    pipe.set_enabled(op, enabled)
}

pub fn is_module_enabled(pipe: &Pipeline, op: &str) -> Result<bool> {
    pipe.is_enabled(op)
}

pub fn serialize_history(pipe: &Pipeline) -> String {
    history::serialize(pipe)
}

pub fn load_history(pipe: &mut Pipeline, doc: &str) -> Result<()> {
    history::load(pipe, doc)
}

pub fn load_sidecar(pipe: &mut Pipeline, path: &Path) -> Result<()> {
    sidecar::load(pipe, path)
}

pub fn save_sidecar(pipe: &Pipeline, path: &Path) -> Result<()> {
    sidecar::save(pipe, path)
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::{FILTERS_RGGB, ImageParams, ImageRecord};
    use std::sync::Arc;

    fn bayer_pipeline(w: usize, h: usize) -> Pipeline {
        let image: Arc<ImageRecord> = ImageRecord::new(ImageParams {
            width: w,
            height: h,
            raw: vec![0.5; w * h],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap();
        Pipeline::new(image).unwrap()
    }

    #[test]
    fn quarter_scale_render_shape() {
        let mut pipe = bayer_pipeline(64, 48);
        let result = render(&mut pipe, 0.25).unwrap();
        assert_eq!(result.width, 16);
        assert_eq!(result.height, 12);
        assert_eq!(result.stride, result.width * 4);
        assert_eq!(result.pixels.len(), result.width * result.height * 4);
        // Opaque output, top-left pixel readable.
        assert_eq!(result.pixels[3], 255);
    }

    #[test]
    fn region_render_shape() {
        let mut pipe = bayer_pipeline(64, 64);
        let result = render_region(&mut pipe, 16, 16, 32, 32, 0.5).unwrap();
        assert_eq!(result.width, 16);
        assert_eq!(result.height, 16);
    }

    #[test]
    fn bad_scale_is_invalid_arg() {
        let mut pipe = bayer_pipeline(32, 32);
        let err = render(&mut pipe, 0.0).unwrap_err();
        assert_eq!(err.status(), crate::error::status::INVALID_ARG);
        assert!(render(&mut pipe, f32::NAN).is_err());
    }
}
