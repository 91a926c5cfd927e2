// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The immutable image record: sensor data plus the metadata the pipeline
//! reads. Produced by the raw decoder (an external collaborator), frozen at
//! construction and shared read-only by any pipeline bound to it.

use std::sync::Arc;

use num_derive::FromPrimitive;

use crate::error::{Error, Result};

/// Sentinel value of the filter mask for 6x6 X-Trans sensors.
pub const FILTERS_XTRANS: u32 = 9;

/// Bayer mask for the common RGGB layout.
pub const FILTERS_RGGB: u32 = 0x94949494;

/// EXIF orientation values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Orientation {
    Normal = 1,
    MirrorHorizontal = 2,
    Rotate180 = 3,
    MirrorVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl Orientation {
    /// (swap axes, flip x, flip y) in output space.
    pub fn decompose(self) -> (bool, bool, bool) {
        match self {
            Orientation::Normal => (false, false, false),
            Orientation::MirrorHorizontal => (false, true, false),
            Orientation::Rotate180 => (false, true, true),
            Orientation::MirrorVertical => (false, false, true),
            Orientation::Transpose => (true, false, false),
            Orientation::Rotate90 => (true, true, false),
            Orientation::Transverse => (true, true, true),
            Orientation::Rotate270 => (true, false, true),
        }
    }

    pub fn swaps_axes(self) -> bool {
        self.decompose().0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExifInfo {
    pub iso: f32,
    pub aperture: f32,
    pub exposure_time: f32,
    pub focal_length: f32,
    pub exposure_bias: f32,
}

/// Everything the engine needs to build an [`ImageRecord`]. The raw decoder
/// fills this in; tests construct it directly.
pub struct ImageParams {
    pub width: usize,
    pub height: usize,
    /// Active sensor area; the part outside holds calibration pixels.
    pub crop_x: usize,
    pub crop_y: usize,
    pub crop_width: usize,
    pub crop_height: usize,
    /// Interleaved samples: 1 value per pixel for mosaic/monochrome sensors,
    /// 4 for already-demosaiced input.
    pub raw: Vec<f32>,
    pub channels: usize,
    pub filters: u32,
    pub xtrans: [[u8; 6]; 6],
    pub wb_coeffs: [f32; 4],
    pub black_level: f32,
    pub white_level: f32,
    pub maker: String,
    pub model: String,
    pub exif: ExifInfo,
    pub icc_profile: Option<Vec<u8>>,
    pub orientation: Orientation,
    pub monochrome: bool,
}

impl Default for ImageParams {
    fn default() -> ImageParams {
        ImageParams {
            width: 0,
            height: 0,
            crop_x: 0,
            crop_y: 0,
            crop_width: 0,
            crop_height: 0,
            raw: vec![],
            channels: 1,
            filters: FILTERS_RGGB,
            xtrans: [[0; 6]; 6],
            wb_coeffs: [1.0, 1.0, 1.0, 1.0],
            black_level: 0.0,
            white_level: 1.0,
            maker: String::new(),
            model: String::new(),
            exif: ExifInfo::default(),
            icc_profile: None,
            orientation: Orientation::Normal,
            monochrome: false,
        }
    }
}

pub struct ImageRecord {
    params: ImageParams,
}

impl ImageRecord {
    pub fn new(mut params: ImageParams) -> Result<Arc<ImageRecord>> {
        if params.width == 0 || params.height == 0 {
            return Err(Error::InvalidImageSize(params.width, params.height));
        }
        if params.width as u64 >= i64::MAX as u64 / 4 || params.height as u64 >= i64::MAX as u64 / 4
        {
            return Err(Error::ImageSizeTooLarge(params.width, params.height));
        }
        if params.channels != 1 && params.channels != 4 {
            return Err(Error::InvalidImageSize(params.channels, 0));
        }
        let expected = params.width * params.height * params.channels;
        if params.raw.len() != expected {
            return Err(Error::RawBufferMismatch(
                params.raw.len(),
                params.width,
                params.height,
                params.channels,
            ));
        }
        if params.crop_width == 0 || params.crop_height == 0 {
            params.crop_x = 0;
            params.crop_y = 0;
            params.crop_width = params.width;
            params.crop_height = params.height;
        }
        if params.crop_x + params.crop_width > params.width
            || params.crop_y + params.crop_height > params.height
        {
            return Err(Error::InvalidRegion(
                params.crop_x as i32,
                params.crop_y as i32,
                params.crop_width,
                params.crop_height,
            ));
        }
        if params.white_level <= params.black_level {
            return Err(Error::InvalidImageSize(0, 0));
        }
        Ok(Arc::new(ImageRecord { params }))
    }

    pub fn width(&self) -> usize {
        self.params.width
    }

    pub fn height(&self) -> usize {
        self.params.height
    }

    pub fn crop(&self) -> (usize, usize, usize, usize) {
        (
            self.params.crop_x,
            self.params.crop_y,
            self.params.crop_width,
            self.params.crop_height,
        )
    }

    pub fn raw(&self) -> &[f32] {
        &self.params.raw
    }

    pub fn channels(&self) -> usize {
        self.params.channels
    }

    pub fn filters(&self) -> u32 {
        self.params.filters
    }

    pub fn xtrans(&self) -> &[[u8; 6]; 6] {
        &self.params.xtrans
    }

    pub fn wb_coeffs(&self) -> [f32; 4] {
        self.params.wb_coeffs
    }

    pub fn black_level(&self) -> f32 {
        self.params.black_level
    }

    pub fn white_level(&self) -> f32 {
        self.params.white_level
    }

    pub fn maker(&self) -> &str {
        &self.params.maker
    }

    pub fn model(&self) -> &str {
        &self.params.model
    }

    pub fn exif(&self) -> &ExifInfo {
        &self.params.exif
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.params.icc_profile.as_deref()
    }

    pub fn orientation(&self) -> Orientation {
        self.params.orientation
    }

    pub fn is_raw(&self) -> bool {
        self.params.channels == 1
    }

    pub fn is_mosaic(&self) -> bool {
        self.params.filters != 0 && !self.params.monochrome
    }

    pub fn is_monochrome(&self) -> bool {
        self.params.monochrome
    }

    /// CFA color at absolute sensor coordinates: 0 red, 1 green, 2 blue,
    /// 3 second green on sensors that distinguish it.
    pub fn filter_color(&self, row: i64, col: i64) -> usize {
        filter_color(self.params.filters, &self.params.xtrans, row, col)
    }
}

/// CFA color lookup usable with a descriptor's filter mask. dcraw-style bit
/// packing for Bayer, table lookup for X-Trans.
pub fn filter_color(filters: u32, xtrans: &[[u8; 6]; 6], row: i64, col: i64) -> usize {
    if filters == FILTERS_XTRANS {
        let r = row.rem_euclid(6) as usize;
        let c = col.rem_euclid(6) as usize;
        xtrans[r][c] as usize
    } else {
        let shift = ((((row << 1) & 14) | (col & 1)) << 1) as u32;
        ((filters >> shift) & 3) as usize
    }
}
