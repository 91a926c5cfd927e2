// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Regions of interest. A [`Roi`] names a rectangle of an image at a given
//! downscaling; ROIs flow forward through `modify_roi_out` for dimension
//! queries and backward through `modify_roi_in` while the scheduler solves
//! how much input every module needs.

use crate::image::FILTERS_XTRANS;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
    /// Output-to-full-resolution ratio.
    pub scale: f32,
}

impl Roi {
    pub fn new(x: i32, y: i32, width: usize, height: usize, scale: f32) -> Roi {
        Roi {
            x,
            y,
            width,
            height,
            scale,
        }
    }

    pub fn full(width: usize, height: usize) -> Roi {
        Roi::new(0, 0, width, height, 1.0)
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// Does this ROI cover exactly the full frame at native resolution?
    pub fn is_full_frame(&self, width: usize, height: usize) -> bool {
        self.x == 0
            && self.y == 0
            && self.width == width
            && self.height == height
            && self.scale == 1.0
    }
}

/// Grid alignment required by a CFA: 2 for Bayer, 3 for X-Trans, 1 for
/// anything else.
pub fn cfa_alignment(filters: u32) -> i32 {
    match filters {
        0 => 1,
        FILTERS_XTRANS => 3,
        _ => 2,
    }
}

/// Snaps a full-resolution ROI outward so its origin lands on the CFA grid
/// and it still covers the requested area, then clamps it to the frame.
pub fn snap_to_cfa(roi: &Roi, filters: u32, frame_w: usize, frame_h: usize) -> Roi {
    let align = cfa_alignment(filters);
    let x = (roi.x.max(0) / align) * align;
    let y = (roi.y.max(0) / align) * align;
    let x2 = (roi.x + roi.width as i32).min(frame_w as i32);
    let y2 = (roi.y + roi.height as i32).min(frame_h as i32);
    Roi {
        x,
        y,
        width: (x2 - x).max(0) as usize,
        height: (y2 - y).max(0) as usize,
        scale: roi.scale,
    }
}

/// Scales full-resolution dimensions the way every format-transition point
/// does: floor, never below one pixel.
pub fn scaled_dim(dim: usize, scale: f32) -> usize {
    ((dim as f32 * scale).floor() as usize).max(1)
}
