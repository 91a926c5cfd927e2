// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Catch-up scaling for export chains whose upstream ran at a different
//! scale than the requested output. Disabled by default: in the standard
//! chain demosaic already lands on the requested scale, so this module only
//! participates when a caller forces it on.

use crate::error::Result;
use crate::image::ImageRecord;
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::render::clip_zoom::clip_and_zoom;
use crate::roi::Roi;

pub struct FinalScale;

const TABLE: &[ParamDesc] = &[];

impl Operation for FinalScale {
    fn name(&self) -> &'static str {
        "finalscale"
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            distort: true,
            one_instance: true,
            ..OpFlags::default()
        }
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, _image: &ImageRecord) -> Vec<u8> {
        params::new_record(TABLE)
    }

    fn modify_roi_in(&self, piece: &Piece, roi_out: &Roi) -> Roi {
        if roi_out.scale == 1.0 {
            return *roi_out;
        }
        let s = roi_out.scale;
        let x0 = ((roi_out.x as f32 / s).floor() as i32 - 1).max(0);
        let y0 = ((roi_out.y as f32 / s).floor() as i32 - 1).max(0);
        let x1 = (((roi_out.x + roi_out.width as i32) as f32 / s).ceil() as i32 + 1)
            .min(piece.full_in.0 as i32);
        let y1 = (((roi_out.y + roi_out.height as i32) as f32 / s).ceil() as i32 + 1)
            .min(piece.full_in.1 as i32);
        Roi {
            x: x0,
            y: y0,
            width: (x1 - x0).max(1) as usize,
            height: (y1 - y0).max(1) as usize,
            scale: 1.0,
        }
    }

    fn process(
        &self,
        _piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        if roi_in.scale == roi_out.scale {
            output.copy_from_slice(&input[..output.len()]);
            return Ok(());
        }
        clip_and_zoom(output, input, roi_out, roi_in, 4);
        Ok(())
    }
}
