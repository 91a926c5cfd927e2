// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Input color: moves camera RGB into the Lab working space. The real ICC
//! transform belongs to the external CMS; this module fixes the colorspace
//! transition point the scheduler relies on.

use crate::buffer::BufferDesc;
use crate::colorspace::{self, ColorSpace};
use crate::error::Result;
use crate::image::ImageRecord;
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::Roi;
use crate::util::parallel;

pub struct ColorIn;

const TABLE: &[ParamDesc] = &[ParamDesc::u32("intent", 0, 0.0, 3.0)];

impl Operation for ColorIn {
    fn name(&self) -> &'static str {
        "colorin"
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            allow_tiling: true,
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

    fn default_enabled(&self, _image: &ImageRecord) -> bool {
        true
    }

    fn input_colorspace(&self, _piece: &Piece, _dsc: &BufferDesc) -> ColorSpace {
        ColorSpace::Rgb
    }

    fn output_colorspace(&self, _piece: &Piece, _dsc: &BufferDesc) -> ColorSpace {
        ColorSpace::Lab
    }

    fn output_format(&self, _piece: &mut Piece, _image: &ImageRecord, dsc: &mut BufferDesc) {
        dsc.cst = ColorSpace::Lab;
    }

    fn process(
        &self,
        _piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        let in_stride = roi_in.width * 4;
        let stride = roi_out.width * 4;
        parallel::for_each_row(output, stride, move |y, row| {
            let src = &input[y * in_stride..y * in_stride + row.len()];
            for (px, spx) in row.chunks_mut(4).zip(src.chunks(4)) {
                px.copy_from_slice(spx);
                colorspace::rgb_to_lab(px);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn white_maps_to_l100() {
        let op = ColorIn;
        let mut piece = Piece::new(0);
        let roi = Roi::full(1, 1);
        let input = [1.0f32, 1.0, 1.0, 1.0];
        let mut out = [0f32; 4];
        op.process(&mut piece, &input, &mut out, &roi, &roi).unwrap();
        assert!((out[0] - 100.0).abs() < 1e-2);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }
}
