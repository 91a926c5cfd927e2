// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Exposure: `out = (in - black) * 2^exposure` on RGBA buffers. The optional
//! bias compensation folds the camera's EXIF exposure bias into the exponent
//! at commit time.

use crate::buffer::BufferDesc;
use crate::error::Result;
use crate::image::ImageRecord;
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::Roi;
use crate::util::parallel;

pub struct Exposure;

const TABLE: &[ParamDesc] = &[
    ParamDesc::f32("black", 0, -0.1, 0.1),
    ParamDesc::f32("exposure", 4, -3.0, 4.0),
    ParamDesc::bool("compensate_bias", 8),
];

struct Data {
    black: f32,
    scale: f32,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("exposure params not committed")
}

impl Operation for Exposure {
    fn name(&self) -> &'static str {
        "exposure"
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            supports_blending: true,
            allow_tiling: true,
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

    fn commit_params(&self, record: &[u8], image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        let black = params::find(TABLE, "black")
            .expect("static table")
            .read_f32(record)?;
        let mut exposure = params::find(TABLE, "exposure")
            .expect("static table")
            .read_f32(record)?;
        let compensate = params::find(TABLE, "compensate_bias")
            .expect("static table")
            .read_i32(record)?
            != 0;
        if compensate {
            exposure -= image.exif().exposure_bias;
        }
        piece.set_data(Data {
            black,
            scale: exposure.exp2(),
        });
        Ok(())
    }

    fn output_format(&self, piece: &mut Piece, _image: &ImageRecord, dsc: &mut BufferDesc) {
        let scale = data(piece).scale;
        for k in 0..4 {
            dsc.processed_maximum[k] *= scale;
        }
    }

    fn input_colorspace(
        &self,
        _piece: &Piece,
        _dsc: &BufferDesc,
    ) -> crate::colorspace::ColorSpace {
        crate::colorspace::ColorSpace::Rgb
    }

    fn process(
        &self,
        piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        let d = data(piece);
        let (black, scale) = (d.black, d.scale);
        let stride = roi_out.width * 4;
        let in_stride = roi_in.width * 4;
        parallel::for_each_row(output, stride, move |y, row| {
            let src = &input[y * in_stride..y * in_stride + row.len()];
            for (px, spx) in row.chunks_mut(4).zip(src.chunks(4)) {
                for c in 0..3 {
                    px[c] = (spx[c] - black) * scale;
                }
                px[3] = spx[3];
            }
        });
        Ok(())
    }
}
