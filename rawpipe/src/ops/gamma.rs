// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Display encoding: a gamma curve with a linear toe, applied through a LUT
//! built at commit time. Always the last module of a built-in ordering.

use crate::buffer::BufferDesc;
use crate::colorspace::ColorSpace;
use crate::error::Result;
use crate::image::ImageRecord;
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::Roi;
use crate::util::parallel;

pub struct Gamma;

const LUT_SIZE: usize = 0x10000;

const TABLE: &[ParamDesc] = &[
    ParamDesc::f32("gamma", 0, 0.1, 1.0),
    ParamDesc::f32("linear", 4, 0.0, 1.0),
];

struct Data {
    lut: Vec<f32>,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("gamma params not committed")
}

fn build_lut(gamma: f32, linear: f32) -> Vec<f32> {
    let mut lut = vec![0f32; LUT_SIZE];
    let (g, a, b, c) = if linear < 1.0 && gamma * linear < 1.0 {
        let g = gamma * (1.0 - linear) / (1.0 - gamma * linear);
        let a = 1.0 / (1.0 + linear * (g - 1.0));
        let b = linear * (g - 1.0) * a;
        let c = if linear > 0.0 {
            (a * linear + b).powf(g) / linear
        } else {
            0.0
        };
        (g, a, b, c)
    } else {
        (gamma, 1.0, 0.0, 0.0)
    };
    for (k, v) in lut.iter_mut().enumerate() {
        let x = k as f32 / (LUT_SIZE - 1) as f32;
        *v = if x < linear { c * x } else { (a * x + b).powf(g) };
    }
    lut
}

impl Operation for Gamma {
    fn name(&self) -> &'static str {
        "gamma"
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            one_instance: true,
            no_masks: true,
            ..OpFlags::default()
        }
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, _image: &ImageRecord) -> Vec<u8> {
        let mut record = params::new_record(TABLE);
        params::find(TABLE, "gamma")
            .expect("static table")
            .write_f32(&mut record, 1.0 / 2.2)
            .expect("static table");
        params::find(TABLE, "linear")
            .expect("static table")
            .write_f32(&mut record, 0.1)
            .expect("static table");
        record
    }

    fn default_enabled(&self, _image: &ImageRecord) -> bool {
        true
    }

    fn commit_params(&self, record: &[u8], _image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        let gamma = params::find(TABLE, "gamma")
            .expect("static table")
            .read_f32(record)?;
        let linear = params::find(TABLE, "linear")
            .expect("static table")
            .read_f32(record)?;
        piece.set_data(Data {
            lut: build_lut(gamma.clamp(0.01, 4.0), linear.clamp(0.0, 1.0)),
        });
        Ok(())
    }

    fn input_colorspace(&self, _piece: &Piece, _dsc: &BufferDesc) -> ColorSpace {
        ColorSpace::Rgb
    }

    fn process(
        &self,
        piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        let lut = &data(piece).lut;
        let in_stride = roi_in.width * 4;
        let stride = roi_out.width * 4;
        parallel::for_each_row(output, stride, move |y, row| {
            let src = &input[y * in_stride..y * in_stride + row.len()];
            for (px, spx) in row.chunks_mut(4).zip(src.chunks(4)) {
                for c in 0..3 {
                    let idx = (spx[c].clamp(0.0, 1.0) * (LUT_SIZE - 1) as f32) as usize;
                    px[c] = lut[idx];
                }
                px[3] = spx[3];
            }
        });
        Ok(())
    }
}
