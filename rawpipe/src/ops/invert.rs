// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Film negative inversion: subtracts the sample from the film base color.
//! Disabled unless the user opts in.

use crate::error::Result;
use crate::image::{ImageRecord, filter_color};
use crate::ops::{Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::Roi;
use crate::util::parallel;

pub struct Invert;

const COLOR_FIELDS: [&str; 3] = ["color_r", "color_g", "color_b"];

const TABLE: &[ParamDesc] = &[
    ParamDesc::f32("color_r", 0, 0.0, 2.0),
    ParamDesc::f32("color_g", 4, 0.0, 2.0),
    ParamDesc::f32("color_b", 8, 0.0, 2.0),
];

struct Data {
    color: [f32; 4],
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("invert params not committed")
}

impl Operation for Invert {
    fn name(&self) -> &'static str {
        "invert"
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, _image: &ImageRecord) -> Vec<u8> {
        let mut record = params::new_record(TABLE);
        for name in COLOR_FIELDS {
            params::find(TABLE, name)
                .expect("static table")
                .write_f32(&mut record, 1.0)
                .expect("static table");
        }
        record
    }

    fn commit_params(&self, record: &[u8], _image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        let mut color = [1f32; 4];
        for (i, name) in COLOR_FIELDS.iter().enumerate() {
            color[i] = params::find(TABLE, name)
                .expect("static table")
                .read_f32(record)?;
        }
        // CFA index 3 is the second green.
        color[3] = color[1];
        piece.set_data(Data { color });
        Ok(())
    }

    fn process(
        &self,
        piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        let color = data(piece).color;
        if piece.dsc_in.channels == 1 {
            let filters = piece.dsc_in.filters;
            let xtrans = piece.dsc_in.xtrans;
            let (rx, ry) = (roi_in.x as i64, roi_in.y as i64);
            let in_w = roi_in.width;
            parallel::for_each_row(output, roi_out.width, move |y, row| {
                let src = &input[y * in_w..y * in_w + row.len()];
                for (x, out) in row.iter_mut().enumerate() {
                    let c = if filters == 0 {
                        1
                    } else {
                        filter_color(filters, &xtrans, ry + y as i64, rx + x as i64)
                    };
                    *out = (color[c] - src[x]).max(0.0);
                }
            });
        } else {
            let stride = roi_out.width * 4;
            let in_stride = roi_in.width * 4;
            parallel::for_each_row(output, stride, move |y, row| {
                let src = &input[y * in_stride..y * in_stride + row.len()];
                for (px, spx) in row.chunks_mut(4).zip(src.chunks(4)) {
                    for c in 0..3 {
                        px[c] = (color[c] - spx[c]).max(0.0);
                    }
                    px[3] = spx[3];
                }
            });
        }
        Ok(())
    }
}
