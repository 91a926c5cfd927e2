// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Highlight reconstruction. v1 ships the clip method: blown sensels are
//! clamped to the white-balanced clip threshold so they stay neutral instead
//! of drifting magenta after demosaic.

use num_traits::FromPrimitive;

use crate::buffer::BufferDesc;
use crate::error::Result;
use crate::image::{ImageRecord, filter_color};
use crate::ops::{Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::Roi;
use crate::util::parallel;
use crate::util::tracing_wrappers::*;

pub struct Highlights;

#[derive(Clone, Copy, Debug, PartialEq, Eq, num_derive::FromPrimitive)]
pub enum HighlightMode {
    Clip = 0,
}

const TABLE: &[ParamDesc] = &[
    ParamDesc::u32("mode", 0, 0.0, 0.0),
    ParamDesc::f32("clip", 4, 0.0, 2.0),
];

struct Data {
    clip: f32,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("highlights params not committed")
}

impl Operation for Highlights {
    fn name(&self) -> &'static str {
        "highlights"
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, _image: &ImageRecord) -> Vec<u8> {
        let mut record = params::new_record(TABLE);
        params::find(TABLE, "clip")
            .expect("static table")
            .write_f32(&mut record, 1.0)
            .expect("static table");
        record
    }

    fn default_enabled(&self, image: &ImageRecord) -> bool {
        image.is_raw() && !image.is_monochrome()
    }

    fn commit_params(&self, record: &[u8], image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        if !image.is_raw() || image.is_monochrome() {
            piece.enabled = false;
            return Ok(());
        }
        let mode = params::find(TABLE, "mode")
            .expect("static table")
            .read_i32(record)?;
        if HighlightMode::from_i32(mode).is_none() {
            warn!("unknown highlight mode {}, using clip", mode);
        }
        piece.set_data(Data {
            clip: params::find(TABLE, "clip")
                .expect("static table")
                .read_f32(record)?,
        });
        Ok(())
    }

    fn output_format(&self, piece: &mut Piece, _image: &ImageRecord, dsc: &mut BufferDesc) {
        let clip = data(piece).clip;
        for k in 0..4 {
            dsc.processed_maximum[k] = dsc.processed_maximum[k].min(clip * dsc.wb_coeffs[k].max(f32::EPSILON));
        }
    }

    fn process(
        &self,
        piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        let clip = data(piece).clip;
        let pm = piece.dsc_in.processed_maximum;
        if piece.dsc_in.channels == 1 {
            let filters = piece.dsc_in.filters;
            let xtrans = piece.dsc_in.xtrans;
            let (rx, ry) = (roi_in.x as i64, roi_in.y as i64);
            let in_w = roi_in.width;
            parallel::for_each_row(output, roi_out.width, move |y, row| {
                let src = &input[y * in_w..y * in_w + row.len()];
                for (x, out) in row.iter_mut().enumerate() {
                    let c = filter_color(filters, &xtrans, ry + y as i64, rx + x as i64);
                    *out = src[x].min(clip * pm[c].max(f32::EPSILON));
                }
            });
        } else {
            let stride = roi_out.width * 4;
            let in_stride = roi_in.width * 4;
            parallel::for_each_row(output, stride, move |y, row| {
                let src = &input[y * in_stride..y * in_stride + row.len()];
                for (px, spx) in row.chunks_mut(4).zip(src.chunks(4)) {
                    for c in 0..3 {
                        px[c] = spx[c].min(clip * pm[c].max(f32::EPSILON));
                    }
                    px[3] = spx[3];
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::{FILTERS_RGGB, ImageParams, ImageRecord};

    #[test]
    fn clips_above_threshold() {
        let image = ImageRecord::new(ImageParams {
            width: 4,
            height: 4,
            raw: vec![1.5; 16],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap();
        let op = Highlights;
        let record = op.default_params(&image);
        let mut piece = Piece::new(0);
        piece.dsc_in = crate::buffer::BufferDesc::for_input(&image);
        op.commit_params(&record, &image, &mut piece).unwrap();
        let roi = Roi::full(4, 4);
        let mut out = vec![0f32; 16];
        op.process(&mut piece, image.raw(), &mut out, &roi, &roi)
            .unwrap();
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }
}
