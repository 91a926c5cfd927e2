// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! White balance: multiplies each sensel by the coefficient of its CFA
//! color, or each channel on demosaiced input. The applied coefficients are
//! published in the buffer descriptor for downstream modules.

use crate::buffer::BufferDesc;
use crate::error::Result;
use crate::image::{ImageRecord, filter_color};
use crate::ops::{Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::Roi;
use crate::util::parallel;

pub struct Temperature;

const COEF_FIELDS: [&str; 4] = ["red", "green", "blue", "green2"];

const TABLE: &[ParamDesc] = &[
    ParamDesc::f32("red", 0, 0.0, 8.0),
    ParamDesc::f32("green", 4, 0.0, 8.0),
    ParamDesc::f32("blue", 8, 0.0, 8.0),
    ParamDesc::f32("green2", 12, 0.0, 8.0),
];

struct Data {
    coeffs: [f32; 4],
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("temperature params not committed")
}

impl Operation for Temperature {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, image: &ImageRecord) -> Vec<u8> {
        let mut record = params::new_record(TABLE);
        let raw = image.wb_coeffs();
        // Normalize so green stays at 1.0.
        let green = if raw[1] > 0.0 { raw[1] } else { 1.0 };
        let mut coeffs = [raw[0] / green, 1.0, raw[2] / green, raw[3] / green];
        if !(coeffs[0].is_finite() && coeffs[0] > 0.0) {
            coeffs[0] = 1.0;
        }
        if !(coeffs[2].is_finite() && coeffs[2] > 0.0) {
            coeffs[2] = 1.0;
        }
        if !(coeffs[3].is_finite() && coeffs[3] > 0.0) {
            coeffs[3] = coeffs[1];
        }
        for (name, v) in COEF_FIELDS.iter().zip(coeffs) {
            params::find(TABLE, name)
                .expect("static table")
                .write_f32(&mut record, v)
                .expect("static table");
        }
        record
    }

    fn default_enabled(&self, image: &ImageRecord) -> bool {
        image.is_raw() && !image.is_monochrome()
    }

    fn commit_params(&self, record: &[u8], image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        if image.is_monochrome() {
            piece.enabled = false;
            return Ok(());
        }
        let mut coeffs = [1f32; 4];
        for (i, name) in COEF_FIELDS.iter().enumerate() {
            coeffs[i] = params::find(TABLE, name)
                .expect("static table")
                .read_f32(record)?;
        }
        piece.set_data(Data { coeffs });
        Ok(())
    }

    fn output_format(&self, piece: &mut Piece, _image: &ImageRecord, dsc: &mut BufferDesc) {
        let coeffs = data(piece).coeffs;
        dsc.wb_coeffs = coeffs;
        for k in 0..4 {
            dsc.processed_maximum[k] *= coeffs[k].max(f32::EPSILON);
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
        let coeffs = data(piece).coeffs;
        if piece.dsc_in.channels == 1 {
            let filters = piece.dsc_in.filters;
            let xtrans = piece.dsc_in.xtrans;
            let (rx, ry) = (roi_in.x as i64, roi_in.y as i64);
            let in_w = roi_in.width;
            parallel::for_each_row(output, roi_out.width, move |y, row| {
                let src = &input[y * in_w..y * in_w + row.len()];
                for (x, out) in row.iter_mut().enumerate() {
                    let c = filter_color(filters, &xtrans, ry + y as i64, rx + x as i64);
                    *out = src[x] * coeffs[c];
                }
            });
        } else {
            let stride = roi_out.width * 4;
            let in_stride = roi_in.width * 4;
            parallel::for_each_row(output, stride, move |y, row| {
                let src = &input[y * in_stride..y * in_stride + row.len()];
                for (px, spx) in row.chunks_mut(4).zip(src.chunks(4)) {
                    px[0] = spx[0] * coeffs[0];
                    px[1] = spx[1] * coeffs[1];
                    px[2] = spx[2] * coeffs[2];
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
    fn mosaic_uses_cfa_coefficient() {
        let image = ImageRecord::new(ImageParams {
            width: 4,
            height: 4,
            raw: vec![1.0; 16],
            wb_coeffs: [2.0, 1.0, 0.5, 1.0],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap();
        let op = Temperature;
        let record = op.default_params(&image);
        let mut piece = Piece::new(0);
        piece.dsc_in = crate::buffer::BufferDesc::for_input(&image);
        op.commit_params(&record, &image, &mut piece).unwrap();
        let roi = Roi::full(4, 4);
        let mut out = vec![0f32; 16];
        op.process(&mut piece, image.raw(), &mut out, &roi, &roi)
            .unwrap();
        // RGGB: (0,0) red, (0,1) green, (1,1) blue.
        assert!((out[0] - 2.0).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!((out[5] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn publishes_coefficients_in_descriptor() {
        let image = ImageRecord::new(ImageParams {
            width: 4,
            height: 4,
            raw: vec![1.0; 16],
            wb_coeffs: [2.0, 1.0, 0.5, 1.0],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap();
        let op = Temperature;
        let record = op.default_params(&image);
        let mut piece = Piece::new(0);
        op.commit_params(&record, &image, &mut piece).unwrap();
        let mut dsc = crate::buffer::BufferDesc::for_input(&image);
        op.output_format(&mut piece, &image, &mut dsc);
        assert_eq!(dsc.wb_coeffs, [2.0, 1.0, 0.5, 1.0]);
        assert!((dsc.processed_maximum[0] - 2.0).abs() < 1e-6);
    }
}
