// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Sensor normalization: crops the frame to the active area, subtracts the
//! per-CFA black level and scales by white - black. Always the first module
//! of a built-in ordering.

use crate::buffer::BufferDesc;
use crate::error::Result;
use crate::image::{ImageRecord, filter_color};
use crate::ops::{Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::{Roi, cfa_alignment};
use crate::util::parallel;

pub struct RawPrepare;

const BLACK_FIELDS: [&str; 4] = ["black_0", "black_1", "black_2", "black_3"];

const TABLE: &[ParamDesc] = &[
    ParamDesc::u32("crop_left", 0, 0.0, 1024.0),
    ParamDesc::u32("crop_top", 4, 0.0, 1024.0),
    ParamDesc::u32("crop_right", 8, 0.0, 1024.0),
    ParamDesc::u32("crop_bottom", 12, 0.0, 1024.0),
    ParamDesc::f32("black_0", 16, 0.0, 65535.0),
    ParamDesc::f32("black_1", 20, 0.0, 65535.0),
    ParamDesc::f32("black_2", 24, 0.0, 65535.0),
    ParamDesc::f32("black_3", 28, 0.0, 65535.0),
    ParamDesc::f32("white", 32, 1.0, 65535.0),
];

struct Data {
    left: i32,
    top: i32,
    right: usize,
    bottom: usize,
    black: [f32; 4],
    white: f32,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("rawprepare params not committed")
}

impl Operation for RawPrepare {
    fn name(&self) -> &'static str {
        "rawprepare"
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, image: &ImageRecord) -> Vec<u8> {
        let mut record = params::new_record(TABLE);
        let (cx, cy, cw, ch) = image.crop();
        // Keep the active-area origin on the CFA grid so the filter phase
        // survives the crop.
        let align = cfa_alignment(image.filters()) as usize;
        let cx = (cx / align) * align;
        let cy = (cy / align) * align;
        let fields = [
            ("crop_left", cx as i32),
            ("crop_top", cy as i32),
            ("crop_right", (image.width() - cx - cw) as i32),
            ("crop_bottom", (image.height() - cy - ch) as i32),
        ];
        for (name, v) in fields {
            let desc = params::find(TABLE, name).expect("static table");
            desc.write_i32(&mut record, v).expect("static table");
        }
        for name in BLACK_FIELDS {
            let desc = params::find(TABLE, name).expect("static table");
            desc.write_f32(&mut record, image.black_level())
                .expect("static table");
        }
        params::find(TABLE, "white")
            .expect("static table")
            .write_f32(&mut record, image.white_level())
            .expect("static table");
        record
    }

    fn default_enabled(&self, image: &ImageRecord) -> bool {
        image.is_raw()
    }

    fn commit_params(&self, record: &[u8], image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        if !image.is_raw() {
            piece.enabled = false;
            return Ok(());
        }
        let mut black = [0f32; 4];
        for (i, name) in BLACK_FIELDS.iter().enumerate() {
            black[i] = params::find(TABLE, name).expect("static table").read_f32(record)?;
        }
        let read_u32 = |name: &str| -> Result<i32> {
            params::find(TABLE, name).expect("static table").read_i32(record)
        };
        piece.set_data(Data {
            left: read_u32("crop_left")?,
            top: read_u32("crop_top")?,
            right: read_u32("crop_right")?.max(0) as usize,
            bottom: read_u32("crop_bottom")?.max(0) as usize,
            black,
            white: params::find(TABLE, "white").expect("static table").read_f32(record)?,
        });
        Ok(())
    }

    fn modify_roi_out(&self, piece: &Piece, roi_in: &Roi) -> Roi {
        let d = data(piece);
        Roi {
            x: roi_in.x,
            y: roi_in.y,
            width: roi_in.width.saturating_sub(d.left.max(0) as usize + d.right),
            height: roi_in
                .height
                .saturating_sub(d.top.max(0) as usize + d.bottom),
            scale: roi_in.scale,
        }
    }

    fn modify_roi_in(&self, piece: &Piece, roi_out: &Roi) -> Roi {
        let d = data(piece);
        Roi {
            x: roi_out.x + d.left,
            y: roi_out.y + d.top,
            width: roi_out.width,
            height: roi_out.height,
            scale: roi_out.scale,
        }
    }

    fn output_format(&self, _piece: &mut Piece, _image: &ImageRecord, dsc: &mut BufferDesc) {
        dsc.black = 0.0;
        dsc.white = 1.0;
        dsc.processed_maximum = [1.0; 4];
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
        let (black, white) = (d.black, d.white);
        let filters = piece.dsc_in.filters;
        let xtrans = piece.dsc_in.xtrans;
        let mosaic = piece.dsc_in.is_mosaic();
        let in_w = roi_in.width;
        let (rx, ry) = (roi_in.x as i64, roi_in.y as i64);
        parallel::for_each_row(output, roi_out.width, move |y, row| {
            let src = &input[y * in_w..y * in_w + roi_out.width];
            for (x, out) in row.iter_mut().enumerate() {
                let c = if mosaic {
                    filter_color(filters, &xtrans, ry + y as i64, rx + x as i64)
                } else {
                    0
                };
                let divider = (white - black[c]).max(f32::EPSILON);
                *out = (src[x] - black[c]) / divider;
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::{FILTERS_RGGB, ImageParams, ImageRecord};

    fn test_image() -> std::sync::Arc<ImageRecord> {
        ImageRecord::new(ImageParams {
            width: 8,
            height: 8,
            raw: vec![0.5; 64],
            black_level: 0.25,
            white_level: 0.75,
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn normalizes_black_and_white() {
        let image = test_image();
        let op = RawPrepare;
        let record = op.default_params(&image);
        let mut piece = Piece::new(0);
        piece.dsc_in = crate::buffer::BufferDesc::for_input(&image);
        op.commit_params(&record, &image, &mut piece).unwrap();
        let roi = Roi::full(8, 8);
        let roi_in = op.modify_roi_in(&piece, &roi);
        let mut out = vec![0f32; 64];
        op.process(&mut piece, image.raw(), &mut out, &roi_in, &roi)
            .unwrap();
        // (0.5 - 0.25) / (0.75 - 0.25) = 0.5
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn crop_shrinks_output() {
        let image = ImageRecord::new(ImageParams {
            width: 10,
            height: 10,
            crop_x: 2,
            crop_y: 2,
            crop_width: 6,
            crop_height: 6,
            raw: vec![0.5; 100],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap();
        let op = RawPrepare;
        let record = op.default_params(&image);
        let mut piece = Piece::new(0);
        op.commit_params(&record, &image, &mut piece).unwrap();
        let out = op.modify_roi_out(&piece, &Roi::full(10, 10));
        assert_eq!((out.width, out.height), (6, 6));
        let back = op.modify_roi_in(&piece, &out);
        assert_eq!((back.x, back.y), (2, 2));
    }

    #[test]
    fn disabled_for_non_raw() {
        let image = ImageRecord::new(ImageParams {
            width: 4,
            height: 4,
            channels: 4,
            filters: 0,
            raw: vec![0.5; 64],
            ..Default::default()
        })
        .unwrap();
        let op = RawPrepare;
        let record = op.default_params(&image);
        let mut piece = Piece::new(0);
        op.commit_params(&record, &image, &mut piece).unwrap();
        assert!(!piece.enabled);
    }
}
