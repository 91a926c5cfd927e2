// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Unsharp mask on the L channel of Lab input. Runs between colorin and
//! colorout so chroma is untouched by construction.

use crate::buffer::BufferDesc;
use crate::colorspace::ColorSpace;
use crate::error::Result;
use crate::image::ImageRecord;
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::render::tiling::TilingSpec;
use crate::roi::Roi;
use crate::util::parallel;

pub struct Sharpen;

const TABLE: &[ParamDesc] = &[
    ParamDesc::f32("radius", 0, 0.1, 8.0),
    ParamDesc::f32("amount", 4, 0.0, 2.0),
    ParamDesc::f32("threshold", 8, 0.0, 0.1),
];

struct Data {
    radius: f32,
    amount: f32,
    threshold: f32,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("sharpen params not committed")
}

fn gaussian_weights(sigma: f32) -> Vec<f32> {
    let half = ((3.0 * sigma).ceil() as usize).max(1);
    let mut weights = vec![0f32; half + 1];
    let denom = 2.0 * sigma * sigma;
    for (i, w) in weights.iter_mut().enumerate() {
        *w = (-((i * i) as f32) / denom).exp();
    }
    let norm: f32 = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    for w in weights.iter_mut() {
        *w /= norm;
    }
    weights
}

impl Operation for Sharpen {
    fn name(&self) -> &'static str {
        "sharpen"
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
        let mut record = params::new_record(TABLE);
        let defaults = [("radius", 2.0f32), ("amount", 0.5), ("threshold", 0.004)];
        for (name, v) in defaults {
            params::find(TABLE, name)
                .expect("static table")
                .write_f32(&mut record, v)
                .expect("static table");
        }
        record
    }

    fn commit_params(&self, record: &[u8], _image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        let read = |name: &str| -> Result<f32> {
            params::find(TABLE, name).expect("static table").read_f32(record)
        };
        let d = Data {
            radius: read("radius")?.max(0.0),
            amount: read("amount")?,
            threshold: read("threshold")?.max(0.0),
        };
        if d.radius <= 0.0 || d.amount == 0.0 {
            piece.enabled = false;
            return Ok(());
        }
        piece.set_data(d);
        Ok(())
    }

    fn input_colorspace(&self, _piece: &Piece, _dsc: &BufferDesc) -> ColorSpace {
        ColorSpace::Lab
    }

    fn tiling(&self, piece: &Piece, _roi_in: &Roi, roi_out: &Roi) -> TilingSpec {
        let sigma = data(piece).radius * roi_out.scale;
        TilingSpec {
            factor: 3.0,
            overhead: 0,
            overlap: ((3.0 * sigma).ceil() as usize).max(1),
            align: 1,
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
        let d = data(piece);
        // Radius is declared at full resolution; shrink with the render.
        let sigma = (d.radius * roi_out.scale).max(0.01);
        let weights = gaussian_weights(sigma);
        let (w, h) = (roi_in.width, roi_in.height);

        let mut luma = vec![0f32; w * h];
        parallel::for_each_row(&mut luma, w, |y, row| {
            let src = &input[y * w * 4..(y + 1) * w * 4];
            for (x, v) in row.iter_mut().enumerate() {
                *v = src[x * 4];
            }
        });

        let mut blur_x = vec![0f32; w * h];
        {
            let luma = &luma;
            let weights = &weights;
            parallel::for_each_row(&mut blur_x, w, move |y, row| {
                let src = &luma[y * w..(y + 1) * w];
                for (x, v) in row.iter_mut().enumerate() {
                    let mut acc = src[x] * weights[0];
                    for (k, &wk) in weights.iter().enumerate().skip(1) {
                        let lo = x.saturating_sub(k);
                        let hi = (x + k).min(w - 1);
                        acc += (src[lo] + src[hi]) * wk;
                    }
                    *v = acc;
                }
            });
        }
        let mut blur = vec![0f32; w * h];
        {
            let blur_x = &blur_x;
            let weights = &weights;
            parallel::for_each_row(&mut blur, w, move |y, row| {
                for (x, v) in row.iter_mut().enumerate() {
                    let mut acc = blur_x[y * w + x] * weights[0];
                    for (k, &wk) in weights.iter().enumerate().skip(1) {
                        let lo = y.saturating_sub(k);
                        let hi = (y + k).min(h - 1);
                        acc += (blur_x[lo * w + x] + blur_x[hi * w + x]) * wk;
                    }
                    *v = acc;
                }
            });
        }

        let (amount, threshold) = (d.amount, d.threshold);
        let (dx, dy) = (
            (roi_out.x - roi_in.x).max(0) as usize,
            (roi_out.y - roi_in.y).max(0) as usize,
        );
        let stride = roi_out.width * 4;
        parallel::for_each_row(output, stride, move |y, row| {
            let sy = y + dy;
            let src = &input[(sy * w + dx) * 4..];
            for (x, px) in row.chunks_mut(4).enumerate() {
                let spx = &src[x * 4..x * 4 + 4];
                let detail = spx[0] - blur[sy * w + dx + x];
                let boost = (detail.abs() - threshold).max(0.0).copysign(detail);
                px[0] = spx[0] + amount * boost;
                px[1] = spx[1];
                px[2] = spx[2];
                px[3] = spx[3];
            }
        });
        Ok(())
    }
}
