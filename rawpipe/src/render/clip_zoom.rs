// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Buffer import helpers for the scheduler's base case: row-clamped copies
//! at native scale and the bilinear clip-and-zoom used whenever a node needs
//! its input at a different scale than it is stored at.

use crate::roi::Roi;
use crate::util::parallel;

/// Copies `roi`-addressed rows out of a `in_w` x `in_h` source buffer,
/// zero-filling everything the source does not cover.
pub fn copy_rows_clamped(
    out: &mut [f32],
    roi: &Roi,
    input: &[f32],
    in_w: usize,
    in_h: usize,
    channels: usize,
) {
    let row_stride = roi.width * channels;
    parallel::for_each_row(out, row_stride, |y, row| {
        let sy = roi.y as i64 + y as i64;
        if sy < 0 || sy >= in_h as i64 {
            row.fill(0.0);
            return;
        }
        let src_row = &input[sy as usize * in_w * channels..(sy as usize + 1) * in_w * channels];
        for x in 0..roi.width {
            let sx = roi.x as i64 + x as i64;
            let dst = &mut row[x * channels..(x + 1) * channels];
            if sx < 0 || sx >= in_w as i64 {
                dst.fill(0.0);
            } else {
                dst.copy_from_slice(&src_row[sx as usize * channels..(sx as usize + 1) * channels]);
            }
        }
    });
}

/// Bilinear resample of a `channels`-interleaved source covering `roi_in`
/// into a destination covering `roi_out`. Coordinates are center-aligned;
/// samples are clamped at the source edges.
pub fn clip_and_zoom(
    out: &mut [f32],
    input: &[f32],
    roi_out: &Roi,
    roi_in: &Roi,
    channels: usize,
) {
    let ratio = roi_out.scale / roi_in.scale;
    let in_w = roi_in.width;
    let in_h = roi_in.height;
    let row_stride = roi_out.width * channels;
    parallel::for_each_row(out, row_stride, |y, row| {
        let sy = ((roi_out.y as f32 + y as f32 + 0.5) / ratio - roi_in.y as f32 - 0.5)
            .clamp(0.0, (in_h - 1) as f32);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(in_h - 1);
        let fy = sy - y0 as f32;
        for x in 0..roi_out.width {
            let sx = ((roi_out.x as f32 + x as f32 + 0.5) / ratio - roi_in.x as f32 - 0.5)
                .clamp(0.0, (in_w - 1) as f32);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(in_w - 1);
            let fx = sx - x0 as f32;
            let p00 = (y0 * in_w + x0) * channels;
            let p01 = (y0 * in_w + x1) * channels;
            let p10 = (y1 * in_w + x0) * channels;
            let p11 = (y1 * in_w + x1) * channels;
            for c in 0..channels {
                let top = input[p00 + c] * (1.0 - fx) + input[p01 + c] * fx;
                let bottom = input[p10 + c] * (1.0 - fx) + input[p11 + c] * fx;
                row[x * channels + c] = top * (1.0 - fy) + bottom * fy;
            }
        }
    });
}
