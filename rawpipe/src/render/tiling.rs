// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Tiled execution. When a module's declared memory demand does not fit the
//! host budget the scheduler runs it over horizontal bands of the output,
//! each band re-solved through `modify_roi_in` and padded by the module's
//! declared overlap.

use crate::buffer::AlignedBuf;
use crate::error::Result;
use crate::ops::{Operation, Piece};
use crate::roi::Roi;
use crate::util::tracing_wrappers::*;

#[derive(Clone, Copy, Debug)]
pub struct TilingSpec {
    /// Peak memory demand as a multiple of input + output buffer bytes.
    pub factor: f32,
    /// Fixed overhead in bytes on top of the factor.
    pub overhead: usize,
    /// Pixels of extra input each tile needs beyond its own footprint.
    pub overlap: usize,
    /// Tile origin alignment in output pixels.
    pub align: usize,
}

impl Default for TilingSpec {
    fn default() -> TilingSpec {
        TilingSpec {
            factor: 2.0,
            overhead: 0,
            overlap: 0,
            align: 1,
        }
    }
}

impl TilingSpec {
    pub fn demand(&self, in_bytes: usize, out_bytes: usize) -> usize {
        ((in_bytes + out_bytes) as f64 * self.factor as f64) as usize + self.overhead
    }

    pub fn fits(&self, in_bytes: usize, out_bytes: usize, budget: usize) -> bool {
        self.demand(in_bytes, out_bytes) <= budget
    }
}

fn intersect(roi: &Roi, bounds: &Roi) -> Roi {
    let x0 = roi.x.max(bounds.x);
    let y0 = roi.y.max(bounds.y);
    let x1 = (roi.x + roi.width as i32).min(bounds.x + bounds.width as i32);
    let y1 = (roi.y + roi.height as i32).min(bounds.y + bounds.height as i32);
    Roi {
        x: x0,
        y: y0,
        width: (x1 - x0).max(0) as usize,
        height: (y1 - y0).max(0) as usize,
        scale: roi.scale,
    }
}

/// Runs `op` over horizontal bands of `roi_out`. `input` covers `roi_in`;
/// each band copies the slice of input it needs, so the extra memory in
/// flight is bounded by one band instead of the whole frame.
pub fn process_banded(
    op: &dyn Operation,
    piece: &mut Piece,
    input: &[f32],
    output: &mut [f32],
    roi_in: &Roi,
    roi_out: &Roi,
    spec: &TilingSpec,
    budget: usize,
) -> Result<()> {
    let ch_in = piece.dsc_in.channels;
    let ch_out = piece.dsc_out.channels;
    let row_bytes = (roi_out.width * ch_out + roi_in.width * ch_in) * 4;
    let mut band_rows = (budget / spec.factor.max(1.0) as usize / row_bytes.max(1)).max(1);
    band_rows = band_rows.min(roi_out.height);
    // Keep band origins on the declared alignment grid.
    if spec.align > 1 {
        band_rows = (band_rows / spec.align).max(1) * spec.align;
    }
    debug!(
        "tiling {}: {} rows per band over {} output rows",
        op.name(),
        band_rows,
        roi_out.height
    );

    let mut y0 = 0usize;
    while y0 < roi_out.height {
        let rows = band_rows.min(roi_out.height - y0);
        let band_out = Roi {
            x: roi_out.x,
            y: roi_out.y + y0 as i32,
            width: roi_out.width,
            height: rows,
            scale: roi_out.scale,
        };
        let mut band_in = op.modify_roi_in(piece, &band_out);
        band_in.x -= spec.overlap as i32;
        band_in.y -= spec.overlap as i32;
        band_in.width += 2 * spec.overlap;
        band_in.height += 2 * spec.overlap;
        let band_in = intersect(&band_in, roi_in);

        let mut tile_in = AlignedBuf::new(band_in.width * band_in.height * ch_in)?;
        for y in 0..band_in.height {
            let src_y = (band_in.y - roi_in.y) as usize + y;
            let src_x = (band_in.x - roi_in.x) as usize;
            let src = &input[(src_y * roi_in.width + src_x) * ch_in..];
            let dst =
                &mut tile_in.as_mut_slice()[y * band_in.width * ch_in..(y + 1) * band_in.width * ch_in];
            dst.copy_from_slice(&src[..band_in.width * ch_in]);
        }

        let mut tile_out = AlignedBuf::new(band_out.width * band_out.height * ch_out)?;
        op.process(
            piece,
            tile_in.as_slice(),
            tile_out.as_mut_slice(),
            &band_in,
            &band_out,
        )?;

        let out_stride = roi_out.width * ch_out;
        for y in 0..band_out.height {
            let dst = &mut output[(y0 + y) * out_stride..(y0 + y + 1) * out_stride];
            let src =
                &tile_out.as_slice()[y * band_out.width * ch_out..(y + 1) * band_out.width * ch_out];
            dst.copy_from_slice(src);
        }
        y0 += rows;
    }
    Ok(())
}
