// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Reserved blending hook. The engine carries the blend step's colorspace
//! contract so parameter sets from full-featured histories keep meaning, but
//! the blend math itself is not wired up: input and output are converted to
//! the declared blend colorspace and back, and the output wins.

use crate::colorspace::{self, ColorSpace};
use crate::error::Result;
use crate::ops::{Operation, Piece};
use crate::roi::Roi;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendParams {
    pub blend_cst: ColorSpace,
    pub opacity: f32,
}

/// Runs the declared colorspace transforms for a blend step. The blend
/// itself is a no-op: the module output passes through unchanged.
pub fn process(
    op: &dyn Operation,
    piece: &Piece,
    blend: &BlendParams,
    input: &mut [f32],
    output: &mut [f32],
    roi_in: &Roi,
    roi_out: &Roi,
) -> Result<()> {
    let cst = if blend.blend_cst == ColorSpace::None {
        op.blend_colorspace(piece)
    } else {
        blend.blend_cst
    };
    if piece.dsc_in.channels == 4 {
        colorspace::transform(input, roi_in.width, piece.dsc_in.cst, cst)?;
        colorspace::transform(input, roi_in.width, cst, piece.dsc_in.cst)?;
    }
    if piece.dsc_out.channels == 4 {
        colorspace::transform(output, roi_out.width, piece.dsc_out.cst, cst)?;
        colorspace::transform(output, roi_out.width, cst, piece.dsc_out.cst)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn blend_is_a_no_op_on_the_output() {
        let op = crate::ops::lookup("exposure").unwrap();
        let piece = {
            let mut p = Piece::new(0);
            p.dsc_in.cst = ColorSpace::Rgb;
            p.dsc_out.cst = ColorSpace::Rgb;
            p
        };
        let blend = BlendParams {
            blend_cst: ColorSpace::Lab,
            opacity: 1.0,
        };
        let roi = Roi::full(2, 1);
        let mut input = vec![0.25f32, 0.5, 0.75, 1.0, 0.1, 0.2, 0.3, 1.0];
        let mut output = input.clone();
        let before = output.clone();
        process(op, &piece, &blend, &mut input, &mut output, &roi, &roi).unwrap();
        for (a, b) in output.iter().zip(before.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
