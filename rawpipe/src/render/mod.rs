// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The pixel scheduler. A render call names an output region and scale; the
//! scheduler walks the chain tail-to-head solving each module's input ROI,
//! imports the image at the base, then runs every enabled kernel in
//! iop_order on the way back up, propagating the buffer descriptor from
//! module to module. Cancellation is cooperative and checked between nodes.

pub mod clip_zoom;
pub mod tiling;

use std::sync::atomic::{AtomicI32, Ordering};

use crate::blend;
use crate::buffer::{AlignedBuf, BufferDesc, is_aligned};
use crate::colorspace::{self, ColorSpace};
use crate::error::{Error, Result};
use crate::image::ImageRecord;
use crate::ops::{ORDER_SKIP, Piece};
use crate::pipeline::{BackBuffer, ModuleInstance, Pipeline};
use crate::roi::Roi;
use crate::runtime;
use crate::util::tracing_wrappers::*;

/// (Re)creates per-render piece state and commits current parameters.
pub(crate) fn commit_pieces(pipe: &mut Pipeline) -> Result<()> {
    let image = pipe.image.clone();
    if pipe.pieces.len() != pipe.modules.len() {
        pipe.pieces = (0..pipe.modules.len()).map(Piece::new).collect();
    }
    let Pipeline {
        ref modules,
        ref mut pieces,
        ..
    } = *pipe;
    for (i, (module, piece)) in modules.iter().zip(pieces.iter_mut()).enumerate() {
        piece.module_index = i;
        piece.enabled = module.enabled;
        piece.clear_data();
        if piece.enabled {
            module.op.commit_params(&module.params, &image, piece)?;
        }
    }
    Ok(())
}

/// Forward dimension walk at scale 1.0. Fills every piece's full-frame
/// geometry and returns the chain's output dimensions.
pub(crate) fn forward_dimensions(pipe: &mut Pipeline) -> (usize, usize) {
    let mut roi = Roi::full(pipe.image.width(), pipe.image.height());
    let Pipeline {
        ref modules,
        ref mut pieces,
        ..
    } = *pipe;
    for (module, piece) in modules.iter().zip(pieces.iter_mut()) {
        piece.full_in = (roi.width, roi.height);
        if piece.enabled {
            roi = module.op.modify_roi_out(piece, &roi);
        }
        piece.full_out = (roi.width, roi.height);
    }
    (roi.width, roi.height)
}

/// Output dimensions of a full render at scale 1.0, without rendering.
pub fn get_dimensions(pipe: &mut Pipeline) -> Result<(usize, usize)> {
    commit_pieces(pipe)?;
    Ok(forward_dimensions(pipe))
}

enum NodeBuf<'a> {
    Borrowed(&'a [f32]),
    Owned(AlignedBuf),
}

impl NodeBuf<'_> {
    fn as_slice(&self) -> &[f32] {
        match self {
            NodeBuf::Borrowed(s) => s,
            NodeBuf::Owned(b) => b.as_slice(),
        }
    }

    fn into_mut(self) -> Result<AlignedBuf> {
        match self {
            NodeBuf::Borrowed(s) => AlignedBuf::from_slice(s),
            NodeBuf::Owned(b) => Ok(b),
        }
    }
}

struct Ctx<'a> {
    image: &'a ImageRecord,
    modules: &'a [ModuleInstance],
    pieces: &'a mut [Piece],
    shutdown: &'a AtomicI32,
    mask_display: bool,
    budget: usize,
}

impl Ctx<'_> {
    fn check_shutdown(&self) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) != 0 {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Renders `roi` into the pipeline's back buffer. The target ROI is in
/// output coordinates at `roi.scale`.
pub fn process(pipe: &mut Pipeline, roi: Roi) -> Result<()> {
    if !(roi.scale > 0.0 && roi.scale.is_finite()) {
        return Err(Error::InvalidScale(roi.scale));
    }
    if roi.width == 0 || roi.height == 0 {
        return Err(Error::InvalidRegion(roi.x, roi.y, roi.width, roi.height));
    }
    pipe.reset_shutdown();
    commit_pieces(pipe)?;
    forward_dimensions(pipe);

    let (result, dsc) = {
        let Pipeline {
            ref image,
            ref modules,
            ref mut pieces,
            ref shutdown,
            mask_display,
            ..
        } = *pipe;
        let mut ctx = Ctx {
            image: image.as_ref(),
            modules,
            pieces,
            shutdown: shutdown.as_ref(),
            mask_display,
            budget: runtime::memory_budget(),
        };
        let tail = ctx.modules.len() as i64 - 1;
        let (buf, dsc) = process_node(&mut ctx, tail, &roi)?;
        (buf.into_mut()?, dsc)
    };

    if dsc.channels != 4 {
        return Err(Error::BadChannelCount("pipeline output", dsc.channels));
    }
    // Publish into the back buffer, reusing the allocation when the output
    // size is unchanged.
    match &mut pipe.backbuf {
        Some(back) if back.width == roi.width && back.height == roi.height => {
            back.data.as_mut_slice().copy_from_slice(result.as_slice());
        }
        _ => {
            pipe.backbuf = Some(BackBuffer {
                data: result,
                width: roi.width,
                height: roi.height,
            });
        }
    }
    pipe.last_dsc = dsc;
    Ok(())
}

fn import_input<'a>(ctx: &Ctx<'a>, roi_out: &Roi) -> Result<(NodeBuf<'a>, BufferDesc)> {
    let image = ctx.image;
    let input = image.raw();
    let channels = image.channels();
    let (w, h) = (image.width(), image.height());
    let dsc = BufferDesc::for_input(image);
    if roi_out.is_full_frame(w, h) && is_aligned(input) {
        // Borrow the decoder's buffer outright.
        return Ok((NodeBuf::Borrowed(input), dsc));
    }
    let mut out = AlignedBuf::new(roi_out.pixels() * channels)?;
    if roi_out.scale == 1.0 {
        clip_zoom::copy_rows_clamped(out.as_mut_slice(), roi_out, input, w, h, channels);
    } else {
        if channels != 4 {
            return Err(Error::BadChannelCount("input import", channels));
        }
        clip_zoom::clip_and_zoom(out.as_mut_slice(), input, roi_out, &Roi::full(w, h), 4);
    }
    Ok((NodeBuf::Owned(out), dsc))
}

fn process_node<'a>(
    ctx: &mut Ctx<'a>,
    node: i64,
    roi_out: &Roi,
) -> Result<(NodeBuf<'a>, BufferDesc)> {
    ctx.check_shutdown()?;
    if node < 0 {
        return import_input(ctx, roi_out);
    }
    let index = node as usize;
    let op = ctx.modules[index].op;
    let iop_order = ctx.modules[index].iop_order;
    let blend_params = ctx.modules[index].blend;

    // Skip rule: disabled pieces and order-skipped modules pass the request
    // through untouched.
    if !ctx.pieces[index].enabled || iop_order == ORDER_SKIP {
        return process_node(ctx, node - 1, roi_out);
    }

    let roi_in = op.modify_roi_in(&ctx.pieces[index], roi_out);
    let (input, dsc_in) = process_node(ctx, node - 1, &roi_in)?;
    ctx.check_shutdown()?;

    let image = ctx.image;
    ctx.pieces[index].dsc_in = dsc_in;
    let mut dsc_out = dsc_in;
    op.output_format(&mut ctx.pieces[index], image, &mut dsc_out);
    if dsc_out.channels != 1 && dsc_out.channels != 4 {
        return Err(Error::BadChannelCount(op.name(), dsc_out.channels));
    }
    if dsc_out.channels != dsc_in.channels
        && !(dsc_in.channels == 1 && dsc_out.channels == 4 && op.name() == "demosaic")
    {
        return Err(Error::ChannelTransition(
            op.name(),
            dsc_in.channels,
            dsc_out.channels,
        ));
    }
    ctx.pieces[index].dsc_out = dsc_out;

    let mut out = AlignedBuf::new(roi_out.pixels() * dsc_out.channels)?;

    // Mask-display bypass: non-distorting modules are transparent while the
    // caller inspects a mask.
    if ctx.mask_display
        && !op.flags().distort
        && dsc_in.bpp() == dsc_out.bpp()
        && roi_in == *roi_out
    {
        out.as_mut_slice().copy_from_slice(input.as_slice());
        return Ok((NodeBuf::Owned(out), dsc_out));
    }

    // Colorspace adaptation: convert in place when the module wants its
    // input in a different space than the upstream buffer carries.
    let want = op.input_colorspace(&ctx.pieces[index], &dsc_in);
    let input = if want != dsc_in.cst && want != ColorSpace::None && dsc_in.cst != ColorSpace::None
    {
        let mut owned = input.into_mut()?;
        colorspace::transform(owned.as_mut_slice(), roi_in.width, dsc_in.cst, want)?;
        ctx.pieces[index].dsc_in.cst = want;
        NodeBuf::Owned(owned)
    } else {
        input
    };

    assert!(is_aligned(input.as_slice()), "unaligned input buffer");
    assert!(is_aligned(out.as_slice()), "unaligned output buffer");

    // Tiling dispatch against the host memory budget.
    let spec = op.tiling(&ctx.pieces[index], &roi_in, roi_out);
    let in_bytes = roi_in.pixels() * dsc_in.bpp();
    let out_bytes = roi_out.pixels() * dsc_out.bpp();
    let piece = &mut ctx.pieces[index];
    if !spec.fits(in_bytes, out_bytes, ctx.budget) && op.flags().allow_tiling {
        trace!(
            "{} does not fit the memory budget, running banded",
            op.name()
        );
        tiling::process_banded(
            op,
            piece,
            input.as_slice(),
            out.as_mut_slice(),
            &roi_in,
            roi_out,
            &spec,
            ctx.budget,
        )?;
    } else {
        op.process(
            piece,
            input.as_slice(),
            out.as_mut_slice(),
            &roi_in,
            roi_out,
        )?;
    }

    // Reserved blend step: colorspace transforms run, blend math does not.
    if op.flags().supports_blending
        && let Some(bp) = blend_params
    {
        let mut blend_input = input.into_mut()?;
        blend::process(
            op,
            &ctx.pieces[index],
            &bp,
            blend_input.as_mut_slice(),
            out.as_mut_slice(),
            &roi_in,
            roi_out,
        )?;
    }

    Ok((NodeBuf::Owned(out), dsc_out))
}
