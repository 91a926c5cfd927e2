// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Orientation: applies the EXIF flip/transpose so the rest of the chain and
//! the caller see upright pixels. The only geometry module in the default
//! chain; it translates ROIs exactly in both directions.

use num_traits::FromPrimitive;

use crate::error::Result;
use crate::image::{ImageRecord, Orientation};
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::roi::{Roi, scaled_dim};
use crate::util::parallel;
use crate::util::tracing_wrappers::*;

pub struct Flip;

/// Parameter value that means "use the image's EXIF orientation".
pub const ORIENTATION_FROM_IMAGE: i32 = -1;

const TABLE: &[ParamDesc] = &[ParamDesc::i32("orientation", 0, -1.0, 8.0)];

struct Data {
    swap: bool,
    flip_x: bool,
    flip_y: bool,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("flip params not committed")
}

/// Scaled full-frame dimensions on the input and output side of the piece.
fn frames(piece: &Piece, scale: f32) -> ((usize, usize), (usize, usize)) {
    (
        (
            scaled_dim(piece.full_in.0, scale),
            scaled_dim(piece.full_in.1, scale),
        ),
        (
            scaled_dim(piece.full_out.0, scale),
            scaled_dim(piece.full_out.1, scale),
        ),
    )
}

impl Operation for Flip {
    fn name(&self) -> &'static str {
        "flip"
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            distort: true,
            one_instance: true,
            ..OpFlags::default()
        }
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, _image: &ImageRecord) -> Vec<u8> {
        let mut record = params::new_record(TABLE);
        params::find(TABLE, "orientation")
            .expect("static table")
            .write_i32(&mut record, ORIENTATION_FROM_IMAGE)
            .expect("static table");
        record
    }

    fn default_enabled(&self, image: &ImageRecord) -> bool {
        image.orientation() != Orientation::Normal
    }

    fn commit_params(&self, record: &[u8], image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        let raw = params::find(TABLE, "orientation")
            .expect("static table")
            .read_i32(record)?;
        let orientation = if raw == ORIENTATION_FROM_IMAGE {
            image.orientation()
        } else {
            Orientation::from_i32(raw).unwrap_or_else(|| {
                warn!("invalid orientation {}, treating as normal", raw);
                Orientation::Normal
            })
        };
        if orientation == Orientation::Normal {
            piece.enabled = false;
            return Ok(());
        }
        let (swap, flip_x, flip_y) = orientation.decompose();
        piece.set_data(Data {
            swap,
            flip_x,
            flip_y,
        });
        Ok(())
    }

    fn modify_roi_out(&self, piece: &Piece, roi_in: &Roi) -> Roi {
        let d = data(piece);
        let scale = roi_in.scale;
        let (_, (out_w, out_h)) = frames_from_in(piece, scale, d);
        let (mut x, mut y, mut w, mut h) = (roi_in.x, roi_in.y, roi_in.width, roi_in.height);
        if d.swap {
            (x, y, w, h) = (y, x, h, w);
        }
        if d.flip_x {
            x = out_w as i32 - x - w as i32;
        }
        if d.flip_y {
            y = out_h as i32 - y - h as i32;
        }
        Roi {
            x,
            y,
            width: w,
            height: h,
            scale,
        }
    }

    fn modify_roi_in(&self, piece: &Piece, roi_out: &Roi) -> Roi {
        let d = data(piece);
        let scale = roi_out.scale;
        let (_, (out_w, out_h)) = frames(piece, scale);
        let (mut x, mut y, mut w, mut h) = (roi_out.x, roi_out.y, roi_out.width, roi_out.height);
        if d.flip_x {
            x = out_w as i32 - x - w as i32;
        }
        if d.flip_y {
            y = out_h as i32 - y - h as i32;
        }
        if d.swap {
            (x, y, w, h) = (y, x, h, w);
        }
        Roi {
            x,
            y,
            width: w,
            height: h,
            scale,
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
        let (swap, flip_x, flip_y) = (d.swap, d.flip_x, d.flip_y);
        let ((_, _), (out_w, out_h)) = frames(piece, roi_out.scale);
        let in_w = roi_in.width;
        let in_h = roi_in.height;
        let (ix0, iy0) = (roi_in.x, roi_in.y);
        let stride = roi_out.width * 4;
        parallel::for_each_row(output, stride, move |y, row| {
            let yo = roi_out.y + y as i32;
            for (x, px) in row.chunks_mut(4).enumerate() {
                let xo = roi_out.x + x as i32;
                // Undo the flips in output space, then the transpose.
                let mut xu = xo;
                let mut yu = yo;
                if flip_x {
                    xu = out_w as i32 - 1 - xu;
                }
                if flip_y {
                    yu = out_h as i32 - 1 - yu;
                }
                let (xi, yi) = if swap { (yu, xu) } else { (xu, yu) };
                let lx = (xi - ix0).clamp(0, in_w as i32 - 1) as usize;
                let ly = (yi - iy0).clamp(0, in_h as i32 - 1) as usize;
                px.copy_from_slice(&input[(ly * in_w + lx) * 4..(ly * in_w + lx) * 4 + 4]);
            }
        });
        Ok(())
    }
}

/// `modify_roi_out` runs before `full_out` is recorded, so the output frame
/// has to be derived from the input side.
fn frames_from_in(piece: &Piece, scale: f32, d: &Data) -> ((usize, usize), (usize, usize)) {
    let in_w = scaled_dim(piece.full_in.0, scale);
    let in_h = scaled_dim(piece.full_in.1, scale);
    if d.swap {
        ((in_w, in_h), (in_h, in_w))
    } else {
        ((in_w, in_h), (in_w, in_h))
    }
}
