// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The operation registry. Each image operation is a stateless singleton
//! implementing [`Operation`]; per-pipeline state lives in the module
//! instance's parameter record and per-render state in a [`Piece`]. Hooks a
//! module does not care about fall back to the trait defaults.

use std::any::Any;

use crate::buffer::BufferDesc;
use crate::colorspace::ColorSpace;
use crate::error::Result;
use crate::image::ImageRecord;
use crate::params::ParamDesc;
use crate::render::tiling::TilingSpec;
use crate::roi::Roi;

mod colorin;
mod colorout;
mod demosaic;
mod exposure;
mod finalscale;
mod flip;
mod gamma;
mod highlights;
mod invert;
mod rawprepare;
mod sharpen;
mod temperature;

pub use demosaic::DemosaicMethod;

/// Longest operation name accepted on any wire format.
pub const MAX_OP_NAME: usize = 20;

/// iop_order value that excludes a module from execution entirely.
pub const ORDER_SKIP: i32 = i32::MAX;

#[derive(Clone, Copy, Debug, Default)]
pub struct OpFlags {
    pub supports_blending: bool,
    pub allow_tiling: bool,
    pub one_instance: bool,
    pub no_masks: bool,
    pub deprecated: bool,
    /// Geometry-changing module; exempt from the mask-display bypass.
    pub distort: bool,
    pub fence: bool,
}

/// Per-render, per-module state. Created when a render commits parameters
/// and dropped with the pipeline.
pub struct Piece {
    pub enabled: bool,
    pub module_index: usize,
    /// Full-frame dimensions entering/leaving this module at scale 1.0,
    /// captured by the forward geometry walk.
    pub full_in: (usize, usize),
    pub full_out: (usize, usize),
    pub dsc_in: BufferDesc,
    pub dsc_out: BufferDesc,
    data: Option<Box<dyn Any + Send>>,
}

impl Piece {
    pub fn new(module_index: usize) -> Piece {
        Piece {
            enabled: true,
            module_index,
            full_in: (0, 0),
            full_out: (0, 0),
            dsc_in: BufferDesc::seed(),
            dsc_out: BufferDesc::seed(),
            data: None,
        }
    }

    pub fn set_data<T: Any + Send>(&mut self, data: T) {
        self.data = Some(Box::new(data));
    }

    pub fn data<T: Any + Send>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref())
    }

    pub fn data_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.data.as_mut().and_then(|d| d.downcast_mut())
    }

    pub fn clear_data(&mut self) {
        self.data = None;
    }
}

pub trait Operation: Send + Sync {
    /// Stable operation name; at most [`MAX_OP_NAME`] bytes.
    fn name(&self) -> &'static str;

    fn version(&self) -> i32 {
        1
    }

    fn flags(&self) -> OpFlags {
        OpFlags::default()
    }

    fn param_table(&self) -> &'static [ParamDesc];

    /// Default parameter record for the given image.
    fn default_params(&self, image: &ImageRecord) -> Vec<u8>;

    fn default_enabled(&self, _image: &ImageRecord) -> bool {
        false
    }

    /// Copies validated parameters into piece state. May clear
    /// `piece.enabled` when the module is a no-op for this image.
    fn commit_params(
        &self,
        _params: &[u8],
        _image: &ImageRecord,
        _piece: &mut Piece,
    ) -> Result<()> {
        Ok(())
    }

    fn modify_roi_out(&self, _piece: &Piece, roi_in: &Roi) -> Roi {
        *roi_in
    }

    fn modify_roi_in(&self, _piece: &Piece, roi_out: &Roi) -> Roi {
        *roi_out
    }

    /// Mutates the buffer descriptor this module writes: channel count,
    /// colorspace tag, CFA state, processed maximum.
    fn output_format(&self, _piece: &mut Piece, _image: &ImageRecord, _dsc: &mut BufferDesc) {}

    /// Colorspace this module wants its input in. When the upstream buffer
    /// disagrees the scheduler converts in place before calling `process`.
    fn input_colorspace(&self, _piece: &Piece, dsc: &BufferDesc) -> ColorSpace {
        dsc.cst
    }

    fn output_colorspace(&self, _piece: &Piece, dsc: &BufferDesc) -> ColorSpace {
        dsc.cst
    }

    /// Colorspace the (reserved) blend step runs in.
    fn blend_colorspace(&self, piece: &Piece) -> ColorSpace {
        self.input_colorspace(piece, &piece.dsc_in)
    }

    fn tiling(&self, _piece: &Piece, _roi_in: &Roi, _roi_out: &Roi) -> TilingSpec {
        TilingSpec::default()
    }

    /// The pixel kernel. `input` covers `roi_in` with `piece.dsc_in`
    /// channels, `output` covers `roi_out` with `piece.dsc_out` channels.
    fn process(
        &self,
        piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()>;
}

static OPERATIONS: [&dyn Operation; 12] = [
    &rawprepare::RawPrepare,
    &invert::Invert,
    &temperature::Temperature,
    &highlights::Highlights,
    &demosaic::Demosaic,
    &flip::Flip,
    &exposure::Exposure,
    &finalscale::FinalScale,
    &colorin::ColorIn,
    &sharpen::Sharpen,
    &colorout::ColorOut,
    &gamma::Gamma,
];

pub fn all() -> &'static [&'static dyn Operation] {
    &OPERATIONS
}

pub fn lookup(name: &str) -> Option<&'static dyn Operation> {
    OPERATIONS.iter().copied().find(|op| op.name() == name)
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn names_are_unique_and_short() {
        for (i, a) in OPERATIONS.iter().enumerate() {
            assert!(!a.name().is_empty() && a.name().len() <= MAX_OP_NAME);
            for b in OPERATIONS.iter().skip(i + 1) {
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn lookup_finds_every_operation() {
        for op in OPERATIONS.iter() {
            assert!(lookup(op.name()).is_some());
        }
        assert!(lookup("nonexistent").is_none());
    }

    #[test]
    fn piece_data_downcast() {
        let mut piece = Piece::new(0);
        piece.set_data(42u64);
        assert_eq!(piece.data::<u64>(), Some(&42));
        assert_eq!(piece.data::<f32>(), None);
        piece.clear_data();
        assert_eq!(piece.data::<u64>(), None);
    }
}
