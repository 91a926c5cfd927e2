// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::{colorspace::ColorSpace, params::ParamType};

/// Status codes of the external (C-callable) surface. Exactly one code per
/// call; `Error::status` maps every variant onto one of these.
pub mod status {
    pub const OK: i32 = 0;
    pub const GENERIC: i32 = -1;
    pub const IO: i32 = -2;
    pub const MEMORY: i32 = -3;
    pub const INVALID_ARG: i32 = -4;
    pub const NOT_FOUND: i32 = -5;
    pub const PARAMETER_TYPE: i32 = -6;
    pub const FORMAT: i32 = -7;
    pub const ALREADY_INIT: i32 = -8;
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine already initialized")]
    AlreadyInit,
    #[error("Invalid scale: {0}")]
    InvalidScale(f32),
    #[error("Invalid region: {2}x{3}+{0}+{1}")]
    InvalidRegion(i32, i32, usize, usize),
    #[error("Invalid bit depth: {0}, expected 8, 16 or 32")]
    InvalidBitDepth(u32),
    #[error("Invalid quality: {0}, expected 1..=100")]
    InvalidQuality(u32),
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(usize, usize),
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),
    #[error("Raw buffer length {0} does not match {1}x{2}x{3}")]
    RawBufferMismatch(usize, usize, usize, usize),
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Unknown field {0}.{1}")]
    UnknownField(String, String),
    #[error("Type mismatch for field {field}: expected {expected:?}, found {found:?}")]
    ParamType {
        field: &'static str,
        expected: ParamType,
        found: ParamType,
    },
    #[error("Field {field} extends past the parameter record ({end} > {size})")]
    ParamExtent {
        field: &'static str,
        end: usize,
        size: usize,
    },
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    #[error("Render cancelled")]
    Cancelled,
    #[error("Module {0} cannot process {1} channel buffers")]
    BadChannelCount(&'static str, usize),
    #[error("Module {0} changed channel count {1} -> {2}")]
    ChannelTransition(&'static str, usize, usize),
    #[error("No colorspace transform {0:?} -> {1:?}")]
    UnsupportedColorspace(ColorSpace, ColorSpace),
    #[error("History document has no version key")]
    MissingVersion,
    #[error("Unsupported history version: {0}")]
    UnsupportedVersion(String),
    #[error("Malformed history document: {0}")]
    MalformedHistory(String),
    #[error("Malformed sidecar: {0}")]
    MalformedSidecar(String),
    #[error("Malformed order list: {0}")]
    MalformedOrder(String),
    #[error("Order rule violated: {0} must precede {1}")]
    OrderRule(&'static str, &'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Collapses the error into the status taxonomy of the C surface.
    pub fn status(&self) -> i32 {
        match self {
            Error::AlreadyInit => status::ALREADY_INIT,
            Error::InvalidScale(_)
            | Error::InvalidRegion(..)
            | Error::InvalidBitDepth(_)
            | Error::InvalidQuality(_)
            | Error::InvalidImageSize(..)
            | Error::ImageSizeTooLarge(..)
            | Error::RawBufferMismatch(..) => status::INVALID_ARG,
            Error::UnknownOperation(_) | Error::UnknownField(..) => status::NOT_FOUND,
            Error::ParamType { .. } | Error::ParamExtent { .. } => status::PARAMETER_TYPE,
            Error::OutOfMemory(_) => status::MEMORY,
            Error::MissingVersion
            | Error::UnsupportedVersion(_)
            | Error::MalformedHistory(_)
            | Error::MalformedSidecar(_)
            | Error::MalformedOrder(_)
            | Error::OrderRule(..) => status::FORMAT,
            Error::Io(_) => status::IO,
            Error::Cancelled
            | Error::BadChannelCount(..)
            | Error::ChannelTransition(..)
            | Error::UnsupportedColorspace(..) => status::GENERIC,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
