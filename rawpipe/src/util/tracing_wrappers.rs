// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Forwarders for the `tracing` event macros. When the `tracing` feature is
//! disabled the macros still type-check their arguments but emit nothing.

#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! debug {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! info {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! warn_ {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    macro_rules! error {
        ($($arg:tt)*) => {
            if false {
                let _ = format_args!($($arg)*);
            }
        };
    }
    pub(crate) use {debug, error, info, trace, warn_};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use noop::{debug, error, info, trace, warn_ as warn};
