// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Process-wide runtime state: the data directory, the host memory budget
//! that drives the tile-vs-full-buffer decision, and a worker-count hint.
//! Initialized exactly once under a first-call guard, read-only afterwards.
//! Nothing that a pipeline could own lives here.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Conservative default when the host does not say otherwise: 1 GiB.
pub const DEFAULT_MEMORY_BUDGET: usize = 1 << 30;

#[derive(Debug)]
pub struct Runtime {
    data_dir: PathBuf,
    memory_budget: usize,
    workers: usize,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Initializes the engine. Safe under concurrent first calls; exactly one
/// wins and every later call reports [`Error::AlreadyInit`].
pub fn init(data_dir: impl Into<PathBuf>) -> Result<()> {
    init_with_budget(data_dir, DEFAULT_MEMORY_BUDGET)
}

pub fn init_with_budget(data_dir: impl Into<PathBuf>, memory_budget: usize) -> Result<()> {
    let runtime = Runtime {
        data_dir: data_dir.into(),
        memory_budget,
        workers: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    };
    RUNTIME.set(runtime).map_err(|_| Error::AlreadyInit)
}

/// Tears the engine down. Idempotent; the singleton itself stays published
/// for the lifetime of the process, so this is a contract point rather than
/// a deallocation.
pub fn cleanup() {}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

pub fn data_dir() -> Option<&'static Path> {
    RUNTIME.get().map(|r| r.data_dir.as_path())
}

pub fn memory_budget() -> usize {
    RUNTIME.get().map_or(DEFAULT_MEMORY_BUDGET, |r| r.memory_budget)
}

pub fn workers() -> usize {
    RUNTIME.get().map_or(1, |r| r.workers)
}
