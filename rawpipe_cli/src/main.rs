// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use rawpipe::api;
use rawpipe::error::Error;
use rawpipe::pipeline::Pipeline;
use rawpipe_cli::{dec, enc};

#[derive(Parser)]
#[command(version, about = "Process a camera raw file into a finished image")]
struct Opt {
    /// Input raw file (ARW, CR2, NEF, RAF, DNG, ...).
    input: PathBuf,

    /// Output image, should end in .jpg, .png or .tif
    /// (optional with --print-history or --write-sidecar).
    #[clap(required_unless_present_any = ["print_history", "write_sidecar"])]
    output: Option<PathBuf>,

    /// Output scale relative to full resolution, in (0, 1].
    #[clap(long, short, default_value_t = 1.0)]
    scale: f32,

    /// Render only this region, given as full-resolution X Y W H.
    #[clap(long, num_args = 4, value_names = ["X", "Y", "W", "H"])]
    region: Option<Vec<usize>>,

    /// Apply an XMP sidecar before rendering.
    #[clap(long)]
    sidecar: Option<PathBuf>,

    /// Apply a JSON history document before rendering.
    #[clap(long)]
    history: Option<PathBuf>,

    /// Set a parameter, e.g. --set exposure.exposure=1.5. Repeatable.
    #[clap(long = "set", value_name = "OP.FIELD=VALUE")]
    set: Vec<String>,

    /// Enable a module. Repeatable.
    #[clap(long, value_name = "OP")]
    enable: Vec<String>,

    /// Disable a module. Repeatable.
    #[clap(long, value_name = "OP")]
    disable: Vec<String>,

    /// JPEG quality.
    #[clap(long, short, default_value_t = 92)]
    quality: u32,

    /// TIFF bit depth (8, 16 or 32).
    #[clap(long, default_value_t = 8)]
    bits: u32,

    /// Print the history document for the configured pipeline.
    #[clap(long)]
    print_history: bool,

    /// Write the configured pipeline to an XMP sidecar.
    #[clap(long)]
    write_sidecar: Option<PathBuf>,
}

fn apply_set(pipe: &mut Pipeline, spec: &str) -> Result<()> {
    let (target, value) = spec
        .split_once('=')
        .ok_or_else(|| eyre!("--set expects op.field=value, got {:?}", spec))?;
    let (op, field) = target
        .split_once('.')
        .ok_or_else(|| eyre!("--set expects op.field=value, got {:?}", spec))?;
    let number: f32 = value
        .parse()
        .wrap_err_with(|| format!("{:?} is not a number", value))?;
    match pipe.set_param_f32(op, field, number) {
        Err(Error::ParamType { .. }) => {
            let int: i32 = value
                .parse()
                .wrap_err_with(|| format!("{:?} is not an integer", value))?;
            pipe.set_param_i32(op, field, int)?;
            Ok(())
        }
        other => Ok(other?),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    #[cfg(feature = "tracing-subscriber")]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::parse();

    // Idempotent; a second driver in the same process just gets AlreadyInit.
    let _ = rawpipe::runtime::init(std::env::temp_dir());

    let image = dec::load_raw(&opt.input)?;
    let mut pipe = Pipeline::new(image).map_err(|e| eyre!(e.to_string()))?;

    if let Some(path) = &opt.sidecar {
        api::load_sidecar(&mut pipe, path)
            .wrap_err_with(|| format!("Failed to apply sidecar {:?}", path))?;
    }
    if let Some(path) = &opt.history {
        let doc = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read {:?}", path))?;
        api::load_history(&mut pipe, &doc)
            .wrap_err_with(|| format!("Failed to apply history {:?}", path))?;
    }
    for op in &opt.enable {
        api::enable_module(&mut pipe, op, true)?;
    }
    for op in &opt.disable {
        api::enable_module(&mut pipe, op, false)?;
    }
    for spec in &opt.set {
        apply_set(&mut pipe, spec)?;
    }

    if opt.print_history {
        println!("{}", api::serialize_history(&pipe));
    }
    if let Some(path) = &opt.write_sidecar {
        api::save_sidecar(&pipe, path)
            .wrap_err_with(|| format!("Failed to write sidecar {:?}", path))?;
    }

    let Some(output) = &opt.output else {
        return Ok(());
    };

    let result = match &opt.region {
        Some(region) => {
            let &[x, y, w, h] = region.as_slice() else {
                return Err(eyre!("--region expects four values"));
            };
            api::render_region(&mut pipe, x, y, w, h, opt.scale)?
        }
        None => api::render(&mut pipe, opt.scale)?,
    };
    enc::export(&pipe, &result, output, opt.quality, opt.bits)?;
    Ok(())
}
