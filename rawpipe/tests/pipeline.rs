// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! End-to-end scenarios over a synthetic Bayer sensor: the render and
//! history contracts a caller of the public surface relies on.

use std::sync::Arc;

use rawpipe::api;
use rawpipe::error::{Error, status};
use rawpipe::image::{FILTERS_RGGB, FILTERS_XTRANS, ImageParams, ImageRecord, Orientation};
use rawpipe::pipeline::Pipeline;

const SENSOR_W: usize = 128;
const SENSOR_H: usize = 96;

fn bayer_image(orientation: Orientation) -> Arc<ImageRecord> {
    // A smooth gradient keeps the demosaic honest without banding.
    let raw: Vec<f32> = (0..SENSOR_W * SENSOR_H)
        .map(|i| {
            let x = (i % SENSOR_W) as f32 / SENSOR_W as f32;
            let y = (i / SENSOR_W) as f32 / SENSOR_H as f32;
            0.2 + 0.5 * x + 0.2 * y
        })
        .collect();
    ImageRecord::new(ImageParams {
        width: SENSOR_W,
        height: SENSOR_H,
        raw,
        filters: FILTERS_RGGB,
        wb_coeffs: [1.8, 1.0, 1.4, 1.0],
        maker: "ExampleCo".into(),
        model: "EC-1".into(),
        orientation,
        ..Default::default()
    })
    .unwrap()
}

fn pipeline() -> Pipeline {
    Pipeline::new(bayer_image(Orientation::Normal)).unwrap()
}

#[test]
fn quarter_scale_render_on_fresh_pipeline() {
    let mut pipe = pipeline();
    let result = api::render(&mut pipe, 0.25).unwrap();
    assert_eq!(result.width, SENSOR_W / 4);
    assert_eq!(result.height, SENSOR_H / 4);
    assert_eq!(result.stride, result.width * 4);
    assert!(!result.pixels.is_empty());
    // The top-left pixel is readable and opaque.
    assert_eq!(result.pixels[3], 255);
}

#[test]
fn half_scale_region_render() {
    let mut pipe = pipeline();
    let result = api::render_region(
        &mut pipe,
        SENSOR_W / 4,
        SENSOR_H / 4,
        SENSOR_W / 2,
        SENSOR_H / 2,
        0.5,
    )
    .unwrap();
    assert_eq!(result.width, SENSOR_W / 2 / 2);
    assert_eq!(result.height, SENSOR_H / 2 / 2);
}

#[test]
fn region_matches_full_render_crop() {
    let mut pipe = pipeline();
    let full = api::render(&mut pipe, 1.0).unwrap();
    let region = api::render_region(&mut pipe, 32, 32, 48, 32, 1.0).unwrap();
    assert_eq!(region.width, 48);
    assert_eq!(region.height, 32);
    for y in 0..region.height {
        for x in 0..region.width {
            let r = region.pixels[(y * region.width + x) * 4];
            let f = full.pixels[((y + 32) * full.width + (x + 32)) * 4];
            assert!(
                (r as i32 - f as i32).abs() <= 1,
                "mismatch at ({x},{y}): {r} vs {f}"
            );
        }
    }
}

#[test]
fn param_set_get_is_bit_exact() {
    let mut pipe = pipeline();
    api::set_param_f32(&mut pipe, "exposure", "exposure", 1.5).unwrap();
    let v = api::get_param_f32(&pipe, "exposure", "exposure").unwrap();
    assert_eq!(v.to_bits(), 1.5f32.to_bits());
}

#[test]
fn history_round_trip_restores_and_reserializes() {
    let mut pipe = pipeline();
    api::set_param_f32(&mut pipe, "exposure", "exposure", 1.5).unwrap();
    let doc1 = api::serialize_history(&pipe);
    api::set_param_f32(&mut pipe, "exposure", "exposure", 0.0).unwrap();
    api::load_history(&mut pipe, &doc1).unwrap();
    let v = api::get_param_f32(&pipe, "exposure", "exposure").unwrap();
    assert_eq!(v.to_bits(), 1.5f32.to_bits());
    assert_eq!(api::serialize_history(&pipe), doc1);
}

#[test]
fn history_without_version_is_format_error() {
    let mut pipe = pipeline();
    let err = api::load_history(&mut pipe, "{ \"modules\": {} }").unwrap_err();
    assert_eq!(err.status(), status::FORMAT);
}

#[test]
fn exposure_brightens_the_render() {
    let mut pipe = pipeline();
    let base = api::render(&mut pipe, 0.25).unwrap();
    api::set_param_f32(&mut pipe, "exposure", "exposure", 1.0).unwrap();
    let brighter = api::render(&mut pipe, 0.25).unwrap();
    let sum = |p: &[u8]| -> u64 { p.iter().step_by(4).map(|&v| v as u64).sum() };
    assert!(sum(&brighter.pixels) > sum(&base.pixels));
}

#[test]
fn disabling_a_module_changes_the_result() {
    let mut pipe = pipeline();
    let wb = api::render(&mut pipe, 0.5).unwrap();
    api::enable_module(&mut pipe, "temperature", false).unwrap();
    let plain = api::render(&mut pipe, 0.5).unwrap();
    assert_ne!(wb.pixels, plain.pixels);
}

#[test]
fn rotated_image_swaps_output_dimensions() {
    let mut pipe = Pipeline::new(bayer_image(Orientation::Rotate90)).unwrap();
    let result = api::render(&mut pipe, 1.0).unwrap();
    assert_eq!(result.width, SENSOR_H);
    assert_eq!(result.height, SENSOR_W);
}

#[test]
fn xtrans_sensor_renders_via_passthrough() {
    // A 6x6 X-Trans pattern: greens dominate, reds and blues scattered.
    let xtrans: [[u8; 6]; 6] = [
        [1, 1, 0, 1, 1, 2],
        [1, 1, 2, 1, 1, 0],
        [2, 0, 1, 0, 2, 1],
        [1, 1, 2, 1, 1, 0],
        [1, 1, 0, 1, 1, 2],
        [0, 2, 1, 2, 0, 1],
    ];
    let image = ImageRecord::new(ImageParams {
        width: 48,
        height: 48,
        raw: vec![0.5; 48 * 48],
        filters: FILTERS_XTRANS,
        xtrans,
        ..Default::default()
    })
    .unwrap();
    let mut pipe = Pipeline::new(image).unwrap();
    let result = api::render(&mut pipe, 1.0).unwrap();
    assert_eq!(result.width, 48);
    assert!(result.pixels.iter().any(|&v| v > 0));
}

#[test]
fn unknown_module_lookups_are_not_found() {
    let mut pipe = pipeline();
    assert!(matches!(
        api::enable_module(&mut pipe, "nonexistent", true),
        Err(Error::UnknownOperation(_))
    ));
    assert_eq!(
        api::get_param_f32(&pipe, "nonexistent", "x")
            .unwrap_err()
            .status(),
        status::NOT_FOUND
    );
}

#[test]
fn synthetic_sidecar_sets_exposure() {
    // Hex-encoded exposure record: black = 0.0, exposure = 1.0, bias off.
    let mut record = vec![0u8; 9];
    record[4..8].copy_from_slice(&1.0f32.to_le_bytes());
    let hex: String = record.iter().map(|b| format!("{b:02x}")).collect();
    let doc = format!(
        "<?xml version=\"1.0\"?><x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
         <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\
         <rdf:Description xmlns:pipe=\"http://rawpipe.org/xmp/1.0/\">\
         <pipe:history><rdf:Seq>\
         <rdf:li pipe:operation=\"exposure\" pipe:num=\"0\" pipe:enabled=\"1\" \
         pipe:modversion=\"1\" pipe:params=\"{hex}\"/>\
         </rdf:Seq></pipe:history></rdf:Description></rdf:RDF></x:xmpmeta>"
    );
    let dir = std::env::temp_dir();
    let path = dir.join("rawpipe-int-sidecar.xmp");
    std::fs::write(&path, doc).unwrap();
    let mut pipe = pipeline();
    api::load_sidecar(&mut pipe, &path).unwrap();
    std::fs::remove_file(&path).unwrap();
    let v = api::get_param_f32(&pipe, "exposure", "exposure").unwrap();
    assert!((v - 1.0).abs() < 1e-4);
}

#[test]
fn sidecar_save_and_load_round_trip() {
    let mut pipe = pipeline();
    api::set_param_f32(&mut pipe, "sharpen", "amount", 0.75).unwrap();
    api::enable_module(&mut pipe, "sharpen", true).unwrap();
    let path = std::env::temp_dir().join("rawpipe-int-roundtrip.xmp");
    api::save_sidecar(&pipe, &path).unwrap();
    let mut other = pipeline();
    api::load_sidecar(&mut other, &path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(api::is_module_enabled(&other, "sharpen").unwrap());
    assert_eq!(
        api::get_param_f32(&other, "sharpen", "amount")
            .unwrap()
            .to_bits(),
        0.75f32.to_bits()
    );
}
