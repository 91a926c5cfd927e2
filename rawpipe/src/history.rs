// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! History serialization: the JSON document that captures the chain's
//! enabled flags and parameter records. The emitter is deterministic, which
//! is what makes `serialize(load(serialize(p)))` byte-identical; loading is
//! best-effort with field-level warn-and-skip.

use std::fmt::Write as _;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::params::{ParamDesc, ParamType};
use crate::pipeline::Pipeline;
use crate::order::{self, OrderKind};
use crate::util::tracing_wrappers::*;

pub const DOCUMENT_VERSION: &str = "1.0";
pub const COLOR_WORKFLOW: &str = "display-referred";

fn generator() -> String {
    format!("rawpipe {}", env!("CARGO_PKG_VERSION"))
}

/// Formats a float with 8 significant digits, trailing zeros trimmed, and a
/// decimal point always present. Non-finite values are coerced to 0.0.
pub(crate) fn format_float(v: f32) -> String {
    if !v.is_finite() {
        warn!("non-finite parameter value {} coerced to 0.0", v);
        return "0.0".to_string();
    }
    if v == 0.0 {
        return "0.0".to_string();
    }
    let exp = v.abs().log10().floor() as i32;
    let decimals = (7 - exp).max(1) as usize;
    let mut s = format!("{:.*}", decimals, v);
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn emit_param(out: &mut String, desc: &ParamDesc, record: &[u8]) {
    match desc.ty {
        ParamType::F32 => {
            let v = desc.read_f32(record).unwrap_or(0.0);
            let _ = write!(out, "{}", format_float(v));
        }
        ParamType::I32 => {
            let _ = write!(out, "{}", desc.read_i32(record).unwrap_or(0));
        }
        ParamType::U32 => {
            let _ = write!(out, "{}", desc.read_i32(record).unwrap_or(0) as u32);
        }
        ParamType::Bool => {
            let _ = write!(
                out,
                "{}",
                if desc.read_i32(record).unwrap_or(0) != 0 {
                    "true"
                } else {
                    "false"
                }
            );
        }
    }
}

fn module_key(op: &str, instance: i32) -> String {
    if instance == 0 {
        op.to_string()
    } else {
        format!("{op}.{instance}")
    }
}

fn split_module_key(key: &str) -> (&str, i32) {
    if let Some((op, suffix)) = key.rsplit_once('.')
        && let Ok(instance) = suffix.parse::<i32>()
    {
        return (op, instance);
    }
    (key, 0)
}

/// Serializes the pipeline to its history document.
pub fn serialize(pipe: &Pipeline) -> String {
    let mut out = String::new();
    out.push_str("{\"version\":\"");
    out.push_str(DOCUMENT_VERSION);
    out.push_str("\",\"generator\":");
    out.push_str(&quote(&generator()));
    let image = pipe.image();
    if !image.maker().is_empty() || !image.model().is_empty() {
        let camera = format!("{} {}", image.maker(), image.model());
        let _ = write!(out, ",\"source\":{{\"camera\":{}}}", quote(camera.trim()));
    }
    let _ = write!(
        out,
        ",\"settings\":{{\"iop_order\":{},\"color_workflow\":{}}}",
        quote(pipe.order_kind().label()),
        quote(COLOR_WORKFLOW)
    );
    out.push_str(",\"modules\":{");
    for (i, module) in pipe.modules.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(
            out,
            "{}:{{\"enabled\":{},\"version\":{},\"params\":{{",
            quote(&module_key(module.name(), module.instance())),
            module.enabled(),
            module.version()
        );
        for (j, desc) in module.op.param_table().iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}:", quote(desc.name));
            emit_param(&mut out, desc, module.params());
        }
        out.push_str("}}");
    }
    out.push_str("},\"masks\":{}}");
    out
}

fn check_version(value: &Value) -> Result<()> {
    let version = value.get("version").ok_or(Error::MissingVersion)?;
    let text = match version {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(Error::MissingVersion),
    };
    let major: u32 = text
        .split('.')
        .next()
        .and_then(|m| m.parse().ok())
        .ok_or_else(|| Error::UnsupportedVersion(text.clone()))?;
    if major > 1 {
        return Err(Error::UnsupportedVersion(text));
    }
    Ok(())
}

fn load_param(module_params: &mut [u8], desc: &ParamDesc, op: &str, value: &Value) {
    let outcome = match desc.ty {
        ParamType::F32 => match value.as_f64() {
            Some(v) => {
                if !desc.in_soft_range(v) {
                    warn!(
                        "{}.{} = {} is outside the advisory range, keeping it",
                        op, desc.name, v
                    );
                }
                desc.write_f32(module_params, v as f32)
            }
            None => {
                warn!("{}.{}: expected a number, skipping", op, desc.name);
                return;
            }
        },
        ParamType::I32 | ParamType::U32 | ParamType::Bool => {
            let int = if desc.ty == ParamType::Bool {
                value.as_bool().map(i32::from)
            } else {
                value.as_i64().map(|v| v as i32)
            };
            match int {
                Some(v) => {
                    if !desc.in_soft_range(v as f64) {
                        warn!(
                            "{}.{} = {} is outside the advisory range, keeping it",
                            op, desc.name, v
                        );
                    }
                    desc.write_i32(module_params, v)
                }
                None => {
                    warn!("{}.{}: type mismatch, skipping", op, desc.name);
                    return;
                }
            }
        }
    };
    if let Err(e) = outcome {
        warn!("{}.{}: {}, skipping", op, desc.name, e);
    }
}

/// Loads a history document into the pipeline: enabled flags and parameter
/// records in place, best-effort per field. Document-level problems fail the
/// whole load; anything module- or field-level warns and continues.
pub fn load(pipe: &mut Pipeline, doc: &str) -> Result<()> {
    let value: Value =
        serde_json::from_str(doc).map_err(|e| Error::MalformedHistory(e.to_string()))?;
    check_version(&value)?;

    if let Some(label) = value
        .get("settings")
        .and_then(|s| s.get("iop_order"))
        .and_then(|v| v.as_str())
    {
        match OrderKind::from_label(label) {
            Some(OrderKind::Custom) | None => {
                if label != OrderKind::Custom.label() {
                    warn!("unknown iop_order {:?}, keeping current ordering", label);
                }
            }
            Some(kind) if kind != pipe.order_kind() => {
                pipe.apply_order(kind, &order::list_for(kind));
            }
            Some(_) => {}
        }
    }

    let Some(modules) = value.get("modules").and_then(|m| m.as_object()) else {
        return Err(Error::MalformedHistory("modules is not an object".into()));
    };
    for (key, entry) in modules {
        let (op, instance) = split_module_key(key);
        let Some(index) = pipe.find_module(op, instance) else {
            warn!("history names unknown module {:?}, skipping", key);
            continue;
        };
        if let Some(version) = entry.get("version").and_then(|v| v.as_i64()) {
            let expected = pipe.modules[index].version() as i64;
            if version != expected {
                warn!(
                    "{}: version {} in history, {} in registry; loading best-effort",
                    op, version, expected
                );
            }
        }
        if let Some(enabled) = entry.get("enabled").and_then(|v| v.as_bool()) {
            pipe.modules[index].enabled = enabled;
        }
        let table = pipe.modules[index].op.param_table();
        if let Some(fields) = entry.get("params").and_then(|p| p.as_object()) {
            for (field, field_value) in fields {
                let Some(desc) = table.iter().find(|d| d.name == field) else {
                    warn!("{}.{}: unknown field, skipping", op, field);
                    continue;
                };
                load_param(&mut pipe.modules[index].params, desc, op, field_value);
            }
        }
    }
    pipe.invalidate();
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::{FILTERS_RGGB, ImageParams, ImageRecord};
    use std::sync::Arc;

    fn pipeline() -> Pipeline {
        let image = ImageRecord::new(ImageParams {
            width: 16,
            height: 16,
            raw: vec![0.5; 256],
            filters: FILTERS_RGGB,
            maker: "ExampleCo".into(),
            model: "EC-1".into(),
            ..Default::default()
        })
        .unwrap();
        Pipeline::new(image).unwrap()
    }

    fn pipeline_anonymous() -> Pipeline {
        let image = ImageRecord::new(ImageParams {
            width: 16,
            height: 16,
            raw: vec![0.5; 256],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap();
        Pipeline::new(Arc::clone(&image)).unwrap()
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(-0.25), "-0.25");
        assert_eq!(format_float(0.45454547), "0.45454547");
        assert_eq!(format_float(f32::NAN), "0.0");
        assert_eq!(format_float(f32::INFINITY), "0.0");
        // Always a decimal point.
        assert!(format_float(100.0).contains('.'));
    }

    #[test]
    fn document_shape() {
        let pipe = pipeline();
        let doc = serialize(&pipe);
        let value: Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["settings"]["iop_order"], "v3.0-raw");
        assert_eq!(value["source"]["camera"], "ExampleCo EC-1");
        assert!(value["modules"]["exposure"]["params"]["exposure"].is_number());
        assert!(value["masks"].as_object().unwrap().is_empty());
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let mut pipe = pipeline();
        pipe.set_param_f32("exposure", "exposure", 1.5).unwrap();
        pipe.set_enabled("sharpen", true).unwrap();
        let doc1 = serialize(&pipe);
        pipe.set_param_f32("exposure", "exposure", 0.0).unwrap();
        pipe.set_enabled("sharpen", false).unwrap();
        load(&mut pipe, &doc1).unwrap();
        assert_eq!(
            pipe.get_param_f32("exposure", "exposure").unwrap().to_bits(),
            1.5f32.to_bits()
        );
        assert!(pipe.is_enabled("sharpen").unwrap());
        assert_eq!(serialize(&pipe), doc1);
    }

    #[test]
    fn missing_version_is_format_error() {
        let mut pipe = pipeline_anonymous();
        let err = load(&mut pipe, "{ \"modules\": {} }").unwrap_err();
        assert!(matches!(err, Error::MissingVersion));
        assert_eq!(err.status(), crate::error::status::FORMAT);
    }

    #[test]
    fn future_major_version_is_rejected() {
        let mut pipe = pipeline_anonymous();
        let err = load(&mut pipe, "{\"version\":\"2.0\",\"modules\":{}}").unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(_)));
    }

    #[test]
    fn unknown_module_is_tolerated() {
        let mut pipe = pipeline_anonymous();
        let doc = "{\"version\":\"1.0\",\"modules\":{\"nonexistent\":{\"enabled\":true,\"version\":1,\"params\":{\"x\":1}}}}";
        load(&mut pipe, &doc.to_string()).unwrap();
    }

    #[test]
    fn unknown_field_and_type_mismatch_are_skipped() {
        let mut pipe = pipeline_anonymous();
        pipe.set_param_f32("exposure", "exposure", 0.5).unwrap();
        let doc = "{\"version\":\"1.0\",\"modules\":{\"exposure\":{\"enabled\":true,\"version\":1,\
                   \"params\":{\"bogus\":1.0,\"exposure\":\"a string\"}}}}";
        load(&mut pipe, doc).unwrap();
        // The bad field was skipped, the previous value survives.
        assert_eq!(pipe.get_param_f32("exposure", "exposure").unwrap(), 0.5);
    }

    #[test]
    fn out_of_soft_range_is_accepted_on_load() {
        let mut pipe = pipeline_anonymous();
        let doc = "{\"version\":\"1.0\",\"modules\":{\"exposure\":{\"enabled\":true,\"version\":1,\
                   \"params\":{\"exposure\":42.0}}}}";
        load(&mut pipe, doc).unwrap();
        assert_eq!(pipe.get_param_f32("exposure", "exposure").unwrap(), 42.0);
    }

    #[test]
    fn order_setting_rekeys_the_chain() {
        let mut pipe = pipeline_anonymous();
        let doc = "{\"version\":\"1.0\",\"settings\":{\"iop_order\":\"legacy\",\"color_workflow\":\"display-referred\"},\"modules\":{}}";
        load(&mut pipe, doc).unwrap();
        assert_eq!(pipe.order_kind(), OrderKind::Legacy);
        // Legacy places flip directly after demosaic.
        let order = pipe.order_list();
        let pos = |op: &str| order.iter().position(|e| e.op == op).unwrap();
        assert!(pos("flip") < pos("exposure"));
    }

    #[test]
    fn malformed_document_fails_whole_load() {
        let mut pipe = pipeline_anonymous();
        assert!(matches!(
            load(&mut pipe, "{not json"),
            Err(Error::MalformedHistory(_))
        ));
    }
}
