// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! XMP sidecar support. History items live in an RDF sequence whose
//! parameter records are serialized as hexadecimal of their raw bytes at the
//! declared layout, so third-party consumers of the sidecar shape keep
//! round-tripping. Writes are atomic: temp file, then rename.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::error::{Error, Result};
use crate::order::OrderKind;
use crate::params;
use crate::pipeline::Pipeline;
use crate::util::tracing_wrappers::*;

const NS_X: (&str, &str) = ("xmlns:x", "adobe:ns:meta/");
const NS_RDF: (&str, &str) = ("xmlns:rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
const NS_PIPE: (&str, &str) = ("xmlns:pipe", "http://rawpipe.org/xmp/1.0/");

fn xml_err<E: std::fmt::Display>(e: E) -> Error {
    Error::MalformedSidecar(e.to_string())
}

pub(crate) fn hex_encode(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        let _ = write!(out, "{b:02x}");
    }
    out
}

pub(crate) fn hex_decode(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(Error::MalformedSidecar("odd hex length".into()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| Error::MalformedSidecar(format!("bad hex at offset {i}")))
        })
        .collect()
}

/// Serializes the pipeline history into the sidecar document.
pub fn serialize(pipe: &Pipeline) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut xmpmeta = BytesStart::new("x:xmpmeta");
    xmpmeta.push_attribute(NS_X);
    writer.write_event(Event::Start(xmpmeta)).map_err(xml_err)?;

    let mut rdf = BytesStart::new("rdf:RDF");
    rdf.push_attribute(NS_RDF);
    writer.write_event(Event::Start(rdf)).map_err(xml_err)?;

    let mut description = BytesStart::new("rdf:Description");
    description.push_attribute(NS_PIPE);
    description.push_attribute(("pipe:history_version", "1"));
    description.push_attribute(("pipe:iop_order", pipe.order_kind().label()));
    writer
        .write_event(Event::Start(description))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("pipe:history")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("rdf:Seq")))
        .map_err(xml_err)?;

    for module in pipe.modules.iter() {
        let mut li = BytesStart::new("rdf:li");
        li.push_attribute(("pipe:operation", module.name()));
        li.push_attribute(("pipe:num", module.instance().to_string().as_str()));
        li.push_attribute((
            "pipe:enabled",
            if module.enabled() { "1" } else { "0" },
        ));
        li.push_attribute(("pipe:modversion", module.version().to_string().as_str()));
        li.push_attribute(("pipe:iop_order", module.iop_order().to_string().as_str()));
        li.push_attribute(("pipe:params", hex_encode(module.params()).as_str()));
        writer.write_event(Event::Empty(li)).map_err(xml_err)?;
    }

    for tag in ["rdf:Seq", "pipe:history", "rdf:Description", "rdf:RDF", "x:xmpmeta"] {
        writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_err)?;
    }

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

struct HistoryItem {
    operation: String,
    num: i32,
    enabled: bool,
    modversion: i32,
    params: Vec<u8>,
}

fn parse_items(doc: &str) -> Result<(Option<String>, Vec<HistoryItem>)> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().trim_text(true);
    let mut items = Vec::new();
    let mut iop_order = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.name();
                if name.as_ref() == b"rdf:Description" {
                    for attr in e.attributes() {
                        let attr = attr.map_err(xml_err)?;
                        if attr.key.as_ref() == b"pipe:iop_order" {
                            iop_order =
                                Some(attr.unescape_value().map_err(xml_err)?.into_owned());
                        }
                    }
                } else if name.as_ref() == b"rdf:li" {
                    let mut operation = None;
                    let mut num = 0i32;
                    let mut enabled = false;
                    let mut modversion = 1i32;
                    let mut hex = None;
                    for attr in e.attributes() {
                        let attr = attr.map_err(xml_err)?;
                        let value = attr.unescape_value().map_err(xml_err)?;
                        match attr.key.as_ref() {
                            b"pipe:operation" => operation = Some(value.into_owned()),
                            b"pipe:num" => num = value.parse().unwrap_or(0),
                            b"pipe:enabled" => enabled = value == "1" || value == "true",
                            b"pipe:modversion" => modversion = value.parse().unwrap_or(1),
                            b"pipe:params" => hex = Some(value.into_owned()),
                            _ => {}
                        }
                    }
                    let Some(operation) = operation else {
                        warn!("sidecar history item without operation, skipping");
                        continue;
                    };
                    let params = match hex.as_deref().map(hex_decode).transpose() {
                        Ok(p) => p.unwrap_or_default(),
                        Err(e) => {
                            warn!("{}: {}, skipping item", operation, e);
                            continue;
                        }
                    };
                    items.push(HistoryItem {
                        operation,
                        num,
                        enabled,
                        modversion,
                        params,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok((iop_order, items))
}

/// Applies a sidecar document: the same module- and field-level validation
/// as the JSON history, with parameter records copied byte-for-byte at the
/// declared layout.
pub fn load_str(pipe: &mut Pipeline, doc: &str) -> Result<()> {
    let (iop_order, items) = parse_items(doc)?;
    if let Some(label) = iop_order {
        match OrderKind::from_label(&label) {
            Some(OrderKind::Custom) | None => {
                warn!("sidecar iop_order {:?} not applied", label)
            }
            Some(kind) if kind != pipe.order_kind() => {
                pipe.apply_order(kind, &crate::order::list_for(kind));
            }
            Some(_) => {}
        }
    }
    for item in items {
        let Some(index) = pipe.find_module(&item.operation, item.num) else {
            warn!("sidecar names unknown module {:?}, skipping", item.operation);
            continue;
        };
        let module = &mut pipe.modules[index];
        if item.modversion != module.version() {
            warn!(
                "{}: version {} in sidecar, {} in registry; loading best-effort",
                item.operation,
                item.modversion,
                module.version()
            );
        }
        let expected = params::record_size(module.op.param_table());
        if item.params.len() != expected {
            warn!(
                "{}: parameter record is {} bytes, expected {}; skipping params",
                item.operation,
                item.params.len(),
                expected
            );
        } else {
            module.params.copy_from_slice(&item.params);
        }
        module.enabled = item.enabled;
    }
    pipe.invalidate();
    Ok(())
}

pub fn load(pipe: &mut Pipeline, path: &Path) -> Result<()> {
    let doc = std::fs::read_to_string(path)?;
    load_str(pipe, &doc)
}

/// Writes the sidecar atomically: the document lands under a temporary name
/// and is renamed into place, so no partial write is ever visible.
pub fn save(pipe: &Pipeline, path: &Path) -> Result<()> {
    let doc = serialize(pipe)?;
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    std::fs::write(&tmp, doc.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
