// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! IOP order tables. Built-in orderings assign every operation a floating
//! point rank; materialization converts ranks to integer sort keys (starting
//! at 100, stride 100) so multi-instances can slot into the gaps. A pipeline
//! runs exactly one of the built-ins or a user-supplied custom list.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ops::MAX_OP_NAME;
use crate::util::tracing_wrappers::*;

pub const FIRST_ORDER: i32 = 100;
pub const ORDER_STRIDE: i32 = 100;

/// Largest instance index kept on ingest; anything beyond is clamped.
pub const MAX_INSTANCE: i32 = 1000;

/// Operation names cap at [`MAX_OP_NAME`] bytes on ingest, backing off to
/// the nearest char boundary.
fn clamp_op_name(op: &str) -> &str {
    if op.len() <= MAX_OP_NAME {
        return op;
    }
    let mut end = MAX_OP_NAME;
    while !op.is_char_boundary(end) {
        end -= 1;
    }
    &op[..end]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderKind {
    Legacy,
    V30Raw,
    V30Jpeg,
    V50Raw,
    V50Jpeg,
    Custom,
}

impl OrderKind {
    pub fn label(self) -> &'static str {
        match self {
            OrderKind::Legacy => "legacy",
            OrderKind::V30Raw => "v3.0-raw",
            OrderKind::V30Jpeg => "v3.0-jpeg",
            OrderKind::V50Raw => "v5.0-raw",
            OrderKind::V50Jpeg => "v5.0-jpeg",
            OrderKind::Custom => "custom",
        }
    }

    pub fn from_label(label: &str) -> Option<OrderKind> {
        BUILT_INS
            .iter()
            .copied()
            .chain([OrderKind::Custom])
            .find(|k| k.label() == label)
    }
}

pub const BUILT_INS: [OrderKind; 5] = [
    OrderKind::Legacy,
    OrderKind::V30Raw,
    OrderKind::V30Jpeg,
    OrderKind::V50Raw,
    OrderKind::V50Jpeg,
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderEntry {
    pub op: String,
    pub instance: i32,
    pub order: i32,
}

pub type OrderList = Vec<OrderEntry>;

// Rank tables. The v3.0 JPEG variants collapse everything that runs in RAW
// space onto one rank ahead of colorin; v5.0 moves finalscale ahead of
// colorout.
const RANKS_LEGACY: &[(&str, f64)] = &[
    ("rawprepare", 1.0),
    ("invert", 2.0),
    ("temperature", 3.0),
    ("highlights", 4.0),
    ("demosaic", 5.0),
    ("flip", 6.0),
    ("exposure", 7.0),
    ("colorin", 8.0),
    ("sharpen", 9.0),
    ("colorout", 10.0),
    ("finalscale", 11.0),
    ("gamma", 12.0),
];

const RANKS_V30_RAW: &[(&str, f64)] = &[
    ("rawprepare", 1.0),
    ("invert", 2.0),
    ("temperature", 3.0),
    ("highlights", 4.0),
    ("demosaic", 5.0),
    ("exposure", 6.0),
    ("flip", 7.0),
    ("colorin", 8.0),
    ("sharpen", 9.0),
    ("colorout", 10.0),
    ("finalscale", 11.0),
    ("gamma", 12.0),
];

const RANKS_V30_JPEG: &[(&str, f64)] = &[
    ("rawprepare", 1.0),
    ("invert", 1.0),
    ("temperature", 1.0),
    ("highlights", 1.0),
    ("demosaic", 1.0),
    ("exposure", 6.0),
    ("flip", 7.0),
    ("colorin", 8.0),
    ("sharpen", 9.0),
    ("colorout", 10.0),
    ("finalscale", 11.0),
    ("gamma", 12.0),
];

const RANKS_V50_RAW: &[(&str, f64)] = &[
    ("rawprepare", 1.0),
    ("invert", 2.0),
    ("temperature", 3.0),
    ("highlights", 4.0),
    ("demosaic", 5.0),
    ("exposure", 6.0),
    ("flip", 7.0),
    ("colorin", 8.0),
    ("sharpen", 9.0),
    ("finalscale", 9.5),
    ("colorout", 10.0),
    ("gamma", 12.0),
];

const RANKS_V50_JPEG: &[(&str, f64)] = &[
    ("rawprepare", 1.0),
    ("invert", 1.0),
    ("temperature", 1.0),
    ("highlights", 1.0),
    ("demosaic", 1.0),
    ("exposure", 6.0),
    ("flip", 7.0),
    ("colorin", 8.0),
    ("sharpen", 9.0),
    ("finalscale", 9.5),
    ("colorout", 10.0),
    ("gamma", 12.0),
];

fn ranks_for(kind: OrderKind) -> &'static [(&'static str, f64)] {
    match kind {
        OrderKind::Legacy => RANKS_LEGACY,
        OrderKind::V30Raw => RANKS_V30_RAW,
        OrderKind::V30Jpeg => RANKS_V30_JPEG,
        OrderKind::V50Raw => RANKS_V50_RAW,
        OrderKind::V50Jpeg => RANKS_V50_JPEG,
        OrderKind::Custom => RANKS_V30_RAW,
    }
}

/// Materializes a built-in table: rank-sorted (stable), integer keys from
/// [`FIRST_ORDER`] with [`ORDER_STRIDE`] gaps. Operations sharing a rank
/// (the collapsed RAW segment of the JPEG variants) share one key.
pub fn list_for(kind: OrderKind) -> OrderList {
    let mut ranked: Vec<(usize, &(&str, f64))> = ranks_for(kind).iter().enumerate().collect();
    ranked.sort_by(|a, b| a.1.1.partial_cmp(&b.1.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut list = Vec::with_capacity(ranked.len());
    let mut key = FIRST_ORDER;
    let mut prev_rank: Option<f64> = None;
    for (_, (op, rank)) in ranked {
        if let Some(prev) = prev_rank
            && *rank != prev
        {
            key += ORDER_STRIDE;
        }
        prev_rank = Some(*rank);
        list.push(OrderEntry {
            op: (*op).to_string(),
            instance: 0,
            order: key,
        });
    }
    list
}

/// Which ordering a list is. Compares operation sequences and their sort
/// keys; anything that matches no built-in is custom.
pub fn kind_of(list: &[OrderEntry]) -> OrderKind {
    for kind in BUILT_INS {
        let built_in = list_for(kind);
        if built_in.len() == list.len()
            && built_in
                .iter()
                .zip(list.iter())
                .all(|(a, b)| a.op == b.op && a.instance == b.instance && a.order == b.order)
        {
            return kind;
        }
    }
    OrderKind::Custom
}

/// Stable sort by (order, instance).
pub fn sort(list: &mut OrderList) {
    list.sort_by(|a, b| (a.order, a.instance).cmp(&(b.order, b.instance)));
}

/// Pairwise ordering constraints every custom list must satisfy.
pub fn rules() -> &'static [(&'static str, &'static str)] {
    &[
        ("rawprepare", "invert"),
        ("rawprepare", "demosaic"),
        ("temperature", "demosaic"),
        ("highlights", "demosaic"),
        ("demosaic", "colorin"),
        ("colorin", "colorout"),
        ("colorout", "gamma"),
    ]
}

pub fn validate(list: &[OrderEntry]) -> Result<()> {
    let position = |op: &str| list.iter().position(|e| e.op == op);
    for &(before, after) in rules() {
        if let (Some(b), Some(a)) = (position(before), position(after))
            && b >= a
        {
            return Err(Error::OrderRule(before, after));
        }
    }
    Ok(())
}

pub fn serialize_text(list: &[OrderEntry]) -> String {
    list.iter()
        .map(|e| format!("{},{}", e.op, e.instance))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn deserialize_text(text: &str) -> Result<OrderList> {
    let tokens: Vec<&str> = text.split(',').collect();
    if tokens.len() < 2 || tokens.len() % 2 != 0 {
        return Err(Error::MalformedOrder(format!(
            "expected op,instance pairs, got {} tokens",
            tokens.len()
        )));
    }
    let mut list = Vec::with_capacity(tokens.len() / 2);
    for (i, pair) in tokens.chunks(2).enumerate() {
        let op = pair[0];
        if op.is_empty() {
            return Err(Error::MalformedOrder("empty operation name".into()));
        }
        let instance: i32 = pair[1]
            .parse()
            .map_err(|_| Error::MalformedOrder(format!("bad instance {:?}", pair[1])))?;
        list.push(OrderEntry {
            op: clamp_op_name(op).to_string(),
            instance: instance.clamp(0, MAX_INSTANCE),
            order: FIRST_ORDER + i as i32 * ORDER_STRIDE,
        });
    }
    Ok(list)
}

pub fn serialize_binary(list: &[OrderEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for e in list {
        let mut len = [0u8; 4];
        LittleEndian::write_i32(&mut len, e.op.len() as i32);
        out.extend_from_slice(&len);
        out.extend_from_slice(e.op.as_bytes());
        let mut inst = [0u8; 4];
        LittleEndian::write_i32(&mut inst, e.instance);
        out.extend_from_slice(&inst);
    }
    out
}

pub fn deserialize_binary(data: &[u8]) -> Result<OrderList> {
    let mut list = Vec::new();
    let mut pos = 0usize;
    let mut i = 0usize;
    while pos < data.len() {
        if data.len() - pos < 4 {
            return Err(Error::MalformedOrder("truncated length".into()));
        }
        let len = LittleEndian::read_i32(&data[pos..]);
        pos += 4;
        if len <= 0 {
            return Err(Error::MalformedOrder(format!("bad op length {len}")));
        }
        let len = len as usize;
        if data.len() - pos < len + 4 {
            return Err(Error::MalformedOrder("truncated record".into()));
        }
        // The declared bytes are consumed either way; only the clamped
        // prefix is kept as the name.
        let keep = len.min(MAX_OP_NAME);
        let op = std::str::from_utf8(&data[pos..pos + keep])
            .map_err(|_| Error::MalformedOrder("op name is not utf-8".into()))?
            .to_string();
        pos += len;
        let instance = LittleEndian::read_i32(&data[pos..]);
        pos += 4;
        list.push(OrderEntry {
            op,
            instance: instance.clamp(0, MAX_INSTANCE),
            order: FIRST_ORDER + i as i32 * ORDER_STRIDE,
        });
        i += 1;
    }
    Ok(list)
}

#[derive(Serialize, Deserialize)]
struct OrderDoc {
    version: i32,
    order: Vec<OrderDocEntry>,
}

#[derive(Serialize, Deserialize)]
struct OrderDocEntry {
    op: String,
    #[serde(default)]
    instance: i32,
}

pub fn json_write(list: &[OrderEntry]) -> serde_json::Value {
    let doc = OrderDoc {
        version: 1,
        order: list
            .iter()
            .map(|e| OrderDocEntry {
                op: e.op.clone(),
                instance: e.instance,
            })
            .collect(),
    };
    serde_json::to_value(doc).unwrap_or(serde_json::Value::Null)
}

pub fn json_read(value: &serde_json::Value) -> Result<OrderList> {
    let doc: OrderDoc = serde_json::from_value(value.clone())
        .map_err(|e| Error::MalformedOrder(e.to_string()))?;
    if doc.version != 1 {
        warn!("order list version {} read as version 1", doc.version);
    }
    let mut list = Vec::with_capacity(doc.order.len());
    for (i, entry) in doc.order.into_iter().enumerate() {
        if entry.op.is_empty() {
            return Err(Error::MalformedOrder("empty operation name".into()));
        }
        list.push(OrderEntry {
            op: clamp_op_name(&entry.op).to_string(),
            instance: entry.instance.clamp(0, MAX_INSTANCE),
            order: FIRST_ORDER + i as i32 * ORDER_STRIDE,
        });
    }
    Ok(list)
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn built_ins_start_and_end_right() {
        for kind in BUILT_INS {
            let list = list_for(kind);
            assert_eq!(list.first().map(|e| e.op.as_str()), Some("rawprepare"));
            assert_eq!(list.last().map(|e| e.op.as_str()), Some("gamma"));
            assert!(validate(&list).is_ok());
        }
    }

    #[test]
    fn kind_round_trips_for_every_built_in() {
        for kind in BUILT_INS {
            let mut list = list_for(kind);
            sort(&mut list);
            assert_eq!(kind_of(&list), kind);
        }
    }

    #[test]
    fn v50_moves_finalscale_before_colorout() {
        let list = list_for(OrderKind::V50Raw);
        let pos = |op: &str| list.iter().position(|e| e.op == op).unwrap();
        assert!(pos("finalscale") < pos("colorout"));
        let legacy = list_for(OrderKind::Legacy);
        let pos = |op: &str| legacy.iter().position(|e| e.op == op).unwrap();
        assert!(pos("finalscale") > pos("colorout"));
    }

    #[test]
    fn jpeg_variant_collapses_raw_space() {
        let list = list_for(OrderKind::V30Jpeg);
        let key = |op: &str| list.iter().find(|e| e.op == op).unwrap().order;
        // The whole RAW segment shares one sort key ahead of colorin.
        assert_eq!(key("rawprepare"), key("demosaic"));
        assert!(key("demosaic") < key("colorin"));
        // The raw variant keeps them distinct.
        let raw = list_for(OrderKind::V30Raw);
        let key = |op: &str| raw.iter().find(|e| e.op == op).unwrap().order;
        assert!(key("rawprepare") < key("demosaic"));
    }

    #[test]
    fn sort_is_stable_on_equal_orders() {
        let mut list = vec![
            OrderEntry {
                op: "exposure".into(),
                instance: 1,
                order: 300,
            },
            OrderEntry {
                op: "exposure".into(),
                instance: 0,
                order: 300,
            },
            OrderEntry {
                op: "rawprepare".into(),
                instance: 0,
                order: 100,
            },
        ];
        sort(&mut list);
        assert_eq!(list[0].op, "rawprepare");
        assert_eq!(list[1].instance, 0);
        assert_eq!(list[2].instance, 1);
    }

    #[test]
    fn text_round_trip() {
        // The text form carries ops and instances; those always survive.
        for kind in BUILT_INS {
            let list = list_for(kind);
            let text = serialize_text(&list);
            let back = deserialize_text(&text).unwrap();
            assert_eq!(serialize_text(&back), text);
            assert!(
                back.iter()
                    .zip(list.iter())
                    .all(|(a, b)| a.op == b.op && a.instance == b.instance)
            );
        }
        // With distinct ranks the whole entry round-trips.
        let list = list_for(OrderKind::V30Raw);
        assert_eq!(deserialize_text(&serialize_text(&list)).unwrap(), list);
    }

    #[test]
    fn text_rejects_odd_tokens() {
        assert!(deserialize_text("rawprepare,0,gamma").is_err());
        assert!(deserialize_text("").is_err());
    }

    #[test]
    fn binary_round_trip() {
        let list = list_for(OrderKind::V30Raw);
        let bytes = serialize_binary(&list);
        assert_eq!(deserialize_binary(&bytes).unwrap(), list);
    }

    #[test]
    fn binary_rejects_corruption() {
        let list = list_for(OrderKind::V30Raw);
        let mut bytes = serialize_binary(&list);
        // Corrupt the first length field.
        bytes[0] = 200;
        assert!(deserialize_binary(&bytes).is_err());
        // Truncation.
        let bytes = serialize_binary(&list);
        assert!(deserialize_binary(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn ingest_clamps_length_and_instance() {
        // Binary: an oversized instance comes back clamped, not rejected.
        let list = vec![OrderEntry {
            op: "exposure".into(),
            instance: MAX_INSTANCE + 1,
            order: 100,
        }];
        let bytes = serialize_binary(&list);
        let back = deserialize_binary(&bytes).unwrap();
        assert_eq!(back[0].instance, MAX_INSTANCE);

        // Binary: a long name's declared bytes are consumed in full but the
        // kept name caps at MAX_OP_NAME, so the stream stays aligned.
        let name = "averyveryverylongoperationname";
        let mut bytes = Vec::new();
        let mut buf = [0u8; 4];
        LittleEndian::write_i32(&mut buf, name.len() as i32);
        bytes.extend_from_slice(&buf);
        bytes.extend_from_slice(name.as_bytes());
        LittleEndian::write_i32(&mut buf, 3);
        bytes.extend_from_slice(&buf);
        let back = deserialize_binary(&bytes).unwrap();
        assert_eq!(back[0].op.len(), MAX_OP_NAME);
        assert_eq!(back[0].instance, 3);

        // Text: same caps.
        let back = deserialize_text("averyveryverylongoperationname,0,gamma,2000").unwrap();
        assert_eq!(back[0].op.len(), MAX_OP_NAME);
        assert_eq!(back[1].instance, MAX_INSTANCE);

        // JSON: negative instances floor at zero.
        let value = serde_json::json!({
            "version": 1,
            "order": [{"op": "exposure", "instance": -5}],
        });
        assert_eq!(json_read(&value).unwrap()[0].instance, 0);
    }

    #[test]
    fn json_round_trip() {
        let list = list_for(OrderKind::V50Raw);
        let value = json_write(&list);
        assert_eq!(json_read(&value).unwrap(), list);
    }

    #[test]
    fn custom_list_rule_violation_is_caught() {
        let mut list = list_for(OrderKind::V30Raw);
        // Move colorout ahead of colorin.
        let pos_in = list.iter().position(|e| e.op == "colorin").unwrap();
        let pos_out = list.iter().position(|e| e.op == "colorout").unwrap();
        list.swap(pos_in, pos_out);
        assert!(matches!(validate(&list), Err(Error::OrderRule(..))));
    }

    #[test]
    fn arbitrary_binary_never_panics() {
        arbtest::arbtest(|u| {
            let data: Vec<u8> = u.arbitrary()?;
            let _ = deserialize_binary(&data);
            Ok(())
        });
    }
}
