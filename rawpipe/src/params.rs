// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Parameter descriptor tables. Every operation declares its parameter
//! record as an ordered list of typed fields with explicit byte offsets; the
//! record itself is an opaque byte vector that is only ever accessed through
//! the table. This keeps the on-disk layout identical across targets and is
//! what the sidecar hex format serializes verbatim.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::ops;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    F32,
    I32,
    U32,
    Bool,
}

impl ParamType {
    pub fn is_integer(self) -> bool {
        matches!(self, ParamType::I32 | ParamType::U32 | ParamType::Bool)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParamDesc {
    pub name: &'static str,
    pub offset: usize,
    pub ty: ParamType,
    pub size: usize,
    pub soft_min: f32,
    pub soft_max: f32,
}

impl ParamDesc {
    pub const fn f32(name: &'static str, offset: usize, soft_min: f32, soft_max: f32) -> ParamDesc {
        ParamDesc {
            name,
            offset,
            ty: ParamType::F32,
            size: 4,
            soft_min,
            soft_max,
        }
    }

    pub const fn i32(name: &'static str, offset: usize, soft_min: f32, soft_max: f32) -> ParamDesc {
        ParamDesc {
            name,
            offset,
            ty: ParamType::I32,
            size: 4,
            soft_min,
            soft_max,
        }
    }

    pub const fn u32(name: &'static str, offset: usize, soft_min: f32, soft_max: f32) -> ParamDesc {
        ParamDesc {
            name,
            offset,
            ty: ParamType::U32,
            size: 4,
            soft_min,
            soft_max,
        }
    }

    pub const fn bool(name: &'static str, offset: usize) -> ParamDesc {
        ParamDesc {
            name,
            offset,
            ty: ParamType::Bool,
            size: 1,
            soft_min: 0.0,
            soft_max: 1.0,
        }
    }

    fn check_extent(&self, record: &[u8]) -> Result<()> {
        let end = self.offset + self.size;
        if end > record.len() {
            return Err(Error::ParamExtent {
                field: self.name,
                end,
                size: record.len(),
            });
        }
        Ok(())
    }

    /// Soft bounds are advisory: out-of-range values are stored anyway, the
    /// caller just gets told.
    pub fn in_soft_range(&self, v: f64) -> bool {
        v >= self.soft_min as f64 && v <= self.soft_max as f64
    }

    pub fn read_f32(&self, record: &[u8]) -> Result<f32> {
        if self.ty != ParamType::F32 {
            return Err(Error::ParamType {
                field: self.name,
                expected: self.ty,
                found: ParamType::F32,
            });
        }
        self.check_extent(record)?;
        Ok(LittleEndian::read_f32(&record[self.offset..]))
    }

    pub fn write_f32(&self, record: &mut [u8], v: f32) -> Result<()> {
        if self.ty != ParamType::F32 {
            return Err(Error::ParamType {
                field: self.name,
                expected: self.ty,
                found: ParamType::F32,
            });
        }
        self.check_extent(record)?;
        LittleEndian::write_f32(&mut record[self.offset..], v);
        Ok(())
    }

    /// Integer access covers i32, u32 and bool fields (bool maps to 0/1).
    pub fn read_i32(&self, record: &[u8]) -> Result<i32> {
        self.check_extent(record)?;
        match self.ty {
            ParamType::I32 => Ok(LittleEndian::read_i32(&record[self.offset..])),
            ParamType::U32 => Ok(LittleEndian::read_u32(&record[self.offset..]) as i32),
            ParamType::Bool => Ok(i32::from(record[self.offset] != 0)),
            ParamType::F32 => Err(Error::ParamType {
                field: self.name,
                expected: self.ty,
                found: ParamType::I32,
            }),
        }
    }

    pub fn write_i32(&self, record: &mut [u8], v: i32) -> Result<()> {
        self.check_extent(record)?;
        match self.ty {
            ParamType::I32 => LittleEndian::write_i32(&mut record[self.offset..], v),
            ParamType::U32 => LittleEndian::write_u32(&mut record[self.offset..], v as u32),
            ParamType::Bool => record[self.offset] = u8::from(v != 0),
            ParamType::F32 => {
                return Err(Error::ParamType {
                    field: self.name,
                    expected: self.ty,
                    found: ParamType::I32,
                });
            }
        }
        Ok(())
    }
}

/// Size of the fixed-layout record described by `table`.
pub fn record_size(table: &[ParamDesc]) -> usize {
    table.iter().map(|d| d.offset + d.size).max().unwrap_or(0)
}

/// A zeroed record of the declared size.
pub fn new_record(table: &[ParamDesc]) -> Vec<u8> {
    vec![0u8; record_size(table)]
}

pub fn find<'a>(table: &'a [ParamDesc], field: &str) -> Option<&'a ParamDesc> {
    table.iter().find(|d| d.name == field)
}

/// Registry view keyed by operation name, per the external contract.
pub fn lookup(op: &str, field: &str) -> Result<&'static ParamDesc> {
    let operation = ops::lookup(op).ok_or_else(|| Error::UnknownOperation(op.into()))?;
    find(operation.param_table(), field)
        .ok_or_else(|| Error::UnknownField(op.into(), field.into()))
}

pub fn count(op: &str) -> Result<usize> {
    let operation = ops::lookup(op).ok_or_else(|| Error::UnknownOperation(op.into()))?;
    Ok(operation.param_table().len())
}

pub fn index(op: &str, i: usize) -> Result<&'static ParamDesc> {
    let operation = ops::lookup(op).ok_or_else(|| Error::UnknownOperation(op.into()))?;
    operation
        .param_table()
        .get(i)
        .ok_or_else(|| Error::UnknownField(op.into(), format!("#{i}")))
}

pub fn record_size_of(op: &str) -> Result<usize> {
    let operation = ops::lookup(op).ok_or_else(|| Error::UnknownOperation(op.into()))?;
    Ok(record_size(operation.param_table()))
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    const TABLE: &[ParamDesc] = &[
        ParamDesc::f32("exposure", 0, -3.0, 3.0),
        ParamDesc::i32("mode", 4, 0.0, 4.0),
        ParamDesc::bool("auto", 8),
    ];

    #[test]
    fn record_size_is_max_extent() {
        assert_eq!(record_size(TABLE), 9);
        assert_eq!(record_size(&[]), 0);
    }

    #[test]
    fn byte_level_round_trip() {
        let mut record = new_record(TABLE);
        find(TABLE, "exposure")
            .unwrap()
            .write_f32(&mut record, 1.5)
            .unwrap();
        find(TABLE, "mode").unwrap().write_i32(&mut record, 3).unwrap();
        find(TABLE, "auto").unwrap().write_i32(&mut record, 1).unwrap();
        assert_eq!(
            find(TABLE, "exposure").unwrap().read_f32(&record).unwrap(),
            1.5
        );
        assert_eq!(find(TABLE, "mode").unwrap().read_i32(&record).unwrap(), 3);
        assert_eq!(find(TABLE, "auto").unwrap().read_i32(&record).unwrap(), 1);
    }

    #[test]
    fn type_mismatch_is_reported_not_coerced() {
        let mut record = new_record(TABLE);
        let exposure = find(TABLE, "exposure").unwrap();
        let mode = find(TABLE, "mode").unwrap();
        assert!(matches!(
            exposure.read_i32(&record),
            Err(Error::ParamType { .. })
        ));
        assert!(matches!(
            mode.write_f32(&mut record, 1.0),
            Err(Error::ParamType { .. })
        ));
    }

    #[test]
    fn extent_is_enforced() {
        let short = vec![0u8; 4];
        let mode = find(TABLE, "mode").unwrap();
        assert!(matches!(mode.read_i32(&short), Err(Error::ParamExtent { .. })));
    }

    #[test]
    fn bit_exact_float_round_trip() {
        arbtest::arbtest(|u| {
            let v = f32::from_bits(u.arbitrary::<u32>()?);
            if !v.is_finite() {
                return Ok(());
            }
            let mut record = new_record(TABLE);
            let desc = find(TABLE, "exposure").unwrap();
            desc.write_f32(&mut record, v).unwrap();
            assert_eq!(desc.read_f32(&record).unwrap().to_bits(), v.to_bits());
            Ok(())
        });
    }

    #[test]
    fn registry_descriptor_integrity() {
        for op in crate::ops::all() {
            let table = op.param_table();
            let size = record_size(table);
            let sum: usize = table.iter().map(|d| d.size).sum();
            assert_eq!(size, sum, "{}: fields must tile the record", op.name());
            for (i, a) in table.iter().enumerate() {
                assert!(a.offset + a.size <= size);
                for b in table.iter().skip(i + 1) {
                    let disjoint = a.offset + a.size <= b.offset || b.offset + b.size <= a.offset;
                    assert!(disjoint, "{}: {} overlaps {}", op.name(), a.name, b.name);
                }
            }
        }
    }
}
