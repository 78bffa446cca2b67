use tracing::trace;

use crate::errors::{CodecError, DecodeError, EncodeError};
use crate::ir::{BaseKind, Modifier, Primitive, ResolvedType, StructIr, VariantIr};
use crate::resolver::TypeGraph;
use crate::value::{HostClass, Value, HOST_CLASSES};
use crate::wire::{self, Cursor, PackBuffer};

// Boundary pack wrapper: first attempt at this capacity, double on the
// too-small condition, give up once the retries run out.
pub const INITIAL_PACK_CAPACITY: usize = 4096;
pub const MAX_RESIZE_ATTEMPTS: usize = 5;

// Reference interpreter over a resolved type graph. The emitted C modules
// implement this exact wire contract; this walker is the in-process
// implementation the test suites exercise it against.
pub struct Codec<'a> {
    graph: &'a TypeGraph,
}

pub fn class_index(class: HostClass) -> usize {
    match class {
        HostClass::Bool => 0,
        HostClass::Int => 1,
        HostClass::Float => 2,
        HostClass::Bytes => 3,
        HostClass::Str => 4,
    }
}

// Per-variant table mapping each host class to the first case of that
// class. Only unmodified primitive (or raw) cases are classifiable; anything
// else requires the explicit `{type, value}` record form.
pub fn classification_table(v: &VariantIr) -> [Option<usize>; HOST_CLASSES.len()] {
    let mut table = [None; HOST_CLASSES.len()];
    for (i, case) in v.cases.iter().enumerate() {
        if !case.modifiers.is_empty() {
            continue;
        }
        let class = match &case.kind {
            BaseKind::Primitive(Primitive::Bool) => HostClass::Bool,
            BaseKind::Primitive(Primitive::Bytes) => HostClass::Bytes,
            BaseKind::Primitive(Primitive::Str) => HostClass::Str,
            BaseKind::Primitive(p) if p.is_integer() => HostClass::Int,
            BaseKind::Primitive(p) if p.is_float() => HostClass::Float,
            BaseKind::Raw(_) => HostClass::Bytes,
            _ => continue,
        };
        let slot = &mut table[class_index(class)];
        if slot.is_none() {
            *slot = Some(i);
        }
    }
    table
}

impl<'a> Codec<'a> {
    pub fn new(graph: &'a TypeGraph) -> Self {
        Self { graph }
    }

    fn resolve(&self, type_name: &str) -> Result<ResolvedType, CodecError> {
        self.graph
            .resolve_type(type_name)
            .map_err(|_| CodecError::UnknownType(type_name.to_string()))
    }

    pub fn unpack(&self, type_name: &str, buf: &[u8]) -> Result<Value, CodecError> {
        self.unpack_with_consumed(type_name, buf).map(|(v, _)| v)
    }

    pub fn unpack_with_consumed(
        &self,
        type_name: &str,
        buf: &[u8],
    ) -> Result<(Value, usize), CodecError> {
        let ty = self.resolve(type_name)?;
        let mut cur = Cursor::new(buf);
        let value = self.decode_chain(&ty, &ty.modifiers, &mut cur)?;
        trace!(type_name, consumed = cur.consumed(), "unpacked value");
        Ok((value, cur.consumed()))
    }

    pub fn pack(&self, type_name: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
        let ty = self.resolve(type_name)?;
        let mut cap = INITIAL_PACK_CAPACITY;
        for _ in 0..=MAX_RESIZE_ATTEMPTS {
            let mut buf = vec![0u8; cap];
            let mut out = PackBuffer::new(&mut buf);
            match self.encode_chain(&ty, &ty.modifiers, value, &mut out) {
                Ok(()) => {
                    let written = out.written();
                    buf.truncate(written);
                    trace!(type_name, written, "packed value");
                    return Ok(buf);
                }
                Err(CodecError::Encode(EncodeError::BufferTooSmall)) => {
                    cap *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        Err(EncodeError::ResizeAttemptsExceeded.into())
    }

    // Fixed-capacity pack, the signature of the emitted per-type routines.
    pub fn pack_into(
        &self,
        type_name: &str,
        value: &Value,
        dst: &mut [u8],
    ) -> Result<usize, CodecError> {
        let ty = self.resolve(type_name)?;
        let mut out = PackBuffer::new(dst);
        self.encode_chain(&ty, &ty.modifiers, value, &mut out)?;
        Ok(out.written())
    }

    // The modifier chain wraps the stem outermost-first; each layer wraps
    // the decode of the remaining sub-chain.
    fn decode_chain(
        &self,
        ty: &ResolvedType,
        mods: &[Modifier],
        cur: &mut Cursor<'_>,
    ) -> Result<Value, CodecError> {
        match mods.first() {
            Some(Modifier::Optional) => {
                let flag = cur.take_u8().map_err(CodecError::Decode)?;
                if flag == 0 {
                    Ok(Value::Absent)
                } else {
                    self.decode_chain(ty, &mods[1..], cur)
                }
            }
            Some(Modifier::Extension) => {
                if cur.remaining() == 0 {
                    Ok(Value::Absent)
                } else {
                    self.decode_chain(ty, &mods[1..], cur)
                }
            }
            Some(Modifier::Array) => {
                let count = wire::decode_varuint32(cur).map_err(CodecError::Decode)?;
                let count = usize::try_from(count).map_err(|_| DecodeError::Truncated)?;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(self.decode_chain(ty, &mods[1..], cur)?);
                }
                Ok(Value::List(items))
            }
            None => self.decode_base(ty, cur),
        }
    }

    fn decode_base(&self, ty: &ResolvedType, cur: &mut Cursor<'_>) -> Result<Value, CodecError> {
        let value = match &ty.kind {
            BaseKind::Primitive(p) => match p {
                Primitive::Bool => Value::Bool(wire::decode_u8(cur)? != 0),
                Primitive::Uint8 => Value::Int(i128::from(wire::decode_u8(cur)?)),
                Primitive::Uint16 => Value::Int(i128::from(wire::decode_u16(cur)?)),
                Primitive::Uint32 => Value::Int(i128::from(wire::decode_u32(cur)?)),
                Primitive::Uint64 => Value::Int(i128::from(wire::decode_u64(cur)?)),
                Primitive::Uint128 => Value::Uint128(wire::decode_u128(cur)?),
                Primitive::Int8 => Value::Int(i128::from(wire::decode_i8(cur)?)),
                Primitive::Int16 => Value::Int(i128::from(wire::decode_i16(cur)?)),
                Primitive::Int32 => Value::Int(i128::from(wire::decode_i32(cur)?)),
                Primitive::Int64 => Value::Int(i128::from(wire::decode_i64(cur)?)),
                Primitive::Int128 => Value::Int(wire::decode_i128(cur)?),
                Primitive::Varuint32 => Value::Int(i128::from(wire::decode_varuint32(cur)?)),
                Primitive::Varint32 => Value::Int(i128::from(wire::decode_varint32(cur)?)),
                Primitive::Float32 => Value::Float(f64::from(wire::decode_f32(cur)?)),
                Primitive::Float64 => Value::Float(wire::decode_f64(cur)?),
                Primitive::Bytes => Value::Bytes(wire::decode_bytes(cur)?.to_vec()),
                Primitive::Str => Value::Str(wire::decode_str(cur)?.to_string()),
            },
            BaseKind::Raw(len) => Value::Bytes(wire::decode_raw(cur, *len)?.to_vec()),
            BaseKind::Struct => {
                let s = self
                    .graph
                    .get_struct(&ty.stem)
                    .ok_or_else(|| CodecError::UnknownType(ty.stem.clone()))?;
                Value::Record(self.decode_struct(s, cur)?)
            }
            BaseKind::Variant => {
                let v = self
                    .graph
                    .get_variant(&ty.stem)
                    .ok_or_else(|| CodecError::UnknownType(ty.stem.clone()))?;
                self.decode_variant(v, cur)?
            }
        };
        Ok(value)
    }

    // Base fields populate the record before declared fields; extension
    // fields decode to absent once the buffer is exhausted.
    fn decode_struct(
        &self,
        s: &StructIr,
        cur: &mut Cursor<'_>,
    ) -> Result<Vec<(String, Value)>, CodecError> {
        let mut fields = Vec::new();
        if let Some(base) = s.base.as_deref() {
            let b = self
                .graph
                .get_struct(base)
                .ok_or_else(|| CodecError::UnknownType(base.to_string()))?;
            fields = self.decode_struct(b, cur)?;
        }
        for f in &s.fields {
            let value = self.decode_chain(&f.ty, &f.ty.modifiers, cur)?;
            fields.push((f.name.clone(), value));
        }
        Ok(fields)
    }

    fn decode_variant(&self, v: &VariantIr, cur: &mut Cursor<'_>) -> Result<Value, CodecError> {
        let index = wire::decode_varuint32(cur)?;
        let case = usize::try_from(index)
            .ok()
            .and_then(|i| v.cases.get(i))
            .ok_or(DecodeError::UnknownVariantIndex {
                name: v.name.clone(),
                index,
            })?;
        let payload = self.decode_chain(case, &case.modifiers, cur)?;
        Ok(Value::record(vec![
            ("type", Value::Str(case.original.clone())),
            ("value", payload),
        ]))
    }

    fn encode_chain(
        &self,
        ty: &ResolvedType,
        mods: &[Modifier],
        value: &Value,
        out: &mut PackBuffer<'_>,
    ) -> Result<(), CodecError> {
        match mods.first() {
            Some(Modifier::Optional) => {
                if matches!(value, Value::Absent) {
                    wire::encode_u8(out, 0)?;
                    Ok(())
                } else {
                    wire::encode_u8(out, 1)?;
                    self.encode_chain(ty, &mods[1..], value, out)
                }
            }
            Some(Modifier::Extension) => {
                if matches!(value, Value::Absent) {
                    Ok(())
                } else {
                    self.encode_chain(ty, &mods[1..], value, out)
                }
            }
            Some(Modifier::Array) => {
                let items = match value {
                    Value::List(items) => items,
                    other => {
                        return Err(EncodeError::WrongType {
                            expected: "list",
                            got: other.label(),
                        }
                        .into())
                    }
                };
                wire::encode_varuint32(out, items.len() as u64)?;
                for item in items {
                    self.encode_chain(ty, &mods[1..], item, out)?;
                }
                Ok(())
            }
            None => self.encode_base(ty, value, out),
        }
    }

    fn encode_base(
        &self,
        ty: &ResolvedType,
        value: &Value,
        out: &mut PackBuffer<'_>,
    ) -> Result<(), CodecError> {
        match &ty.kind {
            BaseKind::Primitive(p) => match p {
                Primitive::Bool => wire::encode_u8(out, value.as_bool()? as u8)?,
                Primitive::Uint8 => {
                    wire::encode_u8(out, value.as_uint(0xFF, "uint8")? as u8)?
                }
                Primitive::Uint16 => {
                    wire::encode_u16(out, value.as_uint(0xFFFF, "uint16")? as u16)?
                }
                Primitive::Uint32 => {
                    wire::encode_u32(out, value.as_uint(0xFFFF_FFFF, "uint32")? as u32)?
                }
                Primitive::Uint64 => wire::encode_u64(
                    out,
                    value.as_uint(u128::from(u64::MAX), "uint64")? as u64,
                )?,
                Primitive::Uint128 => {
                    wire::encode_u128(out, value.as_uint(u128::MAX, "uint128")?)?
                }
                Primitive::Int8 => wire::encode_i8(
                    out,
                    value.as_int(i128::from(i8::MIN), i128::from(i8::MAX), "int8")? as i8,
                )?,
                Primitive::Int16 => wire::encode_i16(
                    out,
                    value.as_int(i128::from(i16::MIN), i128::from(i16::MAX), "int16")? as i16,
                )?,
                Primitive::Int32 => wire::encode_i32(
                    out,
                    value.as_int(i128::from(i32::MIN), i128::from(i32::MAX), "int32")? as i32,
                )?,
                Primitive::Int64 => wire::encode_i64(
                    out,
                    value.as_int(i128::from(i64::MIN), i128::from(i64::MAX), "int64")? as i64,
                )?,
                Primitive::Int128 => {
                    wire::encode_i128(out, value.as_int(i128::MIN, i128::MAX, "int128")?)?
                }
                Primitive::Varuint32 => wire::encode_varuint32(
                    out,
                    value.as_uint(u128::from(u64::MAX), "varuint32")? as u64,
                )?,
                Primitive::Varint32 => wire::encode_varint32(
                    out,
                    value.as_int(i128::from(i32::MIN), i128::from(i32::MAX), "varint32")? as i32,
                )?,
                Primitive::Float32 => wire::encode_f32(out, value.as_float()? as f32)?,
                Primitive::Float64 => wire::encode_f64(out, value.as_float()?)?,
                Primitive::Bytes => wire::encode_bytes(out, value.as_bytes()?)?,
                Primitive::Str => wire::encode_str(out, value.as_str()?)?,
            },
            BaseKind::Raw(len) => wire::encode_raw(out, value.as_bytes()?, *len)?,
            BaseKind::Struct => {
                let s = self
                    .graph
                    .get_struct(&ty.stem)
                    .ok_or_else(|| CodecError::UnknownType(ty.stem.clone()))?;
                self.encode_struct(s, value, out)?;
            }
            BaseKind::Variant => {
                let v = self
                    .graph
                    .get_variant(&ty.stem)
                    .ok_or_else(|| CodecError::UnknownType(ty.stem.clone()))?;
                self.encode_variant(v, value, out)?;
            }
        }
        Ok(())
    }

    fn encode_struct(
        &self,
        s: &StructIr,
        value: &Value,
        out: &mut PackBuffer<'_>,
    ) -> Result<(), CodecError> {
        if !matches!(value, Value::Record(_)) {
            return Err(EncodeError::WrongType {
                expected: "record",
                got: value.label(),
            }
            .into());
        }
        if let Some(base) = s.base.as_deref() {
            let b = self
                .graph
                .get_struct(base)
                .ok_or_else(|| CodecError::UnknownType(base.to_string()))?;
            self.encode_struct(b, value, out)?;
        }
        for f in &s.fields {
            match value.field(&f.name) {
                Some(v) => self.encode_chain(&f.ty, &f.ty.modifiers, v, out)?,
                // a missing key is only tolerable where absence is
                // representable without a presence byte
                None if f.ty.outermost() == Some(Modifier::Extension) => {}
                None => {
                    return Err(EncodeError::MissingField {
                        name: s.name.clone(),
                        field: f.name.clone(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    fn encode_variant(
        &self,
        v: &VariantIr,
        value: &Value,
        out: &mut PackBuffer<'_>,
    ) -> Result<(), CodecError> {
        let (index, payload) = self.select_case(v, value)?;
        wire::encode_varuint32(out, index as u64)?;
        let case = &v.cases[index];
        self.encode_chain(case, &case.modifiers, payload, out)
    }

    // Case selection: the `{type, value}` record form matches case names in
    // order; anything else goes through host-class classification, which
    // picks the first case of the matching class.
    fn select_case<'v>(
        &self,
        v: &VariantIr,
        value: &'v Value,
    ) -> Result<(usize, &'v Value), CodecError> {
        if let Some(tag) = value.field("type") {
            let tag = tag.as_str()?;
            let index = v
                .cases
                .iter()
                .position(|c| c.original == tag)
                .ok_or_else(|| EncodeError::UnknownVariant(v.name.clone()))?;
            let payload = value.field("value").ok_or_else(|| EncodeError::MissingField {
                name: v.name.clone(),
                field: "value".to_string(),
            })?;
            return Ok((index, payload));
        }
        let class = value
            .host_class()
            .ok_or_else(|| EncodeError::UnknownVariant(v.name.clone()))?;
        let index = classification_table(v)[class_index(class)]
            .ok_or_else(|| EncodeError::UnknownVariant(v.name.clone()))?;
        Ok((index, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiDef, AbiView};

    fn graph(json: &str) -> TypeGraph {
        let def = AbiDef::from_str(json).expect("test abi must parse");
        TypeGraph::from_abi(&AbiView::new(&def)).expect("test abi must resolve")
    }

    #[test]
    fn classification_prefers_first_case_per_class() {
        let g = graph(
            r#"{"variants": [{"name": "v", "types":
                ["uint32", "int64", "string", "checksum256", "my"]}],
                "structs": [{"name": "my", "fields": []}]}"#,
        );
        let v = g.get_variant("v").unwrap();
        let table = classification_table(v);
        assert_eq!(table[class_index(HostClass::Int)], Some(0));
        assert_eq!(table[class_index(HostClass::Str)], Some(2));
        assert_eq!(table[class_index(HostClass::Bytes)], Some(3));
        assert_eq!(table[class_index(HostClass::Bool)], None);
        assert_eq!(table[class_index(HostClass::Float)], None);
    }

    #[test]
    fn modified_cases_are_not_classifiable() {
        let g = graph(r#"{"variants": [{"name": "v", "types": ["uint8[]"]}]}"#);
        let table = classification_table(g.get_variant("v").unwrap());
        assert!(table.iter().all(Option::is_none));
    }

    #[test]
    fn unknown_type_is_a_boundary_error() {
        let g = graph(r#"{}"#);
        let codec = Codec::new(&g);
        let err = codec.unpack("nope", &[0x00]).unwrap_err();
        assert_eq!(err, CodecError::UnknownType("nope".to_string()));
        let err = codec.pack("nope[]", &Value::List(vec![])).unwrap_err();
        assert_eq!(err, CodecError::UnknownType("nope[]".to_string()));
    }
}
