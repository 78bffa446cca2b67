use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ir::{BaseKind, Modifier, Primitive, ResolvedType, StructIr, VariantIr};
use crate::resolver::TypeGraph;
use crate::value::Value;

// Deterministic random value generation for round-trip suites. Seeded
// generators make failures reproducible; recursion depth is bounded so
// self-referential ABIs terminate.

const MAX_DEPTH: u32 = 8;

pub fn rng_for(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_value(graph: &TypeGraph, type_name: &str, rng: &mut StdRng) -> Value {
    let ty = graph
        .resolve_type(type_name)
        .expect("generator requires a resolvable type");
    random_chain(graph, &ty, &ty.modifiers, rng, 0)
}

fn random_chain(
    graph: &TypeGraph,
    ty: &ResolvedType,
    mods: &[Modifier],
    rng: &mut StdRng,
    depth: u32,
) -> Value {
    match mods.first() {
        Some(Modifier::Optional) => {
            if depth < MAX_DEPTH && rng.gen_bool(0.5) {
                random_chain(graph, ty, &mods[1..], rng, depth)
            } else {
                Value::Absent
            }
        }
        // inner extension layers stay present; absence is only encodable at
        // the end of the buffer and the struct generator owns that decision
        Some(Modifier::Extension) => random_chain(graph, ty, &mods[1..], rng, depth),
        Some(Modifier::Array) => {
            let len = if depth >= MAX_DEPTH {
                0
            } else {
                rng.gen_range(0..=3)
            };
            let items = (0..len)
                .map(|_| random_chain(graph, ty, &mods[1..], rng, depth + 1))
                .collect();
            Value::List(items)
        }
        None => random_base(graph, ty, rng, depth),
    }
}

fn random_base(graph: &TypeGraph, ty: &ResolvedType, rng: &mut StdRng, depth: u32) -> Value {
    match &ty.kind {
        BaseKind::Primitive(p) => random_primitive(*p, rng),
        BaseKind::Raw(len) => {
            let mut bytes = vec![0u8; *len as usize];
            rng.fill(bytes.as_mut_slice());
            Value::Bytes(bytes)
        }
        BaseKind::Struct => {
            let s = graph
                .get_struct(&ty.stem)
                .expect("resolved struct stem exists");
            random_struct(graph, s, rng, depth)
        }
        BaseKind::Variant => {
            let v = graph
                .get_variant(&ty.stem)
                .expect("resolved variant stem exists");
            random_variant(graph, v, rng, depth)
        }
    }
}

fn random_primitive(p: Primitive, rng: &mut StdRng) -> Value {
    match p {
        Primitive::Bool => Value::Bool(rng.gen_bool(0.5)),
        Primitive::Uint8 => Value::Int(i128::from(rng.gen::<u8>())),
        Primitive::Uint16 => Value::Int(i128::from(rng.gen::<u16>())),
        Primitive::Uint32 => Value::Int(i128::from(rng.gen::<u32>())),
        Primitive::Uint64 => Value::Int(i128::from(rng.gen::<u64>())),
        Primitive::Uint128 => Value::Uint128(rng.gen::<u128>()),
        Primitive::Int8 => Value::Int(i128::from(rng.gen::<i8>())),
        Primitive::Int16 => Value::Int(i128::from(rng.gen::<i16>())),
        Primitive::Int32 => Value::Int(i128::from(rng.gen::<i32>())),
        Primitive::Int64 => Value::Int(i128::from(rng.gen::<i64>())),
        Primitive::Int128 => Value::Int(rng.gen::<i128>()),
        Primitive::Varuint32 => Value::Int(i128::from(rng.gen::<u32>())),
        Primitive::Varint32 => Value::Int(i128::from(rng.gen::<i32>())),
        // f32 payloads widen losslessly, so round-trip equality holds
        Primitive::Float32 => Value::Float(f64::from(rng.gen::<f32>())),
        Primitive::Float64 => Value::Float(rng.gen::<f64>() * 2.0e4 - 1.0e4),
        Primitive::Bytes => {
            let mut bytes = vec![0u8; rng.gen_range(0..=15)];
            rng.fill(bytes.as_mut_slice());
            Value::Bytes(bytes)
        }
        Primitive::Str => {
            let len = rng.gen_range(0..=14);
            let s: String = (0..len)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            Value::Str(s)
        }
    }
}

fn random_struct(graph: &TypeGraph, s: &StructIr, rng: &mut StdRng, depth: u32) -> Value {
    let mut fields = Vec::new();
    // once one extension field is absent, every later one must be too
    let mut tail_cut = false;
    for f in graph.flattened_fields(s) {
        let value = if f.ty.outermost() == Some(Modifier::Extension) {
            if tail_cut || rng.gen_bool(0.25) {
                tail_cut = true;
                Value::Absent
            } else {
                random_chain(graph, &f.ty, &f.ty.modifiers[1..], rng, depth + 1)
            }
        } else {
            random_chain(graph, &f.ty, &f.ty.modifiers, rng, depth + 1)
        };
        fields.push((f.name.clone(), value));
    }
    Value::Record(fields)
}

fn random_variant(graph: &TypeGraph, v: &VariantIr, rng: &mut StdRng, depth: u32) -> Value {
    let index = rng.gen_range(0..v.cases.len());
    let case = &v.cases[index];
    let payload = random_chain(graph, case, &case.modifiers, rng, depth + 1);
    Value::record(vec![
        ("type", Value::Str(case.original.clone())),
        ("value", payload),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiDef, AbiView};

    #[test]
    fn generation_is_deterministic_per_seed() {
        let def = AbiDef::from_str(
            r#"{"structs": [{"name": "s", "fields": [
                {"name": "xs", "type": "uint32[]"},
                {"name": "tag", "type": "string?"},
                {"name": "tail", "type": "bytes$"}
            ]}]}"#,
        )
        .unwrap();
        let graph = TypeGraph::from_abi(&AbiView::new(&def)).unwrap();
        let a = random_value(&graph, "s", &mut rng_for(7));
        let b = random_value(&graph, "s", &mut rng_for(7));
        let c = random_value(&graph, "s", &mut rng_for(8));
        assert_eq!(a, b);
        // different seeds should explore the space (not a hard guarantee,
        // but with this shape a collision would be a generator bug)
        assert_ne!(a, c);
    }
}
