use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::abi::AbiView;
use crate::errors::SchemaError;
use crate::ir::{
    AliasIr, BaseKind, DeclKind, FieldIr, Modifier, ResolvedType, StructIr, VariantIr, PRIMITIVES,
};
use crate::validate;

// Peel every recognised trailing modifier; the returned chain is ordered
// outermost-first. Fixed-size array syntax is rejected outright.
pub fn split_modifiers(expr: &str) -> Result<(&str, Vec<Modifier>), SchemaError> {
    let mut stem = expr;
    let mut mods = Vec::new();
    loop {
        if let Some(rest) = stem.strip_suffix("[]") {
            mods.push(Modifier::Array);
            stem = rest;
            continue;
        }
        if let Some(rest) = stem.strip_suffix('?') {
            mods.push(Modifier::Optional);
            stem = rest;
            continue;
        }
        if let Some(rest) = stem.strip_suffix('$') {
            mods.push(Modifier::Extension);
            stem = rest;
            continue;
        }
        if stem.ends_with(']') {
            if let Some(lb) = stem.rfind('[') {
                if stem[lb + 1..stem.len() - 1].bytes().all(|b| b.is_ascii_digit())
                    && lb + 1 < stem.len() - 1
                {
                    return Err(SchemaError::FixedSizeArray(expr.to_string()));
                }
            }
        }
        break;
    }
    Ok((stem, mods))
}

#[derive(Debug, Clone)]
pub struct TypeGraph {
    pub structs: Vec<StructIr>,
    pub variants: Vec<VariantIr>,
    pub aliases: Vec<AliasIr>,
    decls: BTreeMap<String, DeclKind>,
    struct_ix: BTreeMap<String, usize>,
    variant_ix: BTreeMap<String, usize>,
    alias_ix: BTreeMap<String, usize>,
}

impl TypeGraph {
    pub fn from_abi(view: &AbiView) -> Result<Self, SchemaError> {
        let builder = Builder::new(view)?;
        builder.build()
    }

    pub fn decl_kind(&self, name: &str) -> Option<DeclKind> {
        self.decls.get(name).copied()
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructIr> {
        self.struct_ix.get(name).map(|&i| &self.structs[i])
    }

    pub fn get_variant(&self, name: &str) -> Option<&VariantIr> {
        self.variant_ix.get(name).map(|&i| &self.variants[i])
    }

    pub fn get_alias(&self, name: &str) -> Option<&AliasIr> {
        self.alias_ix.get(name).map(|&i| &self.aliases[i])
    }

    // Names that get a slot in emitted dispatch tables, in emission order.
    pub fn dispatch_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = PRIMITIVES.iter().map(|p| p.name()).collect();
        names.extend(self.structs.iter().map(|s| s.name.as_str()));
        names.extend(self.variants.iter().map(|v| v.name.as_str()));
        names.extend(self.aliases.iter().map(|a| a.name.as_str()));
        names
    }

    // Resolve an arbitrary type expression against the finished graph. Alias
    // stems collapse onto their (already resolved) targets, with use-site
    // modifiers applied as the outer layers.
    pub fn resolve_type(&self, expr: &str) -> Result<ResolvedType, SchemaError> {
        let (stem, mut mods) = split_modifiers(expr)?;
        if let Some(len) = validate::raw_len_of(stem) {
            return Ok(ResolvedType {
                original: expr.to_string(),
                stem: "raw".to_string(),
                kind: BaseKind::Raw(len),
                modifiers: mods,
            });
        }
        match self.decls.get(stem) {
            Some(DeclKind::Primitive(p)) => Ok(ResolvedType {
                original: expr.to_string(),
                stem: stem.to_string(),
                kind: BaseKind::Primitive(*p),
                modifiers: mods,
            }),
            Some(DeclKind::Struct) => Ok(ResolvedType {
                original: expr.to_string(),
                stem: stem.to_string(),
                kind: BaseKind::Struct,
                modifiers: mods,
            }),
            Some(DeclKind::Variant) => Ok(ResolvedType {
                original: expr.to_string(),
                stem: stem.to_string(),
                kind: BaseKind::Variant,
                modifiers: mods,
            }),
            Some(DeclKind::Alias) => {
                let target = &self.get_alias(stem).expect("alias decl has entry").target;
                mods.extend(target.modifiers.iter().copied());
                Ok(ResolvedType {
                    original: expr.to_string(),
                    stem: target.stem.clone(),
                    kind: target.kind.clone(),
                    modifiers: mods,
                })
            }
            None => Err(SchemaError::UnknownType(expr.to_string())),
        }
    }
}

struct Builder<'a> {
    view: &'a AbiView,
    decls: BTreeMap<String, DeclKind>,
}

impl<'a> Builder<'a> {
    fn new(view: &'a AbiView) -> Result<Self, SchemaError> {
        let mut decls: BTreeMap<String, DeclKind> = BTreeMap::new();
        for p in PRIMITIVES {
            decls.insert(p.name().to_string(), DeclKind::Primitive(*p));
        }

        let mut register = |name: &str, kind: DeclKind| -> Result<(), SchemaError> {
            validate::validate_ident(name).map_err(SchemaError::InvalidName)?;
            match decls.get(name) {
                Some(DeclKind::Primitive(_)) => {
                    return Err(SchemaError::ReservedName(name.to_string()))
                }
                Some(_) => return Err(SchemaError::DuplicateName(name.to_string())),
                None => {}
            }
            decls.insert(name.to_string(), kind);
            Ok(())
        };

        for s in &view.structs {
            register(&s.name, DeclKind::Struct)?;
        }
        for v in &view.variants {
            register(&v.name, DeclKind::Variant)?;
        }
        for a in &view.aliases {
            register(&a.new_type_name, DeclKind::Alias)?;
        }

        Ok(Self { view, decls })
    }

    // Resolve a type expression down to a non-alias stem, collapsing alias
    // chains. `visiting` carries the grey set for cycle detection.
    fn resolve_expr(
        &self,
        expr: &str,
        visiting: &mut BTreeSet<String>,
    ) -> Result<ResolvedType, SchemaError> {
        let (first_stem, mut mods) = split_modifiers(expr)?;
        let mut stem = first_stem.to_string();

        loop {
            if let Some(len) = validate::raw_len_of(&stem) {
                return Ok(ResolvedType {
                    original: expr.to_string(),
                    stem: "raw".to_string(),
                    kind: BaseKind::Raw(len),
                    modifiers: mods,
                });
            }
            match self.decls.get(stem.as_str()) {
                Some(DeclKind::Alias) => {
                    if !visiting.insert(stem.clone()) {
                        return Err(SchemaError::CircularAlias(stem));
                    }
                    let target = self
                        .view
                        .alias_target(&stem)
                        .expect("registered alias has a target expression")
                        .to_string();
                    let (t_stem, t_mods) = split_modifiers(&target)?;
                    mods.extend(t_mods);
                    stem = t_stem.to_string();
                }
                Some(DeclKind::Primitive(p)) => {
                    return Ok(ResolvedType {
                        original: expr.to_string(),
                        stem,
                        kind: BaseKind::Primitive(*p),
                        modifiers: mods,
                    })
                }
                Some(DeclKind::Struct) => {
                    return Ok(ResolvedType {
                        original: expr.to_string(),
                        stem,
                        kind: BaseKind::Struct,
                        modifiers: mods,
                    })
                }
                Some(DeclKind::Variant) => {
                    return Ok(ResolvedType {
                        original: expr.to_string(),
                        stem,
                        kind: BaseKind::Variant,
                        modifiers: mods,
                    })
                }
                None => return Err(SchemaError::UnknownType(expr.to_string())),
            }
        }
    }

    fn build(self) -> Result<TypeGraph, SchemaError> {
        let mut aliases = Vec::with_capacity(self.view.aliases.len());
        for a in &self.view.aliases {
            let mut visiting = BTreeSet::new();
            visiting.insert(a.new_type_name.clone());
            let target = self.resolve_expr(&a.type_, &mut visiting)?;
            aliases.push(AliasIr {
                name: a.new_type_name.clone(),
                target,
            });
        }

        let mut structs = Vec::with_capacity(self.view.structs.len());
        for s in &self.view.structs {
            let base = match &s.base {
                Some(b) if !b.is_empty() => {
                    let resolved = self.resolve_expr(b, &mut BTreeSet::new())?;
                    if resolved.kind != BaseKind::Struct || !resolved.modifiers.is_empty() {
                        return Err(SchemaError::InvalidBase {
                            name: s.name.clone(),
                            base: b.clone(),
                        });
                    }
                    Some(resolved.stem)
                }
                _ => None,
            };

            let mut fields = Vec::with_capacity(s.fields.len());
            let mut in_extension_tail = false;
            for f in &s.fields {
                validate::validate_ident(&f.name).map_err(SchemaError::InvalidName)?;
                let ty = self.resolve_expr(&f.type_, &mut BTreeSet::new())?;
                let is_extension = ty.outermost() == Some(Modifier::Extension);
                if in_extension_tail && !is_extension {
                    return Err(SchemaError::ExtensionTail {
                        name: s.name.clone(),
                        field: f.name.clone(),
                    });
                }
                in_extension_tail |= is_extension;
                fields.push(FieldIr {
                    name: f.name.clone(),
                    ty,
                });
            }
            structs.push(StructIr {
                name: s.name.clone(),
                base,
                fields,
            });
        }

        let mut variants = Vec::with_capacity(self.view.variants.len());
        for v in &self.view.variants {
            if v.types.is_empty() {
                return Err(SchemaError::EmptyVariant(v.name.clone()));
            }
            let mut cases = Vec::with_capacity(v.types.len());
            for t in &v.types {
                cases.push(self.resolve_expr(t, &mut BTreeSet::new())?);
            }
            variants.push(VariantIr {
                name: v.name.clone(),
                cases,
            });
        }

        let struct_ix = structs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        let variant_ix = variants
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), i))
            .collect();
        let alias_ix = aliases
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();

        let graph = TypeGraph {
            structs,
            variants,
            aliases,
            decls: self.decls,
            struct_ix,
            variant_ix,
            alias_ix,
        };
        graph.check_inheritance()?;
        debug!(
            structs = graph.structs.len(),
            variants = graph.variants.len(),
            aliases = graph.aliases.len(),
            "resolved ABI type graph"
        );
        Ok(graph)
    }
}

impl TypeGraph {
    // Base chains must terminate, and a flattened struct may not carry two
    // fields with the same name.
    fn check_inheritance(&self) -> Result<(), SchemaError> {
        for s in &self.structs {
            let mut seen_structs = BTreeSet::new();
            seen_structs.insert(s.name.as_str());
            let mut cursor = s;
            while let Some(base) = cursor.base.as_deref() {
                if !seen_structs.insert(base) {
                    return Err(SchemaError::CircularInheritance(s.name.clone()));
                }
                cursor = self.get_struct(base).ok_or_else(|| SchemaError::InvalidBase {
                    name: cursor.name.clone(),
                    base: base.to_string(),
                })?;
            }

            let mut seen_fields = BTreeSet::new();
            for f in self.flattened_fields(s) {
                if !seen_fields.insert(f.name.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        name: s.name.clone(),
                        field: f.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    // Base fields first, then declared fields, the wire and record order.
    pub fn flattened_fields<'g>(&'g self, s: &'g StructIr) -> Vec<&'g FieldIr> {
        let mut out = Vec::new();
        if let Some(base) = s.base.as_deref() {
            if let Some(b) = self.get_struct(base) {
                out.extend(self.flattened_fields(b));
            }
        }
        out.extend(s.fields.iter());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiDef, AbiView};
    use crate::ir::Primitive;

    fn graph(json: &str) -> Result<TypeGraph, SchemaError> {
        let def = AbiDef::from_str(json).expect("test abi must parse");
        TypeGraph::from_abi(&AbiView::new(&def))
    }

    #[test]
    fn modifier_chain_order_is_outermost_first() {
        let (stem, mods) = split_modifiers("uint8?[]").unwrap();
        assert_eq!(stem, "uint8");
        // trailing [] is the outermost wrapper: an array of optionals
        assert_eq!(mods, vec![Modifier::Array, Modifier::Optional]);

        let (stem, mods) = split_modifiers("uint8[]?").unwrap();
        assert_eq!(stem, "uint8");
        assert_eq!(mods, vec![Modifier::Optional, Modifier::Array]);

        let (_, mods) = split_modifiers("thing$").unwrap();
        assert_eq!(mods, vec![Modifier::Extension]);
    }

    #[test]
    fn rejects_fixed_size_arrays() {
        assert_eq!(
            split_modifiers("uint8[32]"),
            Err(SchemaError::FixedSizeArray("uint8[32]".to_string()))
        );
    }

    #[test]
    fn builtin_aliases_decay_to_primitives() {
        let g = graph(r#"{"version": "eosio::abi/1.2"}"#).unwrap();
        let name = g.resolve_type("name").unwrap();
        assert_eq!(name.kind, BaseKind::Primitive(Primitive::Uint64));
        let sig = g.resolve_type("signature").unwrap();
        assert_eq!(sig.kind, BaseKind::Raw(66));
        let f128 = g.resolve_type("float128").unwrap();
        assert_eq!(f128.kind, BaseKind::Raw(16));
    }

    #[test]
    fn alias_chain_collects_inner_modifiers() {
        let g = graph(
            r#"{"types": [
                {"new_type_name": "blob", "type": "uint8[]"},
                {"new_type_name": "blobs", "type": "blob[]"}
            ]}"#,
        )
        .unwrap();
        let t = g.resolve_type("blobs?").unwrap();
        assert_eq!(t.stem, "uint8");
        // use-site modifiers stay outermost, alias layers nest inside
        assert_eq!(
            t.modifiers,
            vec![Modifier::Optional, Modifier::Array, Modifier::Array]
        );
    }

    #[test]
    fn detects_alias_cycles() {
        let err = graph(
            r#"{"types": [
                {"new_type_name": "a", "type": "b"},
                {"new_type_name": "b", "type": "a"}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::CircularAlias(_)));
    }

    #[test]
    fn detects_inheritance_cycles() {
        let err = graph(
            r#"{"structs": [
                {"name": "a", "base": "b", "fields": []},
                {"name": "b", "base": "a", "fields": []}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::CircularInheritance(_)));
    }

    #[test]
    fn rejects_unknown_field_type() {
        let err = graph(
            r#"{"structs": [{"name": "s", "fields": [{"name": "x", "type": "mystery"}]}]}"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::UnknownType("mystery".to_string()));
    }

    #[test]
    fn rejects_non_struct_base() {
        let err = graph(
            r#"{"structs": [{"name": "s", "base": "uint32", "fields": []}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBase { .. }));
    }

    #[test]
    fn rejects_extension_followed_by_plain_field() {
        let err = graph(
            r#"{"structs": [{"name": "s", "fields": [
                {"name": "a", "type": "uint8$"},
                {"name": "b", "type": "uint8"}
            ]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::ExtensionTail { .. }));
    }

    #[test]
    fn accepts_extension_tail_run() {
        let g = graph(
            r#"{"structs": [{"name": "s", "fields": [
                {"name": "a", "type": "uint8"},
                {"name": "b", "type": "uint8$"},
                {"name": "c", "type": "string$"}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(g.get_struct("s").unwrap().fields.len(), 3);
    }

    #[test]
    fn rejects_empty_variant() {
        let err = graph(r#"{"variants": [{"name": "v", "types": []}]}"#).unwrap_err();
        assert_eq!(err, SchemaError::EmptyVariant("v".to_string()));
    }

    #[test]
    fn rejects_struct_shadowing_primitive() {
        let err = graph(r#"{"structs": [{"name": "uint32", "fields": []}]}"#).unwrap_err();
        assert_eq!(err, SchemaError::ReservedName("uint32".to_string()));
    }

    #[test]
    fn rejects_duplicate_flattened_field() {
        let err = graph(
            r#"{"structs": [
                {"name": "header", "fields": [{"name": "id", "type": "uint32"}]},
                {"name": "row", "base": "header", "fields": [{"name": "id", "type": "uint8"}]}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn flattened_fields_keep_base_first() {
        let g = graph(
            r#"{"structs": [
                {"name": "header", "fields": [{"name": "id", "type": "uint32"}]},
                {"name": "row", "base": "header", "fields": [{"name": "value", "type": "string"}]}
            ]}"#,
        )
        .unwrap();
        let row = g.get_struct("row").unwrap();
        let names: Vec<&str> = g
            .flattened_fields(row)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "value"]);
    }

    #[test]
    fn dispatch_names_are_deterministic() {
        let json = r#"{"structs": [{"name": "s", "fields": []}],
                       "variants": [{"name": "v", "types": ["uint32"]}]}"#;
        let a = graph(json).unwrap().dispatch_names().join(",");
        let b = graph(json).unwrap().dispatch_names().join(",");
        assert_eq!(a, b);
        assert!(a.contains("asset"));
        assert!(a.ends_with("signature"));
    }
}
