use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub ricardian_contract: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub key_names: Vec<String>,
    #[serde(default)]
    pub key_types: Vec<String>,
    #[serde(default)]
    pub index_type: String,
    #[serde(rename = "type")]
    pub type_: String,
}

// Antelope ABI definition as shipped in chain JSON. Actions, tables and
// clauses are accepted so real ABIs parse, but only types/structs/variants
// feed the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiDef {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub types: Vec<AliasDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub variants: Vec<VariantDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

impl AbiDef {
    pub fn from_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read ABI {}: {e}", path.display()))?;
        Ok(Self::from_str(&text)?)
    }
}

// Domain aliases every module receives, mirroring the chain serializer's
// built-in table.
pub const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("float128", "raw(16)"),
    ("name", "uint64"),
    ("account_name", "uint64"),
    ("symbol", "uint64"),
    ("symbol_code", "uint64"),
    ("rd160", "raw(20)"),
    ("checksum160", "raw(20)"),
    ("sha256", "raw(32)"),
    ("checksum256", "raw(32)"),
    ("checksum512", "raw(64)"),
    ("time_point", "uint64"),
    ("time_point_sec", "uint32"),
    ("block_timestamp_type", "uint32"),
    ("public_key", "raw(34)"),
    ("signature", "raw(66)"),
];

pub fn builtin_structs() -> Vec<StructDef> {
    let field = |name: &str, type_: &str| FieldDef {
        name: name.to_string(),
        type_: type_.to_string(),
    };
    vec![
        StructDef {
            name: "asset".to_string(),
            base: None,
            fields: vec![field("amount", "int64"), field("symbol", "symbol")],
        },
        StructDef {
            name: "extended_asset".to_string(),
            base: None,
            fields: vec![field("quantity", "asset"), field("contract", "name")],
        },
    ]
}

// Declaration-ordered view over an ABI with built-ins merged in. The vectors
// keep emission order stable; the maps are lookup only.
#[derive(Debug, Clone)]
pub struct AbiView {
    pub structs: Vec<StructDef>,
    pub variants: Vec<VariantDef>,
    pub aliases: Vec<AliasDef>,
    struct_map: BTreeMap<String, StructDef>,
    variant_map: BTreeMap<String, VariantDef>,
    alias_map: BTreeMap<String, String>,
}

impl AbiView {
    pub fn new(def: &AbiDef) -> Self {
        let mut aliases: Vec<AliasDef> = BUILTIN_ALIASES
            .iter()
            .map(|(new, target)| AliasDef {
                new_type_name: new.to_string(),
                type_: target.to_string(),
            })
            .collect();
        let mut alias_map: BTreeMap<String, String> = aliases
            .iter()
            .map(|a| (a.new_type_name.clone(), a.type_.clone()))
            .collect();
        for a in &def.types {
            match alias_map.insert(a.new_type_name.clone(), a.type_.clone()) {
                Some(old) if old != a.type_ => {
                    warn!(
                        alias = %a.new_type_name,
                        was = %old,
                        now = %a.type_,
                        "replaced alias definition"
                    );
                    let slot = aliases
                        .iter_mut()
                        .find(|b| b.new_type_name == a.new_type_name)
                        .expect("alias present in map implies present in list");
                    slot.type_ = a.type_.clone();
                }
                Some(_) => {}
                None => aliases.push(a.clone()),
            }
        }

        let mut structs = builtin_structs();
        for s in &def.structs {
            if let Some(slot) = structs.iter_mut().find(|b| b.name == s.name) {
                warn!(name = %s.name, "user struct replaces built-in struct");
                *slot = s.clone();
            } else {
                structs.push(s.clone());
            }
        }
        let struct_map = structs
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();

        let variants = def.variants.clone();
        let variant_map = variants
            .iter()
            .map(|v| (v.name.clone(), v.clone()))
            .collect();

        Self {
            structs,
            variants,
            aliases,
            struct_map,
            variant_map,
            alias_map,
        }
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        self.struct_map.get(name)
    }

    pub fn get_variant(&self, name: &str) -> Option<&VariantDef> {
        self.variant_map.get(name)
    }

    pub fn alias_target(&self, name: &str) -> Option<&str> {
        self.alias_map.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_abi() {
        let def = AbiDef::from_str(
            r#"{
                "version": "eosio::abi/1.2",
                "types": [{"new_type_name": "blob", "type": "bytes"}],
                "structs": [
                    {"name": "pair", "fields": [
                        {"name": "first", "type": "uint32"},
                        {"name": "second", "type": "string"}
                    ]}
                ]
            }"#,
        )
        .expect("abi must parse");
        assert_eq!(def.structs.len(), 1);
        assert_eq!(def.types[0].new_type_name, "blob");
        assert!(def.variants.is_empty());
    }

    #[test]
    fn view_merges_builtins() {
        let def = AbiDef::from_str(r#"{"version": "eosio::abi/1.2"}"#).unwrap();
        let view = AbiView::new(&def);
        assert_eq!(view.alias_target("name"), Some("uint64"));
        assert_eq!(view.alias_target("signature"), Some("raw(66)"));
        assert!(view.get_struct("asset").is_some());
        assert!(view.get_struct("extended_asset").is_some());
    }

    #[test]
    fn user_alias_shadows_builtin() {
        let def = AbiDef::from_str(
            r#"{"types": [{"new_type_name": "name", "type": "string"}]}"#,
        )
        .unwrap();
        let view = AbiView::new(&def);
        assert_eq!(view.alias_target("name"), Some("string"));
        // shadowing must not duplicate the dispatch slot
        let count = view
            .aliases
            .iter()
            .filter(|a| a.new_type_name == "name")
            .count();
        assert_eq!(count, 1);
    }
}
