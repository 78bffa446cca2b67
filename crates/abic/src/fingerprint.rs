use sha2::{Digest as _, Sha256};

use crate::abi::AbiView;

// Stable content fingerprint of everything that influences codegen: struct
// shapes, variant case lists, alias bindings. Actions and tables do not
// participate. Used as the cache key for generated sources and compiled
// modules.
pub fn hash_abi_view(view: &AbiView) -> String {
    let mut h = Sha256::new();

    h.update(b"structs");
    for s in &view.structs {
        h.update(s.name.as_bytes());
        if let Some(base) = &s.base {
            h.update(base.as_bytes());
        }
        for f in &s.fields {
            h.update(f.name.as_bytes());
            h.update(f.type_.as_bytes());
        }
    }

    h.update(b"variants");
    for v in &view.variants {
        h.update(v.name.as_bytes());
        for t in &v.types {
            h.update(t.as_bytes());
        }
    }

    h.update(b"aliases");
    for a in &view.aliases {
        h.update(a.new_type_name.as_bytes());
        h.update(a.type_.as_bytes());
    }

    format!("{:x}", h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiDef, AbiView};

    fn view(json: &str) -> AbiView {
        AbiView::new(&AbiDef::from_str(json).expect("test abi must parse"))
    }

    #[test]
    fn fingerprint_is_stable() {
        let json = r#"{"structs": [{"name": "s", "fields": [{"name": "x", "type": "uint8"}]}]}"#;
        assert_eq!(hash_abi_view(&view(json)), hash_abi_view(&view(json)));
    }

    #[test]
    fn fingerprint_tracks_type_content() {
        let a = view(r#"{"structs": [{"name": "s", "fields": [{"name": "x", "type": "uint8"}]}]}"#);
        let b = view(r#"{"structs": [{"name": "s", "fields": [{"name": "x", "type": "uint16"}]}]}"#);
        assert_ne!(hash_abi_view(&a), hash_abi_view(&b));
    }

    #[test]
    fn fingerprint_ignores_actions() {
        let a = view(r#"{"structs": [{"name": "s", "fields": []}]}"#);
        let b = view(
            r#"{"structs": [{"name": "s", "fields": []}],
                "actions": [{"name": "go", "type": "s", "ricardian_contract": ""}]}"#,
        );
        assert_eq!(hash_abi_view(&a), hash_abi_view(&b));
    }
}
