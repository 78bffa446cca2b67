use tracing::{debug, info};

use crate::abi::AbiView;
use crate::c_emit;
use crate::errors::SchemaError;
use crate::fingerprint::hash_abi_view;
use crate::resolver::TypeGraph;
use crate::validate;

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    // Which halves of the codec the module carries; encode-only and
    // decode-only modules are both valid builds.
    pub with_pack: bool,
    pub with_unpack: bool,
    // Compiles trace fprintf calls into the generated routines.
    pub debug: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            with_pack: true,
            with_unpack: true,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenErrorKind {
    Ident,
    Schema,
    Internal,
}

#[derive(Debug, Clone)]
pub struct CodegenError {
    pub kind: CodegenErrorKind,
    pub message: String,
}

impl CodegenError {
    pub fn new(kind: CodegenErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CodegenError {}

impl From<SchemaError> for CodegenError {
    fn from(e: SchemaError) -> Self {
        CodegenError::new(CodegenErrorKind::Schema, e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CodegenOutput {
    pub module_name: String,
    pub abi_hash: String,
    pub c_src: String,
}

// Generate one C translation unit defining the serialization routines for
// every type the ABI declares. Output is byte-identical for identical input.
pub fn c_source_from_abi(
    name: &str,
    abi: &AbiView,
    options: &CodegenOptions,
) -> Result<CodegenOutput, CodegenError> {
    validate::validate_module_name(name)
        .map_err(|e| CodegenError::new(CodegenErrorKind::Ident, e))?;
    if !options.with_pack && !options.with_unpack {
        return Err(CodegenError::new(
            CodegenErrorKind::Internal,
            "module must carry at least one of pack/unpack".to_string(),
        ));
    }

    let abi_hash = hash_abi_view(abi);
    debug!(module = name, hash = %abi_hash, "generating C source");

    let graph = TypeGraph::from_abi(abi)?;
    let c_src = c_emit::emit_c_module(name, &abi_hash, &graph, options)?;

    info!(
        module = name,
        bytes = c_src.len(),
        "generated ABI codec module"
    );
    Ok(CodegenOutput {
        module_name: name.to_string(),
        abi_hash,
        c_src,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiDef, AbiView};

    #[test]
    fn rejects_bad_module_name() {
        let view = AbiView::new(&AbiDef::from_str("{}").unwrap());
        let err = c_source_from_abi("bad name", &view, &CodegenOptions::default()).unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::Ident);
    }

    #[test]
    fn rejects_empty_codec_selection() {
        let view = AbiView::new(&AbiDef::from_str("{}").unwrap());
        let opts = CodegenOptions {
            with_pack: false,
            with_unpack: false,
            debug: false,
        };
        let err = c_source_from_abi("m", &view, &opts).unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::Internal);
    }

    #[test]
    fn schema_failures_reject_the_whole_abi() {
        let def = AbiDef::from_str(
            r#"{"structs": [{"name": "s", "fields": [{"name": "x", "type": "ghost"}]}]}"#,
        )
        .unwrap();
        let err =
            c_source_from_abi("m", &AbiView::new(&def), &CodegenOptions::default()).unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::Schema);
        assert!(err.message.contains("ghost"));
    }
}
