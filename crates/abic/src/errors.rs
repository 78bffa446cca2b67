use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("circular alias chain through {0:?}")]
    CircularAlias(String),
    #[error("circular inheritance through {0:?}")]
    CircularInheritance(String),
    #[error("base {base:?} of struct {name:?} does not resolve to a struct")]
    InvalidBase { name: String, base: String },
    #[error("variant {0:?} declares no case types")]
    EmptyVariant(String),
    #[error("field {field:?} of struct {name:?} follows an extension field but is not an extension")]
    ExtensionTail { name: String, field: String },
    #[error("fixed-size arrays are not supported: {0:?}")]
    FixedSizeArray(String),
    #[error("{0:?} shadows a built-in primitive")]
    ReservedName(String),
    #[error("duplicate declaration of {0:?}")]
    DuplicateName(String),
    #[error("duplicate field {field:?} in struct {name:?}")]
    DuplicateField { name: String, field: String },
    #[error("{0}")]
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("record for {name:?} is missing required field {field:?}")]
    MissingField { name: String, field: String },
    #[error("value out of range for {ty}")]
    OutOfRange { ty: &'static str },
    #[error("expected {expected} value, got {got}")]
    WrongType {
        expected: &'static str,
        got: &'static str,
    },
    #[error("value does not match any case of variant {0:?}")]
    UnknownVariant(String),
    // Distinguished so the boundary wrapper can grow the buffer and retry.
    #[error("output buffer too small")]
    BufferTooSmall,
    #[error("exceeded maximum resize attempts")]
    ResizeAttemptsExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("input buffer exhausted")]
    Truncated,
    #[error("varuint overflows 64 bits")]
    VarintOverflow,
    #[error("varint32 encoding longer than 5 bytes")]
    VarintTooLong,
    #[error("varint32 out of 32-bit range")]
    VarintOutOfRange,
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,
    #[error("unknown index {index} for variant {name:?}")]
    UnknownVariantIndex { name: String, index: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
