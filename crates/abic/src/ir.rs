// Typed IR the emitter and the reference codec walk. Built once per ABI by
// the resolver and read-only afterwards.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Optional,
    Extension,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint128,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Varuint32,
    Varint32,
    Float32,
    Float64,
    Bytes,
    Str,
}

// Declaration order here fixes the order of primitive entries in emitted
// dispatch tables.
pub const PRIMITIVES: &[Primitive] = &[
    Primitive::Bool,
    Primitive::Uint8,
    Primitive::Uint16,
    Primitive::Uint32,
    Primitive::Uint64,
    Primitive::Uint128,
    Primitive::Int8,
    Primitive::Int16,
    Primitive::Int32,
    Primitive::Int64,
    Primitive::Int128,
    Primitive::Varuint32,
    Primitive::Varint32,
    Primitive::Float32,
    Primitive::Float64,
    Primitive::Bytes,
    Primitive::Str,
];

impl Primitive {
    pub fn parse_named(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Primitive::Bool),
            "uint8" => Some(Primitive::Uint8),
            "uint16" => Some(Primitive::Uint16),
            "uint32" => Some(Primitive::Uint32),
            "uint64" => Some(Primitive::Uint64),
            "uint128" => Some(Primitive::Uint128),
            "int8" => Some(Primitive::Int8),
            "int16" => Some(Primitive::Int16),
            "int32" => Some(Primitive::Int32),
            "int64" => Some(Primitive::Int64),
            "int128" => Some(Primitive::Int128),
            "varuint32" => Some(Primitive::Varuint32),
            "varint32" => Some(Primitive::Varint32),
            "float32" => Some(Primitive::Float32),
            "float64" => Some(Primitive::Float64),
            "bytes" => Some(Primitive::Bytes),
            "string" => Some(Primitive::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Uint8 => "uint8",
            Primitive::Uint16 => "uint16",
            Primitive::Uint32 => "uint32",
            Primitive::Uint64 => "uint64",
            Primitive::Uint128 => "uint128",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Int128 => "int128",
            Primitive::Varuint32 => "varuint32",
            Primitive::Varint32 => "varint32",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Bytes => "bytes",
            Primitive::Str => "string",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::Uint8
                | Primitive::Uint16
                | Primitive::Uint32
                | Primitive::Uint64
                | Primitive::Uint128
                | Primitive::Int8
                | Primitive::Int16
                | Primitive::Int32
                | Primitive::Int64
                | Primitive::Int128
                | Primitive::Varuint32
                | Primitive::Varint32
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::Float32 | Primitive::Float64)
    }
}

// What a resolved stem denotes. Aliases never appear here: field resolution
// collapses alias chains down to one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseKind {
    Primitive(Primitive),
    Raw(u32),
    Struct,
    Variant,
}

// A fully resolved type expression: the stem plus its modifier chain, the
// chain ordered outermost-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub original: String,
    pub stem: String,
    pub kind: BaseKind,
    pub modifiers: Vec<Modifier>,
}

impl ResolvedType {
    pub fn outermost(&self) -> Option<Modifier> {
        self.modifiers.first().copied()
    }
}

#[derive(Debug, Clone)]
pub struct FieldIr {
    pub name: String,
    pub ty: ResolvedType,
}

#[derive(Debug, Clone)]
pub struct StructIr {
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<FieldIr>,
}

#[derive(Debug, Clone)]
pub struct VariantIr {
    pub name: String,
    pub cases: Vec<ResolvedType>,
}

#[derive(Debug, Clone)]
pub struct AliasIr {
    pub name: String,
    pub target: ResolvedType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Primitive(Primitive),
    Struct,
    Variant,
    Alias,
}
