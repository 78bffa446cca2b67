use crate::codec::{classification_table, INITIAL_PACK_CAPACITY, MAX_RESIZE_ATTEMPTS};
use crate::compile::{CodegenError, CodegenErrorKind, CodegenOptions};
use crate::ir::{BaseKind, Modifier, ResolvedType, StructIr, VariantIr};
use crate::resolver::TypeGraph;
use crate::value::HOST_CLASSES;

// Emits one self-contained C translation unit per ABI: the runtime preamble
// (value model, wire helpers, primitive codecs), then per-type routines in
// declaration order, then the dispatch table and the module entry points.
//
// Every routine is forward-declared before any body so the type graph may be
// cyclic; recursion is broken by name, never by pointer.
pub fn emit_c_module(
    name: &str,
    abi_hash: &str,
    graph: &TypeGraph,
    options: &CodegenOptions,
) -> Result<String, CodegenError> {
    let mut emitter = Emitter::new(graph, options.clone());
    emitter.emit_module(name, abi_hash)?;
    Ok(emitter.out)
}

struct Emitter<'a> {
    graph: &'a TypeGraph,
    options: CodegenOptions,
    out: String,
    indent: usize,
}

impl<'a> Emitter<'a> {
    fn new(graph: &'a TypeGraph, options: CodegenOptions) -> Self {
        Self {
            graph,
            options,
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn push_raw(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn err(&self, message: String) -> CodegenError {
        CodegenError::new(CodegenErrorKind::Internal, message)
    }

    fn emit_module(&mut self, name: &str, abi_hash: &str) -> Result<(), CodegenError> {
        self.line(&format!("/* {name}: ABI codec module (abi {abi_hash}) */"));
        self.blank();
        if self.options.debug {
            self.line("#define ABIC_DEBUG 1");
            self.blank();
        }
        self.push_raw(RUNTIME_C_COMMON);
        if self.options.with_unpack {
            self.push_raw(RUNTIME_C_UNPACK);
        }
        if self.options.with_pack {
            self.push_raw(RUNTIME_C_PACK);
        }

        self.line(&format!(
            "const char *abic_module_name(void) {{ return \"{name}\"; }}"
        ));
        self.line(&format!(
            "const char *abic_module_abi_hash(void) {{ return \"{abi_hash}\"; }}"
        ));
        self.blank();

        self.emit_forward_decls();

        let structs: Vec<StructIr> = self.graph.structs.clone();
        for s in &structs {
            self.emit_struct(s)?;
        }
        let variants: Vec<VariantIr> = self.graph.variants.clone();
        for v in &variants {
            self.emit_variant(v)?;
        }
        let aliases = self.graph.aliases.clone();
        for a in &aliases {
            self.emit_alias(&a.name, &a.target)?;
        }

        self.emit_dispatch();
        Ok(())
    }

    fn emit_forward_decls(&mut self) {
        let mut names: Vec<String> = Vec::new();
        names.extend(self.graph.structs.iter().map(|s| s.name.clone()));
        names.extend(self.graph.variants.iter().map(|v| v.name.clone()));
        names.extend(self.graph.aliases.iter().map(|a| a.name.clone()));

        if self.options.with_unpack {
            for n in &names {
                self.line(&format!(
                    "abic_value_t *unpack_{n}(const uint8_t *buf, size_t buf_len, size_t *off);"
                ));
            }
            self.blank();
        }
        if self.options.with_pack {
            for n in &names {
                self.line(&format!(
                    "ptrdiff_t pack_{n}(const abic_value_t *v, uint8_t *out, size_t cap);"
                ));
            }
            self.blank();
        }
    }

    // Call expression decoding the bare stem of a resolved type.
    fn unpack_stem_call(&self, ty: &ResolvedType) -> String {
        match &ty.kind {
            BaseKind::Primitive(p) => format!("unpack_{}(buf, buf_len, off)", p.name()),
            BaseKind::Raw(len) => format!("unpack_raw(buf, buf_len, off, {len})"),
            BaseKind::Struct | BaseKind::Variant => {
                format!("unpack_{}(buf, buf_len, off)", ty.stem)
            }
        }
    }

    fn pack_stem_call(&self, ty: &ResolvedType, v: &str, out: &str, cap: &str) -> String {
        match &ty.kind {
            BaseKind::Primitive(p) => format!("pack_{}({v}, {out}, {cap})", p.name()),
            BaseKind::Raw(len) => format!("pack_raw({v}, {len}, {out}, {cap})"),
            BaseKind::Struct | BaseKind::Variant => format!("pack_{}({v}, {out}, {cap})", ty.stem),
        }
    }

    // One helper function per modifier layer, innermost emitted first so
    // each body only calls functions that already exist. Returns the call
    // expression for the outermost layer.
    fn emit_unpack_chain(&mut self, prefix: &str, ty: &ResolvedType) -> String {
        if ty.modifiers.is_empty() {
            return self.unpack_stem_call(ty);
        }
        let depth = ty.modifiers.len();
        for d in (0..depth).rev() {
            let inner = if d + 1 == depth {
                self.unpack_stem_call(ty)
            } else {
                format!("{prefix}_{}(buf, buf_len, off)", d + 1)
            };
            self.line(&format!(
                "static abic_value_t *{prefix}_{d}(const uint8_t *buf, size_t buf_len, size_t *off) {{"
            ));
            self.indent += 1;
            match ty.modifiers[d] {
                Modifier::Optional => {
                    self.line("uint8_t flag;");
                    self.line("if (abic_read_u8(buf, buf_len, off, &flag)) return NULL;");
                    self.line("if (!flag) return abic_value_absent();");
                    self.line(&format!("return {inner};"));
                }
                Modifier::Extension => {
                    self.line("if (*off >= buf_len) return abic_value_absent();");
                    self.line(&format!("return {inner};"));
                }
                Modifier::Array => {
                    self.line("uint64_t count;");
                    self.line("if (abic_read_varuint32(buf, buf_len, off, &count)) return NULL;");
                    self.line("abic_value_t *list = abic_value_list(count < 4096 ? (size_t)count : 4096);");
                    self.line("if (!list) return NULL;");
                    self.line("for (uint64_t i = 0; i < count; i++) {");
                    self.indent += 1;
                    self.line(&format!("abic_value_t *item = {inner};"));
                    self.line("if (!item || abic_list_push(list, item)) {");
                    self.indent += 1;
                    self.line("if (item) abic_value_free(item);");
                    self.line("abic_value_free(list);");
                    self.line("return NULL;");
                    self.indent -= 1;
                    self.line("}");
                    self.indent -= 1;
                    self.line("}");
                    self.line("return list;");
                }
            }
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
        format!("{prefix}_0(buf, buf_len, off)")
    }

    // Same shape as the unpack side; the (v, out, cap) triple names the
    // arguments at the outer call site and only shows up in the returned
    // expression, helper bodies use their own parameters.
    fn emit_pack_chain(
        &mut self,
        prefix: &str,
        ty: &ResolvedType,
        v: &str,
        out: &str,
        cap: &str,
    ) -> String {
        if ty.modifiers.is_empty() {
            return self.pack_stem_call(ty, v, out, cap);
        }
        let depth = ty.modifiers.len();
        for d in (0..depth).rev() {
            let inner_of = |v: &str, out: &str, cap: &str| -> String {
                if d + 1 == depth {
                    self.pack_stem_call(ty, v, out, cap)
                } else {
                    format!("{prefix}_{}({v}, {out}, {cap})", d + 1)
                }
            };
            let on_value = inner_of("v", "out + 1", "cap - 1");
            let on_plain = inner_of("v", "out", "cap");
            let on_item = inner_of("v->as.list.items[i]", "out + off", "cap - off");
            self.line(&format!(
                "static ptrdiff_t {prefix}_{d}(const abic_value_t *v, uint8_t *out, size_t cap) {{"
            ));
            self.indent += 1;
            match ty.modifiers[d] {
                Modifier::Optional => {
                    self.line("if (v->kind == ABIC_ABSENT) return abic_write_u8(out, cap, 0);");
                    self.line("ptrdiff_t flag = abic_write_u8(out, cap, 1);");
                    self.line("if (flag < 0) return flag;");
                    self.line(&format!("ptrdiff_t n = {on_value};"));
                    self.line("if (n < 0) return n;");
                    self.line("return n + 1;");
                }
                Modifier::Extension => {
                    self.line("if (v->kind == ABIC_ABSENT) return 0;");
                    self.line(&format!("return {on_plain};"));
                }
                Modifier::Array => {
                    self.line("if (v->kind != ABIC_LIST) return ABIC_EPACK;");
                    self.line(
                        "ptrdiff_t n = abic_write_varuint32(out, cap, (uint64_t)v->as.list.len);",
                    );
                    self.line("if (n < 0) return n;");
                    self.line("size_t off = (size_t)n;");
                    self.line("for (size_t i = 0; i < v->as.list.len; i++) {");
                    self.indent += 1;
                    self.line(&format!("n = {on_item};"));
                    self.line("if (n < 0) return n;");
                    self.line("off += (size_t)n;");
                    self.indent -= 1;
                    self.line("}");
                    self.line("return (ptrdiff_t)off;");
                }
            }
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
        format!("{prefix}_0({v}, {out}, {cap})")
    }

    fn emit_struct(&mut self, s: &StructIr) -> Result<(), CodegenError> {
        if self.options.with_unpack {
            let mut calls = Vec::with_capacity(s.fields.len());
            for f in &s.fields {
                let prefix = format!("unpack_{}__{}", s.name, f.name);
                calls.push(self.emit_unpack_chain(&prefix, &f.ty));
            }

            self.line(&format!(
                "abic_value_t *unpack_{}(const uint8_t *buf, size_t buf_len, size_t *off) {{",
                s.name
            ));
            self.indent += 1;
            match &s.base {
                Some(base) => {
                    self.line(&format!(
                        "abic_value_t *rec = unpack_{base}(buf, buf_len, off);"
                    ));
                    self.line("if (!rec) return NULL;");
                }
                None => {
                    self.line(&format!(
                        "abic_value_t *rec = abic_value_record({});",
                        s.fields.len()
                    ));
                    self.line("if (!rec) return NULL;");
                    if s.fields.is_empty() {
                        self.line("(void)buf; (void)buf_len; (void)off;");
                    }
                }
            }
            if !s.fields.is_empty() {
                self.line("abic_value_t *v;");
                for (f, call) in s.fields.iter().zip(&calls) {
                    self.line(&format!("v = {call};"));
                    self.line("if (!v) goto fail;");
                    self.line(&format!(
                        "if (abic_record_push(rec, \"{}\", v)) {{ abic_value_free(v); goto fail; }}",
                        f.name
                    ));
                }
            }
            self.line("return rec;");
            if !s.fields.is_empty() {
                self.indent -= 1;
                self.line("fail:");
                self.indent += 1;
                self.line("abic_value_free(rec);");
                self.line("return NULL;");
            }
            self.indent -= 1;
            self.line("}");
            self.blank();
        }

        if self.options.with_pack {
            let mut calls = Vec::with_capacity(s.fields.len());
            for f in &s.fields {
                let prefix = format!("pack_{}__{}", s.name, f.name);
                calls.push(self.emit_pack_chain(&prefix, &f.ty, "f", "out + off", "cap - off"));
            }

            self.line(&format!(
                "ptrdiff_t pack_{}(const abic_value_t *v, uint8_t *out, size_t cap) {{",
                s.name
            ));
            self.indent += 1;
            self.line("if (v->kind != ABIC_RECORD) return ABIC_EPACK;");
            self.line("size_t off = 0;");
            if s.base.is_some() || !s.fields.is_empty() {
                self.line("ptrdiff_t n;");
            } else {
                self.line("(void)out; (void)cap;");
            }
            if let Some(base) = &s.base {
                self.line(&format!("n = pack_{base}(v, out, cap);"));
                self.line("if (n < 0) return n;");
                self.line("off += (size_t)n;");
            }
            if !s.fields.is_empty() {
                self.line("const abic_value_t *f;");
            }
            for (f, call) in s.fields.iter().zip(&calls) {
                self.line(&format!("f = abic_record_get(v, \"{}\");", f.name));
                if f.ty.outermost() == Some(Modifier::Extension) {
                    // a missing key on a trailing extension encodes nothing
                    self.line("if (f) {");
                    self.indent += 1;
                    self.line(&format!("n = {call};"));
                    self.line("if (n < 0) return n;");
                    self.line("off += (size_t)n;");
                    self.indent -= 1;
                    self.line("}");
                } else {
                    self.line("if (!f) return ABIC_EPACK;");
                    self.line(&format!("n = {call};"));
                    self.line("if (n < 0) return n;");
                    self.line("off += (size_t)n;");
                }
            }
            self.line("return (ptrdiff_t)off;");
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
        Ok(())
    }

    fn emit_variant(&mut self, v: &VariantIr) -> Result<(), CodegenError> {
        if v.cases.is_empty() {
            return Err(self.err(format!("variant {} reached the emitter empty", v.name)));
        }

        if self.options.with_unpack {
            let mut calls = Vec::with_capacity(v.cases.len());
            for (i, case) in v.cases.iter().enumerate() {
                let prefix = format!("unpack_{}__c{i}", v.name);
                calls.push(self.emit_unpack_chain(&prefix, case));
            }

            self.line(&format!(
                "abic_value_t *unpack_{}(const uint8_t *buf, size_t buf_len, size_t *off) {{",
                v.name
            ));
            self.indent += 1;
            self.line("uint64_t tag;");
            self.line("if (abic_read_varuint32(buf, buf_len, off, &tag)) return NULL;");
            self.line("abic_value_t *payload = NULL;");
            self.line("const char *case_name = NULL;");
            self.line("switch (tag) {");
            for (i, (case, call)) in v.cases.iter().zip(&calls).enumerate() {
                self.line(&format!("case {i}:"));
                self.indent += 1;
                self.line(&format!("payload = {call};"));
                self.line(&format!("case_name = \"{}\";", case.original));
                self.line("break;");
                self.indent -= 1;
            }
            self.line("default:");
            self.indent += 1;
            self.line(&format!(
                "ABIC_TRACE(\"unknown index %llu for variant {}\\n\", (unsigned long long)tag);",
                v.name
            ));
            self.line("return NULL;");
            self.indent -= 1;
            self.line("}");
            self.line("if (!payload) return NULL;");
            self.line("return abic_variant_record(case_name, payload);");
            self.indent -= 1;
            self.line("}");
            self.blank();
        }

        if self.options.with_pack {
            let table = classification_table(v);
            let cells: Vec<String> = table
                .iter()
                .map(|slot| match slot {
                    Some(i) => i.to_string(),
                    None => "-1".to_string(),
                })
                .collect();
            self.line("/* host class -> first case: bool, int, float, bytes, str */");
            self.line(&format!(
                "static const int32_t abic_v_{}_class[{}] = {{ {} }};",
                v.name,
                HOST_CLASSES.len(),
                cells.join(", ")
            ));
            self.blank();

            let mut calls = Vec::with_capacity(v.cases.len());
            for (i, case) in v.cases.iter().enumerate() {
                let prefix = format!("pack_{}__c{i}", v.name);
                calls.push(self.emit_pack_chain(
                    &prefix,
                    case,
                    "payload",
                    "out + off",
                    "cap - off",
                ));
            }

            self.line(&format!(
                "ptrdiff_t pack_{}(const abic_value_t *v, uint8_t *out, size_t cap) {{",
                v.name
            ));
            self.indent += 1;
            self.line("int32_t tag = -1;");
            self.line("const abic_value_t *payload = v;");
            self.line("if (v->kind == ABIC_RECORD) {");
            self.indent += 1;
            self.line("const abic_value_t *name = abic_record_get(v, \"type\");");
            self.line("if (!name || name->kind != ABIC_STR) return ABIC_EPACK;");
            for (i, case) in v.cases.iter().enumerate() {
                let kw = if i == 0 { "if" } else { "else if" };
                self.line(&format!(
                    "{kw} (abic_str_eq(name, \"{}\")) tag = {i};",
                    case.original
                ));
            }
            self.line("else return ABIC_EPACK;");
            self.line("payload = abic_record_get(v, \"value\");");
            self.line("if (!payload) return ABIC_EPACK;");
            self.indent -= 1;
            self.line("} else {");
            self.indent += 1;
            self.line("int cls = abic_host_class(v);");
            self.line("if (cls < 0) return ABIC_EPACK;");
            self.line(&format!("tag = abic_v_{}_class[cls];", v.name));
            self.line("if (tag < 0) return ABIC_EPACK;");
            self.indent -= 1;
            self.line("}");
            self.line("ptrdiff_t n = abic_write_varuint32(out, cap, (uint64_t)tag);");
            self.line("if (n < 0) return n;");
            self.line("size_t off = (size_t)n;");
            self.line("switch (tag) {");
            for (i, call) in calls.iter().enumerate() {
                self.line(&format!("case {i}: n = {call}; break;"));
            }
            self.line("default: return ABIC_EPACK;");
            self.line("}");
            self.line("if (n < 0) return n;");
            self.line("return (ptrdiff_t)(off + (size_t)n);");
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
        Ok(())
    }

    fn emit_alias(&mut self, name: &str, target: &ResolvedType) -> Result<(), CodegenError> {
        if self.options.with_unpack {
            let prefix = format!("unpack_{name}__t");
            let call = self.emit_unpack_chain(&prefix, target);
            self.line(&format!(
                "abic_value_t *unpack_{name}(const uint8_t *buf, size_t buf_len, size_t *off) {{"
            ));
            self.indent += 1;
            self.line(&format!("return {call};"));
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
        if self.options.with_pack {
            let prefix = format!("pack_{name}__t");
            let call = self.emit_pack_chain(&prefix, target, "v", "out", "cap");
            self.line(&format!(
                "ptrdiff_t pack_{name}(const abic_value_t *v, uint8_t *out, size_t cap) {{"
            ));
            self.indent += 1;
            self.line(&format!("return {call};"));
            self.indent -= 1;
            self.line("}");
            self.blank();
        }
        Ok(())
    }

    fn emit_dispatch(&mut self) {
        self.line("typedef abic_value_t *(*abic_unpack_fn)(const uint8_t *, size_t, size_t *);");
        self.line("typedef ptrdiff_t (*abic_pack_fn)(const abic_value_t *, uint8_t *, size_t);");
        self.blank();
        self.line("typedef struct {");
        self.indent += 1;
        self.line("const char *name;");
        self.line("abic_unpack_fn unpack;");
        self.line("abic_pack_fn pack;");
        self.indent -= 1;
        self.line("} abic_entry_t;");
        self.blank();

        let names: Vec<String> = self
            .graph
            .dispatch_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.line("static const abic_entry_t abic_table[] = {");
        self.indent += 1;
        for n in &names {
            let unpack = if self.options.with_unpack {
                format!("unpack_{n}")
            } else {
                "NULL".to_string()
            };
            let pack = if self.options.with_pack {
                format!("pack_{n}")
            } else {
                "NULL".to_string()
            };
            self.line(&format!("{{ \"{n}\", {unpack}, {pack} }},"));
        }
        self.indent -= 1;
        self.line("};");
        self.blank();

        self.push_raw(DISPATCH_LOOKUP_C);
        if self.options.with_unpack {
            self.push_raw(DISPATCH_UNPACK_C);
        }
        if self.options.with_pack {
            self.push_raw(&format!(
                "#define ABIC_PACK_INITIAL_CAP {INITIAL_PACK_CAPACITY}\n#define ABIC_PACK_MAX_ATTEMPTS {MAX_RESIZE_ATTEMPTS}\n"
            ));
            self.push_raw(DISPATCH_PACK_C);
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime preamble: value model and allocation helpers shared by both codec
// halves.
// ---------------------------------------------------------------------------

const RUNTIME_C_COMMON: &str = r#"#include <stdint.h>
#include <stddef.h>
#include <stdlib.h>
#include <string.h>

#ifdef ABIC_DEBUG
#include <stdio.h>
#define ABIC_TRACE(...) fprintf(stderr, "abic: " __VA_ARGS__)
#else
#define ABIC_TRACE(...) ((void)0)
#endif

#define ABIC_EPACK    (-1)
/* distinguished so the boundary wrapper can grow the buffer and retry */
#define ABIC_ENOSPACE (-2)
#define ABIC_ERESIZE  (-3)

typedef enum {
    ABIC_ABSENT = 0,
    ABIC_BOOL,
    ABIC_INT,
    ABIC_UINT,
    ABIC_INT128,
    ABIC_UINT128,
    ABIC_FLOAT,
    ABIC_BYTES,
    ABIC_STR,
    ABIC_LIST,
    ABIC_RECORD
} abic_kind_t;

typedef struct abic_value abic_value_t;

typedef struct {
    char *name;
    abic_value_t *value;
} abic_field_t;

struct abic_value {
    abic_kind_t kind;
    union {
        int b;
        int64_t i;
        uint64_t u;
        struct { uint64_t lo, hi; } w;
        double f;
        struct { uint8_t *data; size_t len; } bytes;
        struct { abic_value_t **items; size_t len, cap; } list;
        struct { abic_field_t *fields; size_t len, cap; } rec;
    } as;
};

void abic_value_free(abic_value_t *v)
{
    if (!v) return;
    switch (v->kind) {
    case ABIC_BYTES:
    case ABIC_STR:
        free(v->as.bytes.data);
        break;
    case ABIC_LIST:
        for (size_t i = 0; i < v->as.list.len; i++)
            abic_value_free(v->as.list.items[i]);
        free(v->as.list.items);
        break;
    case ABIC_RECORD:
        for (size_t i = 0; i < v->as.rec.len; i++) {
            free(v->as.rec.fields[i].name);
            abic_value_free(v->as.rec.fields[i].value);
        }
        free(v->as.rec.fields);
        break;
    default:
        break;
    }
    free(v);
}

static inline abic_value_t *abic_value_new(abic_kind_t kind)
{
    abic_value_t *v = (abic_value_t *)calloc(1, sizeof(abic_value_t));
    if (v) v->kind = kind;
    return v;
}

static inline abic_value_t *abic_value_absent(void) { return abic_value_new(ABIC_ABSENT); }

static inline abic_value_t *abic_value_bool(int b)
{
    abic_value_t *v = abic_value_new(ABIC_BOOL);
    if (v) v->as.b = b ? 1 : 0;
    return v;
}

static inline abic_value_t *abic_value_int(int64_t i)
{
    abic_value_t *v = abic_value_new(ABIC_INT);
    if (v) v->as.i = i;
    return v;
}

static inline abic_value_t *abic_value_uint(uint64_t u)
{
    abic_value_t *v = abic_value_new(ABIC_UINT);
    if (v) v->as.u = u;
    return v;
}

static inline abic_value_t *abic_value_wide(abic_kind_t kind, uint64_t lo, uint64_t hi)
{
    abic_value_t *v = abic_value_new(kind);
    if (v) { v->as.w.lo = lo; v->as.w.hi = hi; }
    return v;
}

static inline abic_value_t *abic_value_float(double f)
{
    abic_value_t *v = abic_value_new(ABIC_FLOAT);
    if (v) v->as.f = f;
    return v;
}

static inline abic_value_t *abic_value_blob(abic_kind_t kind, const uint8_t *data, size_t len)
{
    abic_value_t *v = abic_value_new(kind);
    if (!v) return NULL;
    if (len) {
        v->as.bytes.data = (uint8_t *)malloc(len);
        if (!v->as.bytes.data) { free(v); return NULL; }
        memcpy(v->as.bytes.data, data, len);
    }
    v->as.bytes.len = len;
    return v;
}

static inline abic_value_t *abic_value_str(const char *s)
{
    return abic_value_blob(ABIC_STR, (const uint8_t *)s, strlen(s));
}

static inline abic_value_t *abic_value_list(size_t cap)
{
    abic_value_t *v = abic_value_new(ABIC_LIST);
    if (!v) return NULL;
    if (cap) {
        v->as.list.items = (abic_value_t **)malloc(cap * sizeof(abic_value_t *));
        if (!v->as.list.items) { free(v); return NULL; }
    }
    v->as.list.cap = cap;
    return v;
}

/* takes ownership of item on success only */
static inline int abic_list_push(abic_value_t *list, abic_value_t *item)
{
    if (list->as.list.len == list->as.list.cap) {
        size_t ncap = list->as.list.cap ? list->as.list.cap * 2 : 4;
        abic_value_t **items =
            (abic_value_t **)realloc(list->as.list.items, ncap * sizeof(abic_value_t *));
        if (!items) return -1;
        list->as.list.items = items;
        list->as.list.cap = ncap;
    }
    list->as.list.items[list->as.list.len++] = item;
    return 0;
}

static inline abic_value_t *abic_value_record(size_t cap)
{
    abic_value_t *v = abic_value_new(ABIC_RECORD);
    if (!v) return NULL;
    if (cap) {
        v->as.rec.fields = (abic_field_t *)malloc(cap * sizeof(abic_field_t));
        if (!v->as.rec.fields) { free(v); return NULL; }
    }
    v->as.rec.cap = cap;
    return v;
}

static inline char *abic_strdup_(const char *s)
{
    size_t n = strlen(s) + 1;
    char *p = (char *)malloc(n);
    if (p) memcpy(p, s, n);
    return p;
}

/* takes ownership of value on success only */
static inline int abic_record_push(abic_value_t *rec, const char *name, abic_value_t *value)
{
    if (rec->as.rec.len == rec->as.rec.cap) {
        size_t ncap = rec->as.rec.cap ? rec->as.rec.cap * 2 : 4;
        abic_field_t *fields =
            (abic_field_t *)realloc(rec->as.rec.fields, ncap * sizeof(abic_field_t));
        if (!fields) return -1;
        rec->as.rec.fields = fields;
        rec->as.rec.cap = ncap;
    }
    char *key = abic_strdup_(name);
    if (!key) return -1;
    rec->as.rec.fields[rec->as.rec.len].name = key;
    rec->as.rec.fields[rec->as.rec.len].value = value;
    rec->as.rec.len++;
    return 0;
}

static inline const abic_value_t *abic_record_get(const abic_value_t *rec, const char *name)
{
    if (rec->kind != ABIC_RECORD) return NULL;
    for (size_t i = 0; i < rec->as.rec.len; i++) {
        if (strcmp(rec->as.rec.fields[i].name, name) == 0)
            return rec->as.rec.fields[i].value;
    }
    return NULL;
}

static inline int abic_str_eq(const abic_value_t *v, const char *s)
{
    size_t n = strlen(s);
    return v->kind == ABIC_STR && v->as.bytes.len == n &&
           (n == 0 || memcmp(v->as.bytes.data, s, n) == 0);
}

/* bool, int, float, bytes, str; -1 when the value has no primitive class */
static inline int abic_host_class(const abic_value_t *v)
{
    switch (v->kind) {
    case ABIC_BOOL: return 0;
    case ABIC_INT: case ABIC_UINT: case ABIC_INT128: case ABIC_UINT128: return 1;
    case ABIC_FLOAT: return 2;
    case ABIC_BYTES: return 3;
    case ABIC_STR: return 4;
    default: return -1;
    }
}

/* wraps a decoded variant payload as { type: <case>, value: <payload> };
   takes ownership of payload even on failure */
static inline abic_value_t *abic_variant_record(const char *case_name, abic_value_t *payload)
{
    abic_value_t *rec = abic_value_record(2);
    if (!rec) { abic_value_free(payload); return NULL; }
    abic_value_t *tag = abic_value_str(case_name);
    if (!tag || abic_record_push(rec, "type", tag)) {
        if (tag) abic_value_free(tag);
        abic_value_free(payload);
        abic_value_free(rec);
        return NULL;
    }
    if (abic_record_push(rec, "value", payload)) {
        abic_value_free(payload);
        abic_value_free(rec);
        return NULL;
    }
    return rec;
}

"#;

// ---------------------------------------------------------------------------
// Decode half: bounds-checked readers and the primitive unpack routines.
// ---------------------------------------------------------------------------

const RUNTIME_C_UNPACK: &str = r#"static inline int abic_read_u8(const uint8_t *buf, size_t buf_len, size_t *off, uint8_t *out)
{
    if (*off >= buf_len) return -1;
    *out = buf[(*off)++];
    return 0;
}

static inline int abic_read_exact(const uint8_t *buf, size_t buf_len, size_t *off, size_t n,
                                  const uint8_t **out)
{
    if (*off > buf_len || n > buf_len - *off) return -1;
    *out = buf + *off;
    *off += n;
    return 0;
}

static inline uint16_t abic_read_le16(const uint8_t *p)
{
    uint16_t v;
    memcpy(&v, p, 2);
    return v;
}

static inline uint32_t abic_read_le32(const uint8_t *p)
{
    uint32_t v;
    memcpy(&v, p, 4);
    return v;
}

static inline uint64_t abic_read_le64(const uint8_t *p)
{
    uint64_t v;
    memcpy(&v, p, 8);
    return v;
}

/* LEB128, at most 10 bytes; anything past 64 bits is an error */
static inline int abic_read_varuint32(const uint8_t *buf, size_t buf_len, size_t *off, uint64_t *out)
{
    uint64_t r = 0;
    unsigned shift = 0;
    for (;;) {
        uint8_t b;
        if (abic_read_u8(buf, buf_len, off, &b)) return -1;
        if (shift >= 64 || (shift == 63 && (b & 0x7E) != 0)) return -1;
        r |= (uint64_t)(b & 0x7F) << shift;
        if (!(b & 0x80)) { *out = r; return 0; }
        shift += 7;
    }
}

/* signed LEB128 with bit-6 sign propagation; encodings longer than the
   5 bytes a 32-bit value can need are rejected */
static inline int abic_read_varint32(const uint8_t *buf, size_t buf_len, size_t *off, int32_t *out)
{
    int64_t r = 0;
    unsigned shift = 0;
    for (;;) {
        uint8_t b;
        if (abic_read_u8(buf, buf_len, off, &b)) return -1;
        if (shift >= 35) return -1;
        r |= (int64_t)(b & 0x7F) << shift;
        shift += 7;
        if (!(b & 0x80)) {
            if (b & 0x40) r |= (int64_t)(~UINT64_C(0) << shift);
            if (r < INT32_MIN || r > INT32_MAX) return -1;
            *out = (int32_t)r;
            return 0;
        }
    }
}

static inline int abic_utf8_ok(const uint8_t *s, size_t len)
{
    size_t i = 0;
    while (i < len) {
        uint8_t c = s[i];
        size_t n;
        uint32_t cp;
        if (c < 0x80) { i++; continue; }
        else if ((c & 0xE0) == 0xC0) { n = 1; cp = c & 0x1F; }
        else if ((c & 0xF0) == 0xE0) { n = 2; cp = c & 0x0F; }
        else if ((c & 0xF8) == 0xF0) { n = 3; cp = c & 0x07; }
        else return 0;
        if (i + n >= len) return 0;
        for (size_t k = 1; k <= n; k++) {
            uint8_t cc = s[i + k];
            if ((cc & 0xC0) != 0x80) return 0;
            cp = (cp << 6) | (cc & 0x3F);
        }
        if ((n == 1 && cp < 0x80) || (n == 2 && cp < 0x800) || (n == 3 && cp < 0x10000))
            return 0;
        if (cp > 0x10FFFF || (cp >= 0xD800 && cp <= 0xDFFF)) return 0;
        i += n + 1;
    }
    return 1;
}

abic_value_t *unpack_bool(const uint8_t *buf, size_t buf_len, size_t *off)
{
    uint8_t b;
    if (abic_read_u8(buf, buf_len, off, &b)) return NULL;
    return abic_value_bool(b != 0);
}

abic_value_t *unpack_uint8(const uint8_t *buf, size_t buf_len, size_t *off)
{
    uint8_t b;
    if (abic_read_u8(buf, buf_len, off, &b)) return NULL;
    return abic_value_uint(b);
}

abic_value_t *unpack_uint16(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 2, &p)) return NULL;
    return abic_value_uint(abic_read_le16(p));
}

abic_value_t *unpack_uint32(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 4, &p)) return NULL;
    return abic_value_uint(abic_read_le32(p));
}

abic_value_t *unpack_uint64(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 8, &p)) return NULL;
    return abic_value_uint(abic_read_le64(p));
}

/* 128-bit values travel as two little-endian halves, low half first */
abic_value_t *unpack_uint128(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 16, &p)) return NULL;
    return abic_value_wide(ABIC_UINT128, abic_read_le64(p), abic_read_le64(p + 8));
}

abic_value_t *unpack_int8(const uint8_t *buf, size_t buf_len, size_t *off)
{
    uint8_t b;
    if (abic_read_u8(buf, buf_len, off, &b)) return NULL;
    return abic_value_int((int8_t)b);
}

abic_value_t *unpack_int16(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 2, &p)) return NULL;
    return abic_value_int((int16_t)abic_read_le16(p));
}

abic_value_t *unpack_int32(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 4, &p)) return NULL;
    return abic_value_int((int32_t)abic_read_le32(p));
}

abic_value_t *unpack_int64(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 8, &p)) return NULL;
    return abic_value_int((int64_t)abic_read_le64(p));
}

abic_value_t *unpack_int128(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, 16, &p)) return NULL;
    return abic_value_wide(ABIC_INT128, abic_read_le64(p), abic_read_le64(p + 8));
}

abic_value_t *unpack_varuint32(const uint8_t *buf, size_t buf_len, size_t *off)
{
    uint64_t v;
    if (abic_read_varuint32(buf, buf_len, off, &v)) return NULL;
    return abic_value_uint(v);
}

abic_value_t *unpack_varint32(const uint8_t *buf, size_t buf_len, size_t *off)
{
    int32_t v;
    if (abic_read_varint32(buf, buf_len, off, &v)) return NULL;
    return abic_value_int(v);
}

abic_value_t *unpack_float32(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    float f;
    if (abic_read_exact(buf, buf_len, off, 4, &p)) return NULL;
    memcpy(&f, p, 4);
    return abic_value_float((double)f);
}

abic_value_t *unpack_float64(const uint8_t *buf, size_t buf_len, size_t *off)
{
    const uint8_t *p;
    double d;
    if (abic_read_exact(buf, buf_len, off, 8, &p)) return NULL;
    memcpy(&d, p, 8);
    return abic_value_float(d);
}

static abic_value_t *unpack_raw(const uint8_t *buf, size_t buf_len, size_t *off, size_t len)
{
    const uint8_t *p;
    if (abic_read_exact(buf, buf_len, off, len, &p)) return NULL;
    return abic_value_blob(ABIC_BYTES, p, len);
}

abic_value_t *unpack_bytes(const uint8_t *buf, size_t buf_len, size_t *off)
{
    uint64_t len;
    const uint8_t *p;
    if (abic_read_varuint32(buf, buf_len, off, &len)) return NULL;
    if (len > buf_len - *off) return NULL;
    if (abic_read_exact(buf, buf_len, off, (size_t)len, &p)) return NULL;
    return abic_value_blob(ABIC_BYTES, p, (size_t)len);
}

abic_value_t *unpack_string(const uint8_t *buf, size_t buf_len, size_t *off)
{
    uint64_t len;
    const uint8_t *p;
    if (abic_read_varuint32(buf, buf_len, off, &len)) return NULL;
    if (len > buf_len - *off) return NULL;
    if (abic_read_exact(buf, buf_len, off, (size_t)len, &p)) return NULL;
    if (!abic_utf8_ok(p, (size_t)len)) return NULL;
    return abic_value_blob(ABIC_STR, p, (size_t)len);
}

"#;

// ---------------------------------------------------------------------------
// Encode half: capacity-checked writers and the primitive pack routines.
// ---------------------------------------------------------------------------

const RUNTIME_C_PACK: &str = r#"static inline ptrdiff_t abic_write_u8(uint8_t *out, size_t cap, uint8_t b)
{
    if (cap < 1) return ABIC_ENOSPACE;
    out[0] = b;
    return 1;
}

static inline ptrdiff_t abic_write_exact(uint8_t *out, size_t cap, const uint8_t *data, size_t n)
{
    if (cap < n) return ABIC_ENOSPACE;
    if (n) memcpy(out, data, n);
    return (ptrdiff_t)n;
}

static inline ptrdiff_t abic_write_varuint32(uint8_t *out, size_t cap, uint64_t val)
{
    size_t i = 0;
    do {
        uint8_t b = val & 0x7F;
        val >>= 7;
        if (val) b |= 0x80;
        if (i >= cap) return ABIC_ENOSPACE;
        out[i++] = b;
    } while (val);
    return (ptrdiff_t)i;
}

static inline ptrdiff_t abic_write_varint32(uint8_t *out, size_t cap, int64_t val)
{
    size_t i = 0;
    int more = 1;
    while (more) {
        uint8_t b = val & 0x7F;
        int sign_bit = (b & 0x40) != 0;
        val >>= 7;
        if ((val == 0 && !sign_bit) || (val == -1 && sign_bit))
            more = 0;
        else
            b |= 0x80;
        if (i >= cap) return ABIC_ENOSPACE;
        out[i++] = b;
    }
    return (ptrdiff_t)i;
}

static inline ptrdiff_t abic_write_le(uint8_t *out, size_t cap, uint64_t val, size_t n)
{
    if (cap < n) return ABIC_ENOSPACE;
    for (size_t i = 0; i < n; i++)
        out[i] = (uint8_t)(val >> (8 * i));
    return (ptrdiff_t)n;
}

static inline int abic_get_u64(const abic_value_t *v, uint64_t max, uint64_t *out)
{
    if (v->kind == ABIC_UINT) {
        if (v->as.u > max) return -1;
        *out = v->as.u;
        return 0;
    }
    if (v->kind == ABIC_INT) {
        if (v->as.i < 0 || (uint64_t)v->as.i > max) return -1;
        *out = (uint64_t)v->as.i;
        return 0;
    }
    return -1;
}

static inline int abic_get_i64(const abic_value_t *v, int64_t min, int64_t max, int64_t *out)
{
    if (v->kind == ABIC_INT) {
        if (v->as.i < min || v->as.i > max) return -1;
        *out = v->as.i;
        return 0;
    }
    if (v->kind == ABIC_UINT) {
        if (max >= 0 && v->as.u > (uint64_t)max) return -1;
        *out = (int64_t)v->as.u;
        return 0;
    }
    return -1;
}

/* halves of a 128-bit value; narrow kinds widen, signs must agree */
static int abic_get_halves(const abic_value_t *v, int want_signed, uint64_t *lo, uint64_t *hi)
{
    switch (v->kind) {
    case ABIC_UINT128:
        if (want_signed && (v->as.w.hi >> 63)) return -1;
        *lo = v->as.w.lo; *hi = v->as.w.hi;
        return 0;
    case ABIC_INT128:
        if (!want_signed && (v->as.w.hi >> 63)) return -1;
        *lo = v->as.w.lo; *hi = v->as.w.hi;
        return 0;
    case ABIC_UINT:
        *lo = v->as.u; *hi = 0;
        return 0;
    case ABIC_INT:
        if (!want_signed && v->as.i < 0) return -1;
        *lo = (uint64_t)v->as.i;
        *hi = v->as.i < 0 ? ~UINT64_C(0) : 0;
        return 0;
    default:
        return -1;
    }
}

ptrdiff_t pack_bool(const abic_value_t *v, uint8_t *out, size_t cap)
{
    if (v->kind != ABIC_BOOL) return ABIC_EPACK;
    return abic_write_u8(out, cap, v->as.b ? 1 : 0);
}

ptrdiff_t pack_uint8(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t val;
    if (abic_get_u64(v, UINT8_MAX, &val)) return ABIC_EPACK;
    return abic_write_u8(out, cap, (uint8_t)val);
}

ptrdiff_t pack_uint16(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t val;
    if (abic_get_u64(v, UINT16_MAX, &val)) return ABIC_EPACK;
    return abic_write_le(out, cap, val, 2);
}

ptrdiff_t pack_uint32(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t val;
    if (abic_get_u64(v, UINT32_MAX, &val)) return ABIC_EPACK;
    return abic_write_le(out, cap, val, 4);
}

ptrdiff_t pack_uint64(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t val;
    if (abic_get_u64(v, UINT64_MAX, &val)) return ABIC_EPACK;
    return abic_write_le(out, cap, val, 8);
}

ptrdiff_t pack_uint128(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t lo, hi;
    if (abic_get_halves(v, 0, &lo, &hi)) return ABIC_EPACK;
    if (cap < 16) return ABIC_ENOSPACE;
    abic_write_le(out, 8, lo, 8);
    abic_write_le(out + 8, 8, hi, 8);
    return 16;
}

ptrdiff_t pack_int8(const abic_value_t *v, uint8_t *out, size_t cap)
{
    int64_t val;
    if (abic_get_i64(v, INT8_MIN, INT8_MAX, &val)) return ABIC_EPACK;
    return abic_write_u8(out, cap, (uint8_t)(int8_t)val);
}

ptrdiff_t pack_int16(const abic_value_t *v, uint8_t *out, size_t cap)
{
    int64_t val;
    if (abic_get_i64(v, INT16_MIN, INT16_MAX, &val)) return ABIC_EPACK;
    return abic_write_le(out, cap, (uint64_t)(uint16_t)(int16_t)val, 2);
}

ptrdiff_t pack_int32(const abic_value_t *v, uint8_t *out, size_t cap)
{
    int64_t val;
    if (abic_get_i64(v, INT32_MIN, INT32_MAX, &val)) return ABIC_EPACK;
    return abic_write_le(out, cap, (uint64_t)(uint32_t)(int32_t)val, 4);
}

ptrdiff_t pack_int64(const abic_value_t *v, uint8_t *out, size_t cap)
{
    int64_t val;
    if (abic_get_i64(v, INT64_MIN, INT64_MAX, &val)) return ABIC_EPACK;
    return abic_write_le(out, cap, (uint64_t)val, 8);
}

ptrdiff_t pack_int128(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t lo, hi;
    if (abic_get_halves(v, 1, &lo, &hi)) return ABIC_EPACK;
    if (cap < 16) return ABIC_ENOSPACE;
    abic_write_le(out, 8, lo, 8);
    abic_write_le(out + 8, 8, hi, 8);
    return 16;
}

ptrdiff_t pack_varuint32(const abic_value_t *v, uint8_t *out, size_t cap)
{
    uint64_t val;
    if (abic_get_u64(v, UINT64_MAX, &val)) return ABIC_EPACK;
    return abic_write_varuint32(out, cap, val);
}

ptrdiff_t pack_varint32(const abic_value_t *v, uint8_t *out, size_t cap)
{
    int64_t val;
    if (abic_get_i64(v, INT32_MIN, INT32_MAX, &val)) return ABIC_EPACK;
    return abic_write_varint32(out, cap, val);
}

ptrdiff_t pack_float32(const abic_value_t *v, uint8_t *out, size_t cap)
{
    float f;
    if (v->kind != ABIC_FLOAT) return ABIC_EPACK;
    if (cap < 4) return ABIC_ENOSPACE;
    f = (float)v->as.f;
    memcpy(out, &f, 4);
    return 4;
}

ptrdiff_t pack_float64(const abic_value_t *v, uint8_t *out, size_t cap)
{
    if (v->kind != ABIC_FLOAT) return ABIC_EPACK;
    if (cap < 8) return ABIC_ENOSPACE;
    memcpy(out, &v->as.f, 8);
    return 8;
}

static ptrdiff_t pack_raw(const abic_value_t *v, size_t len, uint8_t *out, size_t cap)
{
    if (v->kind != ABIC_BYTES || v->as.bytes.len != len) return ABIC_EPACK;
    return abic_write_exact(out, cap, v->as.bytes.data, len);
}

ptrdiff_t pack_bytes(const abic_value_t *v, uint8_t *out, size_t cap)
{
    ptrdiff_t n, m;
    if (v->kind != ABIC_BYTES) return ABIC_EPACK;
    n = abic_write_varuint32(out, cap, (uint64_t)v->as.bytes.len);
    if (n < 0) return n;
    m = abic_write_exact(out + n, cap - (size_t)n, v->as.bytes.data, v->as.bytes.len);
    if (m < 0) return m;
    return n + m;
}

ptrdiff_t pack_string(const abic_value_t *v, uint8_t *out, size_t cap)
{
    ptrdiff_t n, m;
    if (v->kind != ABIC_STR) return ABIC_EPACK;
    n = abic_write_varuint32(out, cap, (uint64_t)v->as.bytes.len);
    if (n < 0) return n;
    m = abic_write_exact(out + n, cap - (size_t)n, v->as.bytes.data, v->as.bytes.len);
    if (m < 0) return m;
    return n + m;
}

"#;

// ---------------------------------------------------------------------------
// Module entry points around the dispatch table.
// ---------------------------------------------------------------------------

const DISPATCH_LOOKUP_C: &str = r#"static const abic_entry_t *abic_lookup(const char *name, size_t name_len)
{
    size_t count = sizeof(abic_table) / sizeof(abic_table[0]);
    for (size_t i = 0; i < count; i++) {
        if (strlen(abic_table[i].name) == name_len &&
            memcmp(abic_table[i].name, name, name_len) == 0)
            return &abic_table[i];
    }
    return NULL;
}

/* recognises one trailing "[]" on a type name */
static const abic_entry_t *abic_find(const char *type_name, int *is_array)
{
    size_t len = strlen(type_name);
    *is_array = 0;
    if (len > 2 && type_name[len - 2] == '[' && type_name[len - 1] == ']') {
        *is_array = 1;
        len -= 2;
    }
    return abic_lookup(type_name, len);
}

"#;

const DISPATCH_UNPACK_C: &str = r#"abic_value_t *abic_unpack(const char *type_name, const uint8_t *buf, size_t buf_len,
                          size_t *consumed)
{
    int is_array;
    size_t off = 0;
    abic_value_t *result;
    const abic_entry_t *entry = abic_find(type_name, &is_array);
    if (!entry) {
        ABIC_TRACE("unknown type %s\n", type_name);
        return NULL;
    }
    if (is_array) {
        uint64_t count;
        if (abic_read_varuint32(buf, buf_len, &off, &count)) return NULL;
        result = abic_value_list(count < 4096 ? (size_t)count : 4096);
        if (!result) return NULL;
        for (uint64_t i = 0; i < count; i++) {
            abic_value_t *item = entry->unpack(buf, buf_len, &off);
            if (!item || abic_list_push(result, item)) {
                if (item) abic_value_free(item);
                abic_value_free(result);
                return NULL;
            }
        }
    } else {
        result = entry->unpack(buf, buf_len, &off);
        if (!result) return NULL;
    }
    if (consumed) *consumed = off;
    return result;
}

"#;

const DISPATCH_PACK_C: &str = r#"static ptrdiff_t abic_pack_once(const abic_entry_t *entry, int is_array,
                                const abic_value_t *value, uint8_t *buf, size_t cap)
{
    if (!is_array) return entry->pack(value, buf, cap);
    if (value->kind != ABIC_LIST) return ABIC_EPACK;
    ptrdiff_t n = abic_write_varuint32(buf, cap, (uint64_t)value->as.list.len);
    if (n < 0) return n;
    size_t off = (size_t)n;
    for (size_t i = 0; i < value->as.list.len; i++) {
        n = entry->pack(value->as.list.items[i], buf + off, cap - off);
        if (n < 0) return n;
        off += (size_t)n;
    }
    return (ptrdiff_t)off;
}

/* on success *out is a malloc'd buffer owned by the caller; the capacity
   doubles on ABIC_ENOSPACE for a bounded number of retries */
ptrdiff_t abic_pack(const char *type_name, const abic_value_t *value, uint8_t **out)
{
    int is_array;
    const abic_entry_t *entry = abic_find(type_name, &is_array);
    if (!entry) {
        ABIC_TRACE("unknown type %s\n", type_name);
        return ABIC_EPACK;
    }
    size_t cap = ABIC_PACK_INITIAL_CAP;
    for (int attempt = 0; attempt <= ABIC_PACK_MAX_ATTEMPTS; attempt++) {
        uint8_t *buf = (uint8_t *)malloc(cap);
        if (!buf) return ABIC_EPACK;
        ptrdiff_t n = abic_pack_once(entry, is_array, value, buf, cap);
        if (n >= 0) {
            *out = buf;
            return n;
        }
        free(buf);
        if (n != ABIC_ENOSPACE) return n;
        cap <<= 1;
    }
    ABIC_TRACE("exceeded maximum resize attempts for %s\n", type_name);
    return ABIC_ERESIZE;
}

"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiDef, AbiView};
    use crate::compile::{c_source_from_abi, CodegenOptions};

    fn source(json: &str, options: &CodegenOptions) -> String {
        let def = AbiDef::from_str(json).expect("test abi must parse");
        c_source_from_abi("testmod", &AbiView::new(&def), options)
            .expect("codegen must succeed")
            .c_src
    }

    const ABI: &str = r#"{
        "structs": [
            {"name": "inner", "fields": [{"name": "xs", "type": "uint8?[]"}]},
            {"name": "outer", "base": "inner", "fields": [
                {"name": "tail", "type": "string$"}
            ]}
        ],
        "variants": [{"name": "which", "types": ["uint32", "string"]}]
    }"#;

    #[test]
    fn emission_is_deterministic() {
        let opts = CodegenOptions::default();
        assert_eq!(source(ABI, &opts), source(ABI, &opts));
    }

    #[test]
    fn forward_declares_every_named_type() {
        let src = source(ABI, &CodegenOptions::default());
        for decl in [
            "abic_value_t *unpack_outer(const uint8_t *buf, size_t buf_len, size_t *off);",
            "ptrdiff_t pack_outer(const abic_value_t *v, uint8_t *out, size_t cap);",
            "abic_value_t *unpack_which(const uint8_t *buf, size_t buf_len, size_t *off);",
            "ptrdiff_t pack_name(const abic_value_t *v, uint8_t *out, size_t cap);",
        ] {
            assert!(src.contains(decl), "missing declaration: {decl}");
        }
    }

    #[test]
    fn nested_modifier_chain_gets_one_helper_per_layer() {
        let src = source(ABI, &CodegenOptions::default());
        assert!(src.contains("unpack_inner__xs_0"));
        assert!(src.contains("unpack_inner__xs_1"));
        assert!(!src.contains("unpack_inner__xs_2"));
        assert!(src.contains("pack_inner__xs_0"));
        assert!(src.contains("pack_inner__xs_1"));
    }

    #[test]
    fn base_struct_is_unpacked_first() {
        let src = source(ABI, &CodegenOptions::default());
        assert!(src.contains("abic_value_t *rec = unpack_inner(buf, buf_len, off);"));
        assert!(src.contains("n = pack_inner(v, out, cap);"));
    }

    #[test]
    fn variant_gets_classification_table() {
        let src = source(ABI, &CodegenOptions::default());
        // int -> case 0 (uint32), str -> case 1 (string), rest unclassifiable
        assert!(src.contains("static const int32_t abic_v_which_class[5] = { -1, 0, -1, -1, 1 };"));
        assert!(src.contains("abic_str_eq(name, \"uint32\")"));
    }

    #[test]
    fn unpack_only_module_has_no_pack_code() {
        let opts = CodegenOptions {
            with_pack: false,
            with_unpack: true,
            debug: false,
        };
        let src = source(ABI, &opts);
        assert!(!src.contains("ptrdiff_t pack_outer"));
        assert!(!src.contains("abic_write_varuint32"));
        assert!(src.contains("{ \"outer\", unpack_outer, NULL },"));
        assert!(!src.contains("abic_pack(const char *type_name"));
    }

    #[test]
    fn pack_only_module_has_no_unpack_code() {
        let opts = CodegenOptions {
            with_pack: true,
            with_unpack: false,
            debug: false,
        };
        let src = source(ABI, &opts);
        assert!(!src.contains("abic_value_t *unpack_outer"));
        assert!(!src.contains("abic_read_varuint32"));
        assert!(src.contains("{ \"outer\", NULL, pack_outer },"));
    }

    #[test]
    fn debug_flag_enables_traces() {
        let opts = CodegenOptions {
            debug: true,
            ..CodegenOptions::default()
        };
        let src = source(ABI, &opts);
        assert!(src.starts_with("/* testmod: ABI codec module (abi "));
        assert!(src.contains("#define ABIC_DEBUG 1"));
    }

    #[test]
    fn dispatch_table_covers_primitives_and_builtins() {
        let src = source("{}", &CodegenOptions::default());
        for entry in [
            "{ \"uint32\", unpack_uint32, pack_uint32 },",
            "{ \"string\", unpack_string, pack_string },",
            "{ \"asset\", unpack_asset, pack_asset },",
            "{ \"signature\", unpack_signature, pack_signature },",
        ] {
            assert!(src.contains(entry), "missing table entry: {entry}");
        }
    }
}
