// Syntax checks for names that end up spliced into generated C. Everything
// that reaches the emitter must pass through here first, otherwise a hostile
// ABI could inject arbitrary source text.

pub fn validate_ident(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("identifier must be non-empty".to_string());
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!(
            "invalid identifier start (must be [A-Za-z_]): {name:?}"
        ));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid identifier char (allowed [A-Za-z0-9_]): {name:?}"
            ));
        }
    }
    Ok(())
}

pub fn validate_module_name(name: &str) -> Result<(), String> {
    validate_ident(name)
}

// Accepts a bare identifier, a raw(N) form, or either followed by any run of
// the `[]` / `?` / `$` modifier suffixes.
pub fn validate_type_expr(expr: &str) -> Result<(), String> {
    let mut stem = expr;
    loop {
        if let Some(rest) = stem.strip_suffix("[]") {
            stem = rest;
        } else if let Some(rest) = stem.strip_suffix('?') {
            stem = rest;
        } else if let Some(rest) = stem.strip_suffix('$') {
            stem = rest;
        } else {
            break;
        }
    }
    if let Some(n) = raw_len_of(stem) {
        if n == 0 {
            return Err(format!("raw length must be non-zero: {expr:?}"));
        }
        return Ok(());
    }
    validate_ident(stem).map_err(|e| format!("invalid type expression {expr:?}: {e}"))
}

// `raw(N)` with a decimal N. `raw` without a length is not a usable type on
// its own; callers that allow it handle that case themselves.
pub fn raw_len_of(stem: &str) -> Option<u32> {
    let inner = stem.strip_prefix("raw(")?.strip_suffix(')')?;
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    inner.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_rules() {
        assert!(validate_ident("transaction_header").is_ok());
        assert!(validate_ident("_reserved").is_ok());
        assert!(validate_ident("9lives").is_err());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("bad-dash").is_err());
        assert!(validate_ident("evil();//").is_err());
    }

    #[test]
    fn type_expr_rules() {
        assert!(validate_type_expr("uint32").is_ok());
        assert!(validate_type_expr("my_struct[]").is_ok());
        assert!(validate_type_expr("bytes?").is_ok());
        assert!(validate_type_expr("name$").is_ok());
        assert!(validate_type_expr("uint8?[]$").is_ok());
        assert!(validate_type_expr("raw(32)").is_ok());
        assert!(validate_type_expr("raw(32)[]").is_ok());
        assert!(validate_type_expr("raw()").is_err());
        assert!(validate_type_expr("raw(x)").is_err());
        assert!(validate_type_expr("int32; system(\"rm\")").is_err());
    }

    #[test]
    fn raw_len_parsing() {
        assert_eq!(raw_len_of("raw(16)"), Some(16));
        assert_eq!(raw_len_of("raw(66)"), Some(66));
        assert_eq!(raw_len_of("raw"), None);
        assert_eq!(raw_len_of("raw(1 6)"), None);
    }
}
