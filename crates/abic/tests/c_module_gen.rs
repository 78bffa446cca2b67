use abic::abi::{AbiDef, AbiView};
use abic::cache::{CacheKey, ModuleParams, SourceCache};
use abic::compile::{c_source_from_abi, CodegenOptions};
use abic::fingerprint::hash_abi_view;
use abic::toolchain;

const TEST_ABI: &str = include_str!("abis/test_abi.json");
const TOKEN_ABI: &str = include_str!("abis/token.json");

fn view(json: &str) -> AbiView {
    AbiView::new(&AbiDef::from_str(json).expect("fixture ABI must parse"))
}

#[test]
fn generates_routines_for_every_named_type() {
    let abi = view(TEST_ABI);
    let out = c_source_from_abi("test_abi", &abi, &CodegenOptions::default()).unwrap();
    assert_eq!(out.abi_hash, hash_abi_view(&abi));

    for needle in [
        // user structs, variants and aliases
        "abic_value_t *unpack_transaction(const uint8_t *buf, size_t buf_len, size_t *off) {",
        "ptrdiff_t pack_transaction(const abic_value_t *v, uint8_t *out, size_t cap) {",
        "abic_value_t *unpack_which(",
        "ptrdiff_t pack_poly(",
        "abic_value_t *unpack_blob(",
        // built-ins ship with every module
        "ptrdiff_t pack_asset(",
        "abic_value_t *unpack_extended_asset(",
        "ptrdiff_t pack_checksum256(",
        // dispatch table and module entry points
        "{ \"transaction\", unpack_transaction, pack_transaction },",
        "{ \"which\", unpack_which, pack_which },",
        "{ \"blob_list\", unpack_blob_list, pack_blob_list },",
        "abic_value_t *abic_unpack(const char *type_name,",
        "ptrdiff_t abic_pack(const char *type_name,",
    ] {
        assert!(out.c_src.contains(needle), "missing: {needle}");
    }
}

#[test]
fn generation_is_byte_identical_per_abi() {
    let opts = CodegenOptions::default();
    let a = c_source_from_abi("m", &view(TEST_ABI), &opts).unwrap();
    let b = c_source_from_abi("m", &view(TEST_ABI), &opts).unwrap();
    assert_eq!(a.c_src, b.c_src);
    assert_eq!(a.abi_hash, b.abi_hash);

    let c = c_source_from_abi("m", &view(TOKEN_ABI), &opts).unwrap();
    assert_ne!(a.c_src, c.c_src);
    assert_ne!(a.abi_hash, c.abi_hash);
}

#[test]
fn module_header_names_module_and_hash() {
    let abi = view(TOKEN_ABI);
    let out = c_source_from_abi("token", &abi, &CodegenOptions::default()).unwrap();
    let first_line = out.c_src.lines().next().unwrap();
    assert_eq!(
        first_line,
        format!("/* token: ABI codec module (abi {}) */", out.abi_hash)
    );
    assert!(out
        .c_src
        .contains("const char *abic_module_name(void) { return \"token\"; }"));
}

#[test]
fn source_cache_stores_generated_modules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cache = SourceCache::new(dir.path()).unwrap();

    let abi = view(TOKEN_ABI);
    let out = c_source_from_abi("token", &abi, &CodegenOptions::default()).unwrap();
    let key = CacheKey {
        mod_name: "token".to_string(),
        abi_hash: out.abi_hash.clone(),
        params: ModuleParams::default(),
    };

    assert_eq!(cache.get_source(&key), None);
    cache.set_source(&key, &out.c_src).unwrap();
    assert_eq!(cache.get_source(&key).as_deref(), Some(out.c_src.as_str()));
    assert!(cache.entry_dir(&key).join("token.c").is_file());
    assert!(cache.entry_dir(&key).join("params.json").is_file());
}

#[test]
fn generated_modules_compile_when_a_compiler_is_present() {
    if toolchain::detect_cc().is_none() {
        eprintln!("skipping: no working C compiler on PATH");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");

    for (name, opts) in [
        ("full", CodegenOptions::default()),
        (
            "decode_only",
            CodegenOptions {
                with_pack: false,
                with_unpack: true,
                debug: false,
            },
        ),
        (
            "encode_only",
            CodegenOptions {
                with_pack: true,
                with_unpack: false,
                debug: false,
            },
        ),
        (
            "traced",
            CodegenOptions {
                debug: true,
                ..CodegenOptions::default()
            },
        ),
    ] {
        let out = c_source_from_abi(name, &view(TEST_ABI), &opts).unwrap();
        let so = toolchain::compile_module(name, &out.c_src, dir.path())
            .unwrap_or_else(|e| panic!("module {name} failed to compile: {e:#}"));
        assert!(so.is_file(), "missing artifact for {name}");
    }
}
