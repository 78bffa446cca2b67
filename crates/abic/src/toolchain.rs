use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

// C toolchain boundary: find a working compiler and turn a generated module
// into a loadable shared object. $CC wins when set, then the usual names.

pub fn detect_cc() -> Option<PathBuf> {
    let mut candidates: Vec<String> = Vec::new();
    if let Ok(cc) = std::env::var("CC") {
        // the env var may carry flags after the program
        if let Some(first) = cc.split_whitespace().next() {
            candidates.push(first.to_string());
        }
    }
    for name in ["cc", "gcc", "clang"] {
        candidates.push(name.to_string());
    }

    for cand in candidates {
        let ok = Command::new(&cand)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        if ok {
            debug!(cc = %cand, "detected working C compiler");
            return Some(PathBuf::from(cand));
        }
    }
    None
}

pub fn compile_module(mod_name: &str, source: &str, build_dir: &Path) -> Result<PathBuf> {
    let cc = detect_cc().context("no working C compiler found; set CC")?;

    std::fs::create_dir_all(build_dir)
        .with_context(|| format!("create build dir: {}", build_dir.display()))?;
    let c_path = build_dir.join(format!("{mod_name}.c"));
    std::fs::write(&c_path, source)
        .with_context(|| format!("write C source: {}", c_path.display()))?;
    let so_path = build_dir.join(format!("{mod_name}.so"));

    let mut cmd = Command::new(&cc);
    cmd.arg("-std=c11")
        .arg("-O2")
        .arg("-fPIC")
        .arg("-shared")
        .arg(&c_path)
        .arg("-o")
        .arg(&so_path);

    let out = cmd
        .output()
        .with_context(|| format!("invoke cc: {}", cc.display()))?;
    if !out.status.success() {
        bail!(
            "cc failed for module {mod_name}:\n{}",
            String::from_utf8_lossy(&out.stderr)
        );
    }

    info!(module = mod_name, artifact = %so_path.display(), "compiled codec module");
    Ok(so_path)
}
