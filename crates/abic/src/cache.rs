use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// Filesystem cache for generated C sources and their compiled artifacts.
// Entries live under <root>/<module>/<abi_hash>/ with the source, a
// params.json sidecar, and (after compilation) the shared object. An
// in-memory mirror avoids re-reading sources within a process.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleParams {
    pub debug: bool,
    pub with_pack: bool,
    pub with_unpack: bool,
}

impl Default for ModuleParams {
    fn default() -> Self {
        Self {
            debug: false,
            with_pack: true,
            with_unpack: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheKey {
    pub mod_name: String,
    pub abi_hash: String,
    pub params: ModuleParams,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (hash {})", self.mod_name, self.abi_hash)
    }
}

pub struct SourceCache {
    root: PathBuf,
    mem: BTreeMap<CacheKey, String>,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!(root = %root.display(), "using codegen cache directory");
        Ok(Self {
            root,
            mem: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.mod_name).join(&key.abi_hash)
    }

    fn source_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_dir(key).join(format!("{}.c", key.mod_name))
    }

    fn params_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_dir(key).join("params.json")
    }

    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.entry_dir(key).join(format!("{}.so", key.mod_name))
    }

    pub fn get_source(&mut self, key: &CacheKey) -> Option<String> {
        if let Some(src) = self.mem.get(key) {
            debug!(%key, "returning in-memory source");
            return Some(src.clone());
        }

        let params_path = self.params_path(key);
        let params: ModuleParams = match std::fs::read_to_string(&params_path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(p) => p,
                Err(e) => {
                    warn!(%key, error = %e, "malformed params file, skipping cache entry");
                    return None;
                }
            },
            Err(_) => return None,
        };
        if params != key.params {
            debug!(%key, "cached entry built with different params");
            return None;
        }

        match std::fs::read_to_string(self.source_path(key)) {
            Ok(source) => {
                debug!(%key, "loaded source from disk");
                self.mem.insert(key.clone(), source.clone());
                Some(source)
            }
            Err(_) => None,
        }
    }

    pub fn set_source(&mut self, key: &CacheKey, source: &str) -> io::Result<()> {
        debug!(%key, "storing generated source");
        let dir = self.entry_dir(key);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(self.source_path(key), source)?;
        let params =
            serde_json::to_string_pretty(&key.params).expect("params serialization is infallible");
        std::fs::write(self.params_path(key), params)?;
        self.mem.insert(key.clone(), source.to_string());
        Ok(())
    }
}
