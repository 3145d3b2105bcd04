//! Path resolution and filesystem capabilities.
//!
//! The core never touches the filesystem directly: it goes through the
//! [`FileSystem`] trait so tests can run against an in-memory tree. Path
//! resolution classifies every import specifier into a module kind and
//! produces the canonical key the environment tracks the module under.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// `.hql` source compiled through the full pipeline.
    LocalSource,
    /// Target-language module loaded as an opaque shim.
    LocalJs,
    /// Typed target module, transpiled by host tooling; a shim here.
    LocalTs,
    /// `npm:`, `jsr:` or http(s) module.
    Remote,
    /// `@hql/...` embedded stdlib.
    Stdlib,
}

impl ModuleKind {
    /// Shim modules have unknown exports; missing names defer instead of
    /// erroring.
    pub fn is_shim(self) -> bool {
        matches!(self, ModuleKind::LocalJs | ModuleKind::LocalTs | ModuleKind::Remote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub kind: ModuleKind,
    /// Canonical key: normalized path for local modules, the specifier for
    /// remote and stdlib modules.
    pub key: String,
}

#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    pub base_dir: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    pub fn resolve(&self, spec: &str, importing_file: Option<&str>) -> ResolvedModule {
        if spec.starts_with("http://")
            || spec.starts_with("https://")
            || spec.starts_with("npm:")
            || spec.starts_with("jsr:")
        {
            return ResolvedModule {
                kind: ModuleKind::Remote,
                key: spec.to_string(),
            };
        }
        if spec.starts_with("@hql/") {
            return ResolvedModule {
                kind: ModuleKind::Stdlib,
                key: spec.trim_end_matches(".hql").to_string(),
            };
        }

        let mut path = if spec.starts_with('/') {
            PathBuf::from(spec)
        } else {
            let base = importing_file
                .map(|f| {
                    Path::new(f)
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default()
                })
                .or_else(|| self.base_dir.clone())
                .unwrap_or_default();
            base.join(spec)
        };

        if path.extension().is_none() {
            path.set_extension("hql");
        }
        let kind = match path.extension().and_then(|e| e.to_str()) {
            Some("js") | Some("mjs") => ModuleKind::LocalJs,
            Some("ts") => ModuleKind::LocalTs,
            _ => ModuleKind::LocalSource,
        };
        ResolvedModule {
            kind,
            key: normalize(&path),
        }
    }
}

// Lexical normalization: resolves `.` and `..` without touching the disk,
// so in-memory filesystems resolve the same way the real one does.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().map(|p| p != "..").unwrap_or(false) {
                    parts.pop();
                } else if !absolute {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::Prefix(prefix) => parts.push(prefix.as_os_str().to_string_lossy().into_owned()),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

// ============================================================================
// FILESYSTEM CAPABILITY
// ============================================================================

pub trait FileSystem {
    fn read_to_string(&self, path: &str) -> io::Result<String>;
    fn exists(&self, path: &str) -> bool;
}

/// The real filesystem.
#[derive(Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_to_string(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

/// In-memory tree for tests.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: HashMap<String, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &str) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_specifiers() {
        let resolver = PathResolver::default();
        assert_eq!(
            resolver.resolve("npm:chalk", None).kind,
            ModuleKind::Remote
        );
        assert_eq!(
            resolver.resolve("@hql/core", None).kind,
            ModuleKind::Stdlib
        );
        assert_eq!(
            resolver.resolve("./m.js", None).kind,
            ModuleKind::LocalJs
        );
        assert_eq!(
            resolver.resolve("./m.ts", None).kind,
            ModuleKind::LocalTs
        );
        assert_eq!(
            resolver.resolve("./m.hql", None).kind,
            ModuleKind::LocalSource
        );
    }

    #[test]
    fn resolves_relative_to_importer() {
        let resolver = PathResolver::default();
        let resolved = resolver.resolve("./sibling.hql", Some("src/app/main.hql"));
        assert_eq!(resolved.key, "src/app/sibling.hql");
        let resolved = resolver.resolve("../lib/util.hql", Some("src/app/main.hql"));
        assert_eq!(resolved.key, "src/lib/util.hql");
    }

    #[test]
    fn missing_extension_defaults_to_source() {
        let resolver = PathResolver::default();
        let resolved = resolver.resolve("./util", Some("a/main.hql"));
        assert_eq!(resolved.key, "a/util.hql");
        assert_eq!(resolved.kind, ModuleKind::LocalSource);
    }
}
