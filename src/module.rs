//! Lookup of imported module source text.

use crate::errors::{JsltError, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Maps an import name to JSLT source text.
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<String>;
}

/// Resolves import names as paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for DirectoryResolver {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ModuleResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Result<String> {
        let relative = Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !relative {
            return Err(JsltError::compile(
                format!("module '{name}' must be a relative path inside {}", self.root.display()),
                None,
            ));
        }
        let path = self.root.join(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(JsltError::compile(
                format!("module '{name}' not found in {}", self.root.display()),
                None,
            )),
            Err(e) => Err(JsltError::resource(format!("can't read module '{}'", path.display()), e)),
        }
    }
}

/// In-memory resolver keyed by import name.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    sources: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl ModuleResolver for MapResolver {
    fn resolve(&self, name: &str) -> Result<String> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| JsltError::compile(format!("module '{name}' not found"), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn map_lookup() {
        let r = MapResolver::new().with("a.jslt", "def f() 1");
        assert_eq!(r.resolve("a.jslt").unwrap(), "def f() 1");
        let err = r.resolve("b.jslt").unwrap_err();
        assert!(matches!(err, JsltError::Compile { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_a_compile_error() {
        let r = DirectoryResolver::new(std::env::temp_dir().join("jslt-no-such-dir"));
        let err = r.resolve("x.jslt").unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }

    #[test]
    fn reads_from_directory() {
        let dir = std::env::temp_dir().join(format!("jslt-resolver-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("m.jslt"), "def one() 1").unwrap();
        let r = DirectoryResolver::new(&dir);
        assert_eq!(r.resolve("m.jslt").unwrap(), "def one() 1");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn names_cannot_leave_the_root() {
        let r = DirectoryResolver::new(std::env::temp_dir());
        for name in ["../m.jslt", "/etc/hostname", "lib/../../m.jslt"] {
            let err = r.resolve(name).unwrap_err();
            assert!(matches!(err, JsltError::Compile { .. }), "{name}: {err}");
        }
    }
}
