//! Narrow interfaces to the things the compiler does not own: the file
//! system, where diagnostics go, and optional tool dependencies.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::diagnostics::Diagnostic;
use crate::error::DependencyError;

// ═══════════════════════════════════════════════════════════════════════════════
// FILE SYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Every file below `root`, in a stable order.
    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    fn join(&self, base: &Path, segment: &str) -> PathBuf {
        base.join(segment)
    }

    fn dirname(&self, path: &Path) -> PathBuf {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    fn basename(&self, path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `to` expressed relative to the directory `from`.
    fn relative(&self, from: &Path, to: &Path) -> PathBuf {
        relative_path(from, to)
    }
}

pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Files held in memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files.insert(path.into(), contents.to_string());
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect())
    }
}

fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<Component> = to.components().filter(|c| *c != Component::CurDir).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for part in &to[common..] {
        out.push(part.as_os_str());
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS SINK
// ═══════════════════════════════════════════════════════════════════════════════

pub trait DiagnosticsSink {
    fn report(&mut self, diagnostic: Diagnostic);

    fn report_all(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>)
    where
        Self: Sized,
    {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONAL DEPENDENCIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Tooling that is only pulled in when a feature needs it.
pub trait DependencyInstaller {
    /// Make sure every module in `module_ids` is available.
    fn ensure(&mut self, module_ids: &[&str]) -> Result<(), DependencyError>;

    /// Resolve a module previously ensured.
    fn require(&self, module_id: &str) -> Result<PathBuf, DependencyError>;
}

/// Dependencies that are already on disk; nothing is ever installed.
#[derive(Debug, Default, Clone)]
pub struct PreinstalledDependencies {
    modules: BTreeMap<String, PathBuf>,
    ensured: HashSet<String>,
}

impl PreinstalledDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module_id: &str, location: impl Into<PathBuf>) -> Self {
        self.modules.insert(module_id.to_string(), location.into());
        self
    }
}

impl DependencyInstaller for PreinstalledDependencies {
    fn ensure(&mut self, module_ids: &[&str]) -> Result<(), DependencyError> {
        let missing: Vec<String> = module_ids
            .iter()
            .filter(|id| !self.modules.contains_key(**id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DependencyError::Missing(missing));
        }
        self.ensured.extend(module_ids.iter().map(|id| id.to_string()));
        Ok(())
    }

    fn require(&self, module_id: &str) -> Result<PathBuf, DependencyError> {
        if !self.ensured.contains(module_id) {
            return Err(DependencyError::NotEnsured(module_id.to_string()));
        }
        self.modules
            .get(module_id)
            .cloned()
            .ok_or_else(|| DependencyError::Missing(vec![module_id.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DIAG_TAG_NOT_KEBAB;

    #[test]
    fn test_relative_paths() {
        let fs = StdFileSystem;
        assert_eq!(fs.relative(Path::new("src/a"), Path::new("src/b/c.ts")), PathBuf::from("../b/c.ts"));
        assert_eq!(fs.relative(Path::new("src"), Path::new("src/c.ts")), PathBuf::from("c.ts"));
        assert_eq!(fs.relative(Path::new("./src"), Path::new("src")), PathBuf::new());
        assert_eq!(fs.dirname(Path::new("src/c.ts")), PathBuf::from("src"));
        assert_eq!(fs.basename(Path::new("src/c.ts")), "c.ts");
    }

    #[test]
    fn test_std_walk_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/z.tsx"), "").unwrap();
        fs::write(dir.path().join("a.tsx"), "").unwrap();

        let files = StdFileSystem.walk(dir.path()).unwrap();
        let names: Vec<PathBuf> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.tsx"), PathBuf::from("b/z.tsx")]);
    }

    #[test]
    fn test_memory_fs() {
        let fs = MemoryFileSystem::new()
            .with_file("src/a.tsx", "a")
            .with_file("lib/b.tsx", "b");
        assert_eq!(fs.walk(Path::new("src")).unwrap(), vec![PathBuf::from("src/a.tsx")]);
        assert_eq!(fs.read_to_string(Path::new("lib/b.tsx")).unwrap(), "b");
        assert_eq!(
            fs.read_to_string(Path::new("nope")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_collecting_sink_splits_levels() {
        let mut sink = CollectingSink::default();
        sink.report_all(vec![
            Diagnostic::warning(DIAG_TAG_NOT_KEBAB, "bad tag", "a.tsx"),
            Diagnostic::error("WC-ERR-TRANSFORM-001", "broken", "b.tsx"),
        ]);
        assert!(sink.has_errors());
        assert_eq!(sink.warnings().count(), 1);
        assert_eq!(sink.errors().next().map(|d| d.file.as_str()), Some("b.tsx"));
    }

    #[test]
    fn test_require_needs_ensure_first() {
        let mut deps = PreinstalledDependencies::new().with_module("workbox-build", "/opt/workbox");
        assert_eq!(
            deps.require("workbox-build"),
            Err(DependencyError::NotEnsured("workbox-build".to_string()))
        );
        assert_eq!(
            deps.ensure(&["workbox-build", "terser"]),
            Err(DependencyError::Missing(vec!["terser".to_string()]))
        );
        deps.ensure(&["workbox-build"]).unwrap();
        assert_eq!(deps.require("workbox-build"), Ok(PathBuf::from("/opt/workbox")));
    }
}
