//! Where DSL source text comes from.
//!
//! The compiler never touches `std::fs` directly. [`FileSystemProvider`] reads
//! a project on disk; [`InMemoryProvider`] serves embedded sources and tests.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Extension of DSL source files.
pub const SOURCE_EXTENSION: &str = "dsl";

pub trait SourceProvider {
    /// Read one source file.
    fn read_source(&self, path: &Path) -> io::Result<String>;

    /// Every `.dsl` file at or below `root`, sorted by path. A `root` that
    /// is itself a `.dsl` file yields just that file.
    fn discover(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Reads sources from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn discover(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        // symlinks are not followed, so a link back into the tree is seen once
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() && is_source(entry.path()) {
                found.push(entry.into_path());
            }
        }
        found.sort();
        Ok(found)
    }
}

fn is_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Sources held in memory, keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    files: BTreeMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.files.insert(normalize(path.as_ref()), text.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Resolve `.` and `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> io::Result<String> {
        let key = normalize(path);
        self.files.get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no in-memory source at {}", key.display()),
            )
        })
    }

    fn discover(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let root = normalize(root);
        let found: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|p| p.starts_with(&root) && is_source(p))
            .cloned()
            .collect();
        if found.is_empty() && !self.files.keys().any(|p| p.starts_with(&root)) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no in-memory sources under {}", root.display()),
            ));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_lexical() {
        assert_eq!(normalize(Path::new("app/./core/../billing.dsl")), PathBuf::from("app/billing.dsl"));
    }

    #[test]
    fn in_memory_discovery_is_sorted_and_filtered() {
        let provider = InMemoryProvider::new()
            .with_file("app/orders.dsl", "module orders\n")
            .with_file("app/core.dsl", "module core\n")
            .with_file("app/README.md", "# notes")
            .with_file("other/x.dsl", "module x\n");
        let found = provider.discover(Path::new("app")).unwrap();
        assert_eq!(
            found,
            vec![PathBuf::from("app/core.dsl"), PathBuf::from("app/orders.dsl")]
        );
        assert_eq!(provider.read_source(Path::new("./app/core.dsl")).unwrap(), "module core\n");
    }

    #[test]
    fn in_memory_missing_root() {
        let provider = InMemoryProvider::new().with_file("a.dsl", "");
        let err = provider.discover(Path::new("nowhere")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let err = provider.read_source(Path::new("b.dsl")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn filesystem_discovery_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("billing")).unwrap();
        std::fs::write(dir.path().join("core.dsl"), "module core\n").unwrap();
        std::fs::write(dir.path().join("billing/invoices.dsl"), "module billing\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let found = FileSystemProvider.discover(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("billing/invoices.dsl"), PathBuf::from("core.dsl")]
        );
    }

    #[test]
    fn filesystem_discovery_nested_and_single_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/deep.dsl"), "module deep\n").unwrap();
        std::fs::write(dir.path().join("a/top.dsl"), "module top\n").unwrap();

        let found = FileSystemProvider.discover(&dir.path().join("a")).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a/b/c/deep.dsl"), dir.path().join("a/top.dsl")]
        );

        let single = FileSystemProvider.discover(&dir.path().join("a/top.dsl")).unwrap();
        assert_eq!(single, vec![dir.path().join("a/top.dsl")]);
    }

    #[test]
    fn filesystem_discovery_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSystemProvider.discover(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn filesystem_discovery_ignores_symlink_loops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.dsl"), "module a\n").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let found = FileSystemProvider.discover(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a.dsl")]);
    }
}
