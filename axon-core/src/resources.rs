//! Named-resource store for configuration and secret documents.
//!
//! Resources live under `/<folder>/<namespace>/`; lookup walks the
//! namespace directory recursively and the first file whose name matches
//! exactly wins. Absence is not an error here; the pipeline decides per
//! stage whether a missing resource is fatal.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("i/o error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait ResourceStore: Send + Sync {
    fn open(
        &self,
        folder: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Box<dyn Read + Send>>, ResourceError>;
}

/// Filesystem-backed store rooted at a base directory (`/` in production).
pub struct FsResourceStore {
    root: PathBuf,
}

impl FsResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceStore for FsResourceStore {
    fn open(
        &self,
        folder: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Box<dyn Read + Send>>, ResourceError> {
        let dir = self.root.join(folder).join(namespace);
        if !dir.is_dir() {
            return Ok(None);
        }
        let Some(path) = find_file(&dir, name)? else {
            return Ok(None);
        };
        let file = std::fs::File::open(&path).map_err(|source| ResourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(Box::new(file)))
    }
}

/// Depth-first walk in sorted order, so the first match is deterministic.
fn find_file(dir: &Path, name: &str) -> Result<Option<PathBuf>, ResourceError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| ResourceError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| ResourceError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        entries.push(entry.path());
    }
    entries.sort();

    for path in &entries {
        if path.is_file() && path.file_name().map(|f| f == name).unwrap_or(false) {
            return Ok(Some(path.clone()));
        }
    }
    for path in &entries {
        if path.is_dir() {
            if let Some(found) = find_file(path, name)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// In-memory store for tests, keyed by `<folder>/<namespace>/<subpath>`.
#[derive(Default)]
pub struct MemResourceStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn with(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl ResourceStore for MemResourceStore {
    fn open(
        &self,
        folder: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Box<dyn Read + Send>>, ResourceError> {
        let prefix = format!("{folder}/{namespace}/");
        for (path, contents) in &self.files {
            if let Some(rest) = path.strip_prefix(&prefix) {
                if rest.rsplit('/').next() == Some(name) {
                    return Ok(Some(Box::new(std::io::Cursor::new(contents.clone()))));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(r: Box<dyn Read + Send>) -> String {
        let mut r = r;
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn fs_store_finds_nested_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("configs/team-a/nested/deeper");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("function-spec.yml"), "action: 'uri: x'").unwrap();

        let store = FsResourceStore::new(tmp.path());
        let found = store.open("configs", "team-a", "function-spec.yml").unwrap();
        assert_eq!(read_all(found.unwrap()), "action: 'uri: x'");
    }

    #[test]
    fn fs_store_reports_absent_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsResourceStore::new(tmp.path());
        assert!(store
            .open("configs", "nope", "function-spec.yml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn fs_store_requires_exact_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("configs/team-a");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("function-spec.yml.bak"), "x").unwrap();

        let store = FsResourceStore::new(tmp.path());
        assert!(store
            .open("configs", "team-a", "function-spec.yml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn mem_store_scopes_by_folder_and_namespace() {
        let store = MemResourceStore::new()
            .with("configs/a/function-spec.yml", "for-a")
            .with("configs/b/function-spec.yml", "for-b");

        let found = store.open("configs", "b", "function-spec.yml").unwrap();
        assert_eq!(read_all(found.unwrap()), "for-b");
        assert!(store
            .open("secrets", "a", "function-secret.yml")
            .unwrap()
            .is_none());
    }
}
