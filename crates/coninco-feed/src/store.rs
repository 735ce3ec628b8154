//! Named text blobs on local storage.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Keyed text storage used for cached feeds.
///
/// Implementations do not create or clean up their backing location; that is
/// the caller's job at startup.
pub trait BlobStore {
    /// Returns the blob stored under `key`, or `None` if there is none.
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    /// Stores `data` under `key`, replacing any previous blob.
    fn write(&self, key: &str, data: &str) -> io::Result<()>;
}

/// Stores each blob as a file named after its key inside one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `key` to a file directly inside the root.
    ///
    /// Keys come from configuration, so anything that is not a single plain
    /// file name is refused rather than allowed to escape the directory.
    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let mut components = Path::new(key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.root.join(name)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("blob key {key:?} is not a plain file name"),
            )),
        }
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, key: &str, data: &str) -> io::Result<()> {
        fs::write(self.path_for(key)?, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_blob_reads_as_none() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp.path());
        assert_eq!(store.read("alice").unwrap(), None);
    }

    #[test]
    fn write_then_read() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp.path());
        store.write("alice", "BEGIN:VCALENDAR\n").unwrap();
        assert_eq!(
            store.read("alice").unwrap().as_deref(),
            Some("BEGIN:VCALENDAR\n")
        );
        assert!(temp.path().join("alice").is_file());
    }

    #[test]
    fn write_replaces_previous_blob() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp.path());
        store.write("alice", "old").unwrap();
        store.write("alice", "new").unwrap();
        assert_eq!(store.read("alice").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn rejects_keys_outside_root() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp.path());
        for key in ["../escape", "nested/name", "/etc/passwd", "", ".."] {
            let err = store.write(key, "x").unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "key {key:?}");
        }
    }

    #[test]
    fn does_not_create_root() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp.path().join("missing"));
        assert!(store.write("alice", "x").is_err());
        assert!(!store.root().exists());
    }
}
