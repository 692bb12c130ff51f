//! Blob storage for uploaded and generated document files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::FileRef;

/// File store errors.
#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Digest mismatch for {key}: expected {expected}, found {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

/// Opaque blob store keyed by document id.
pub trait FileStore: Send + Sync {
    /// Store `bytes` as a file of `document_id`.
    ///
    /// The key is versioned by content, so a previous blob of the same
    /// document is left in place until the caller removes it.
    fn put(&self, document_id: &str, bytes: &[u8]) -> FileStoreResult<FileRef>;

    /// Read a blob back, verifying its digest.
    fn get(&self, file: &FileRef) -> FileStoreResult<Vec<u8>>;

    /// Remove a blob. Returns false if it was already gone.
    fn remove(&self, file: &FileRef) -> FileStoreResult<bool>;
}

/// Compute the hex SHA-256 digest of data.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Store key for one version of a document's file.
pub fn document_file_key(document_id: &str, sha256: &str) -> String {
    let version = sha256.get(..16).unwrap_or(sha256);
    format!("documents/{}/{}.pdf", document_id, version)
}

/// File store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> FileStoreResult<PathBuf> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(FileStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FileStoreError {
    FileStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileStore for LocalFileStore {
    fn put(&self, document_id: &str, bytes: &[u8]) -> FileStoreResult<FileRef> {
        let sha256 = sha256_hex(bytes);
        let key = document_file_key(document_id, &sha256);
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        // Write beside the target then rename, so readers never see a partial blob
        let tmp = path.with_extension("pdf.tmp");
        fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;

        let file = FileRef {
            key,
            sha256,
            size_bytes: bytes.len() as u64,
        };
        tracing::debug!(key = %file.key, size = file.size_bytes, "Stored blob");
        Ok(file)
    }

    fn get(&self, file: &FileRef) -> FileStoreResult<Vec<u8>> {
        let path = self.resolve(&file.key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileStoreError::NotFound(file.key.clone()))
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        let actual = sha256_hex(&bytes);
        if actual != file.sha256 {
            return Err(FileStoreError::DigestMismatch {
                key: file.key.clone(),
                expected: file.sha256.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    fn remove(&self, file: &FileRef) -> FileStoreResult<bool> {
        let path = self.resolve(&file.key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let file = store.put("doc-1", b"%PDF-1.7 test").unwrap();
        assert!(file.key.starts_with("documents/doc-1/"));
        assert!(file.key.ends_with(".pdf"));
        assert_eq!(file.size_bytes, 13);
        assert_eq!(store.get(&file).unwrap(), b"%PDF-1.7 test");

        assert!(store.remove(&file).unwrap());
        assert!(!store.remove(&file).unwrap());
        assert!(matches!(store.get(&file), Err(FileStoreError::NotFound(_))));
    }

    #[test]
    fn test_new_version_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let first = store.put("doc-1", b"first").unwrap();
        let second = store.put("doc-1", b"second").unwrap();
        assert_ne!(first.key, second.key);
        assert_eq!(store.get(&first).unwrap(), b"first");
        assert_eq!(store.get(&second).unwrap(), b"second");

        // Same content maps to the same key
        assert_eq!(store.put("doc-1", b"first").unwrap().key, first.key);
    }

    #[test]
    fn test_digest_verified() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let mut file = store.put("doc-1", b"content").unwrap();
        file.sha256 = sha256_hex(b"other");
        assert!(matches!(
            store.get(&file),
            Err(FileStoreError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        assert!(matches!(
            store.put("../outside", b"x"),
            Err(FileStoreError::InvalidKey(_))
        ));
        let file = FileRef {
            key: "/etc/passwd".into(),
            sha256: String::new(),
            size_bytes: 0,
        };
        assert!(matches!(store.get(&file), Err(FileStoreError::InvalidKey(_))));
    }
}
