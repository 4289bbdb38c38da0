//! Artifact storage for staged uploads
//!
//! Files live under `<root>/<import_id>/<uuid>.<ext>`. The stored name never
//! derives from the client's file name, and the SHA-256 fingerprint is taken
//! from the bytes read back from disk.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{BridgeError, Result};

/// Extensions accepted for staged uploads
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "jpg", "jpeg", "png", "gif", "webp"];

/// Category recorded for every upload from the field system
pub const DEFAULT_CATEGORY: &str = "document";

/// Default per-file limit (10 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// A file part received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Normalized description of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub original_name: String,
    /// Lower-cased extension, empty when the name has none
    pub extension: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct FileValidation {
    pub ok: bool,
    pub errors: Vec<String>,
    pub info: FileInfo,
}

/// Where and what was written
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub stored_name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the persisted bytes
    pub fingerprint: String,
}

pub struct ArtifactStore {
    root_dir: PathBuf,
    max_file_size: u64,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root_dir: P, max_file_size: u64) -> Self {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!(path = %root_dir.display(), max_file_size, "Artifact store ready");
        Self {
            root_dir,
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check an upload against the extension allow-list
    pub fn validate(file: &UploadedFile) -> FileValidation {
        let extension = extension_of(&file.original_name);
        let mut errors = Vec::new();

        if extension.is_empty() {
            errors.push("File has no extension".to_string());
        } else if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            errors.push(format!("Extension .{} is not allowed", extension));
        }

        FileValidation {
            ok: errors.is_empty(),
            errors,
            info: FileInfo {
                original_name: file.original_name.clone(),
                extension,
                mime_type: file
                    .content_type
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            },
        }
    }

    /// Persist an upload for an import
    ///
    /// Oversize and disallowed files fail before anything touches the disk.
    pub async fn store(&self, file: &UploadedFile, import_id: i64) -> Result<StoredArtifact> {
        let size = file.bytes.len() as u64;
        if size > self.max_file_size {
            return Err(BridgeError::TooLarge(format!(
                "File too large ({} > {} bytes)",
                size, self.max_file_size
            )));
        }

        let validation = Self::validate(file);
        if !validation.ok {
            return Err(BridgeError::UnsupportedType(validation.errors.join("; ")));
        }

        let stored_name = format!("{}.{}", Uuid::new_v4().simple(), validation.info.extension);
        let dir = self.import_dir(import_id);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&stored_name);
        fs::write(&path, &file.bytes).await?;

        let persisted = fs::read(&path).await?;
        let fingerprint = compute_fingerprint(&persisted);

        debug!(
            import_id,
            stored_name = %stored_name,
            size = persisted.len(),
            "Stored artifact"
        );

        Ok(StoredArtifact {
            stored_name,
            path,
            size: persisted.len() as u64,
            fingerprint,
        })
    }

    /// Read back a stored artifact
    pub async fn read(&self, import_id: i64, stored_name: &str) -> Result<Vec<u8>> {
        if !is_generated_name(stored_name) {
            return Err(BridgeError::NotFound("File not found".to_string()));
        }

        let path = self.import_dir(import_id).join(stored_name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Stored file missing from disk");
                Err(BridgeError::NotFound("File not found on disk".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove everything stored for an import (submission rollback)
    pub async fn discard_import(&self, import_id: i64) -> Result<()> {
        let dir = self.import_dir(import_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(import_id, "Discarded import artifacts");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn import_dir(&self, import_id: i64) -> PathBuf {
        self.root_dir.join(import_id.to_string())
    }
}

/// Lower-cased text after the last dot of a file name
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.trim().to_lowercase(),
        None => String::new(),
    }
}

/// Hex SHA-256 of data
pub fn compute_fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Only names of the form `<32 hex>.<ext>` were produced by `store`
fn is_generated_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((stem, ext)) => {
            stem.len() == 32
                && stem.bytes().all(|b| b.is_ascii_hexdigit())
                && !ext.is_empty()
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn upload(name: &str, bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            original_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn test_validate_extensions() {
        assert!(ArtifactStore::validate(&upload("plan.PDF", b"x")).ok);
        assert_eq!(ArtifactStore::validate(&upload("plan.PDF", b"x")).info.extension, "pdf");

        let bad = ArtifactStore::validate(&upload("run.exe", b"x"));
        assert!(!bad.ok);
        assert_eq!(bad.errors, vec!["Extension .exe is not allowed".to_string()]);

        let none = ArtifactStore::validate(&upload("README", b"x"));
        assert!(!none.ok);
        assert_eq!(none.info.extension, "");
    }

    #[test]
    fn test_missing_content_type_defaults() {
        let file = UploadedFile {
            original_name: "photo.jpg".into(),
            content_type: None,
            bytes: Bytes::new(),
        };
        assert_eq!(
            ArtifactStore::validate(&file).info.mime_type,
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_store_fingerprint_matches_disk() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path(), DEFAULT_MAX_FILE_SIZE);

        let stored = store.store(&upload("plan.pdf", b"%PDF-1.4 plan"), 4).await.unwrap();
        assert!(stored.path.starts_with(temp.path().join("4")));
        assert!(stored.stored_name.ends_with(".pdf"));
        assert_eq!(stored.size, 13);

        let on_disk = std::fs::read(&stored.path).unwrap();
        assert_eq!(compute_fingerprint(&on_disk), stored.fingerprint);
        assert_eq!(store.read(4, &stored.stored_name).await.unwrap(), on_disk);
    }

    #[tokio::test]
    async fn test_same_name_gets_unique_stored_names() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path(), DEFAULT_MAX_FILE_SIZE);

        let a = store.store(&upload("plan.pdf", b"one"), 1).await.unwrap();
        let b = store.store(&upload("plan.pdf", b"one"), 1).await.unwrap();
        assert_ne!(a.stored_name, b.stored_name);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[tokio::test]
    async fn test_oversize_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path(), 4);

        let err = store.store(&upload("plan.pdf", b"12345"), 9).await.unwrap_err();
        assert!(matches!(err, BridgeError::TooLarge(_)));
        assert!(!temp.path().join("9").exists());
    }

    #[tokio::test]
    async fn test_read_rejects_foreign_names_and_missing_files() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path(), DEFAULT_MAX_FILE_SIZE);

        assert!(matches!(
            store.read(1, "../../etc/passwd").await,
            Err(BridgeError::NotFound(_))
        ));
        assert!(matches!(
            store.read(1, "0123456789abcdef0123456789abcdef.pdf").await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_import() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path(), DEFAULT_MAX_FILE_SIZE);

        store.store(&upload("plan.pdf", b"x"), 2).await.unwrap();
        store.discard_import(2).await.unwrap();
        assert!(!temp.path().join("2").exists());
        // Idempotent
        store.discard_import(2).await.unwrap();
    }
}
