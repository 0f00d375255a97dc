//! Storage Abstraction
//!
//! Provides a unified interface for attachment storage backends.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// File metadata reported by a write
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Content type (MIME) guessed from the key
    pub content_type: String,
    /// SHA256 digest
    pub digest: String,
    /// Last modified time
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

impl FileMetadata {
    fn describe(key: &str, data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            content_type: mime_guess::from_path(key)
                .first_or_octet_stream()
                .to_string(),
            digest: calculate_digest(data),
            last_modified: Some(chrono::Utc::now()),
        }
    }
}

/// Storage trait - unified interface for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store data under a key, replacing any previous content
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata>;

    /// Retrieve data by key
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete data by key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get storage name for logging
    fn name(&self) -> &str;
}

fn calculate_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Local filesystem storage
///
/// Keys that already start with `root` are used as they are, which lets path
/// templates that start with `:root` address the same files. Other relative
/// keys are resolved under `root`; other absolute keys are rejected.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a full path
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        let path = Path::new(key);

        // Prevent directory traversal
        if key.trim().is_empty() || path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        if path.starts_with(&self.root) {
            return Ok(path.to_path_buf());
        }
        if path.is_absolute() {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(path))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    #[instrument(skip(self, data), fields(storage = "filesystem"))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;
        self.ensure_parent(&path).await?;

        let metadata = FileMetadata::describe(key, &data);

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        debug!(path = ?path, size = metadata.size, "File stored");

        Ok(metadata)
    }

    #[instrument(skip(self), fields(storage = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(key)?;

        match fs::read(&path).await {
            Ok(buffer) => Ok(Bytes::from(buffer)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(storage = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "File deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

/// In-memory storage for testing
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Bytes>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Sorted list of stored keys
    pub async fn keys(&self) -> Vec<String> {
        let files = self.files.read().await;
        let mut keys: Vec<String> = files.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        let metadata = FileMetadata::describe(key, &data);

        let mut files = self.files.write().await;
        files.insert(key.to_string(), data);

        Ok(metadata)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let files = self.files.read().await;
        files
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut files = self.files.write().await;
        files.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let files = self.files.read().await;
        Ok(files.contains_key(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
