//! # cf-storage
//!
//! Keyed blob storage for attachment files.
//!
//! Keys are the interpolated attachment paths. Backends are interchangeable
//! behind the [`Storage`] trait and are looked up by name through a
//! [`StorageRegistry`] when an attachment is constructed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cf_storage::{LocalStorage, MemoryStorage, StorageRegistry};
//!
//! let registry = StorageRegistry::new()
//!     .with("filesystem", LocalStorage::new("/var/app"))
//!     .with("memory", MemoryStorage::new());
//!
//! let storage = registry.get("filesystem")?;
//! storage.put("public/uploads/7_photo.jpg", bytes).await?;
//! ```

pub mod registry;
pub mod storage;

pub use registry::StorageRegistry;
pub use storage::{FileMetadata, LocalStorage, MemoryStorage, Storage, StorageError, StorageResult};
