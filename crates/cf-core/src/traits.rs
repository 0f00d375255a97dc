//! Host record collaborator
//!
//! The host record owns the attachment's persisted columns and its error sink.
//! Attachments never own the host; it is lent to every lifecycle call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key type of host records
pub type Id = i64;

/// The four columns a host stores per attachment
/// (`<name>_file_name`, `<name>_content_type`, `<name>_file_size`, `<name>_updated_at`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentColumns {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AttachmentColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank all four columns
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether a file name has been recorded
    pub fn has_file(&self) -> bool {
        self.file_name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }
}

/// Narrow interface an attachment needs from the record it is bound to.
///
/// A host that returns `None` from [`HostRecord::columns`] for an attachment
/// name cannot carry that attachment; constructing or assigning one fails
/// with a configuration error.
pub trait HostRecord: Send + Sync + 'static {
    /// Model name, e.g. `"User"` or `"BlogPost"`
    fn model_name(&self) -> &str;

    /// Primary key, `None` until the record is persisted
    fn id(&self) -> Option<Id>;

    /// Columns backing the named attachment
    fn columns(&self, attachment: &str) -> Option<&AttachmentColumns>;

    /// Mutable columns backing the named attachment
    fn columns_mut(&mut self, attachment: &str) -> Option<&mut AttachmentColumns>;

    /// Error sink
    fn add_error(&mut self, field: &str, message: &str);

    /// Runs before styles are processed; returning `false` vetoes processing.
    fn before_post_process(&mut self, _attachment: &str) -> bool {
        true
    }

    /// Runs after styles are processed; returning `false` halts the callback chain.
    fn after_post_process(&mut self, _attachment: &str) -> bool {
        true
    }
}
