//! Attachment errors

use cf_processing::ProcessingError;
use cf_storage::StorageError;
use thiserror::Error;

use crate::interpolation::InterpolationError;

/// Errors returned by attachment lifecycle operations.
///
/// Validation failures are not errors: `save` reports them by returning
/// `Ok(false)` and pushing messages onto the host.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background processing failed: {0}")]
    Background(String),

    #[error("Style '{style}' of {attachment} is queued but has no storage key")]
    Unstorable { attachment: String, style: String },
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

impl AttachmentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unstorable(attachment: &str, style: &str) -> Self {
        Self::Unstorable {
            attachment: attachment.to_string(),
            style: style.to_string(),
        }
    }

    pub fn missing_columns(model: &str, attachment: &str) -> Self {
        Self::Configuration(format!(
            "{model} model does not have the columns required by attachment '{attachment}'"
        ))
    }
}
