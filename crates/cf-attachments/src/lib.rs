//! # cf-attachments
//!
//! File attachments bound to host records.
//!
//! ## Features
//!
//! - Deferred writes and deletes committed on `save`
//! - Named styles derived through processor pipelines, inline or in the background
//! - Path and URL templates with `:token` interpolation
//! - Presence, size and content type validations
//!
//! ## Example
//!
//! ```rust,ignore
//! use cf_attachments::{Attachment, AttachmentContext, AttachmentDefinition, UploadedFile, Validation};
//! use std::sync::Arc;
//!
//! let definition = Arc::new(
//!     AttachmentDefinition::new("avatar")
//!         .with_style("thumb", "100x100!")
//!         .with_validation(Validation::max_size(5 * 1024 * 1024)),
//! );
//! let mut avatar = Attachment::new(definition, AttachmentContext::default(), &user)?;
//!
//! avatar.assign(&mut user, UploadedFile::from_path("Photo One.jpg").await?).await?;
//! if avatar.save(&mut user).await? {
//!     println!("{}", avatar.url(&mut user, Some("thumb"), true).await?);
//! }
//! ```

pub mod attachment;
pub mod definition;
pub mod error;
pub mod interpolation;
pub mod style;
pub mod upload;
pub mod validation;

#[cfg(test)]
mod testing;

pub use attachment::{sanitize_filename, AssignOutcome, Attachment, AttachmentContext, PROCESSING_ERRORS};
pub use definition::{AttachmentDefinition, ProcessingMode, ORIGINAL_STYLE};
pub use error::{AttachmentError, AttachmentResult};
pub use interpolation::{InterpolationContext, InterpolationError, Interpolator};
pub use style::{Deferred, PartialStyle, StyleDefinition, StyleSpec};
pub use upload::{Upload, UploadBody, UploadedFile};
pub use validation::{ContentTypeRule, Validation, ValidationEngine};
