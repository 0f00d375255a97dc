//! # cf-core
//!
//! Core types, traits, and configuration for Clipfile RS.
//!
//! This crate provides the building blocks shared by the other crates:
//! - The `HostRecord` collaborator trait and its `AttachmentColumns`
//! - Aggregated validation errors (`ValidationErrors`)
//! - Process-wide attachment options and the host environment

pub mod config;
pub mod error;
pub mod traits;

pub use config::{AttachmentOptions, Environment};
pub use error::*;
pub use traits::*;
