//! Core error types for Clipfile RS
//!
//! Validation failures are collected rather than raised, so a failed save can
//! hand every message to the host's error sink at once.

use std::collections::BTreeMap;
use thiserror::Error;

/// Validation errors collection, keyed by error kind (`size`, `processing`, ...)
#[derive(Error, Debug, Default, Clone, PartialEq, Eq)]
#[error("Validation errors: {errors:?}")]
pub struct ValidationErrors {
    /// Kind-specific errors: kind -> Vec<error_messages>
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(kind.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Check if there are errors of a specific kind
    pub fn has_error(&self, kind: &str) -> bool {
        self.errors.contains_key(kind)
    }

    /// Get errors of a specific kind
    pub fn get(&self, kind: &str) -> Option<&Vec<String>> {
        self.errors.get(kind)
    }

    /// Iterate over `(kind, message)` pairs in kind order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors
            .iter()
            .flat_map(|(kind, messages)| messages.iter().map(move |m| (kind.as_str(), m.as_str())))
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (kind, messages) in other.errors {
            self.errors.entry(kind).or_default().extend(messages);
        }
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.iter().map(|(_, message)| message.to_string()).collect()
    }
}

impl FromIterator<(String, String)> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut errors = ValidationErrors::new();
        for (kind, message) in iter {
            errors.add(kind, message);
        }
        errors
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
