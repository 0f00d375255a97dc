//! Attachment validations
//!
//! A validation is a named predicate over the attachment and its host that
//! returns a message when it fails. The engine runs them once per assignment
//! cycle; the attachment memoizes the result.

use std::collections::BTreeMap;
use std::sync::Arc;

use cf_core::HostRecord;
use regex::Regex;

use crate::attachment::Attachment;

pub type Predicate<H> = Arc<dyn Fn(&Attachment<H>, &H) -> Option<String> + Send + Sync>;

/// A named check
pub struct Validation<H> {
    pub name: String,
    predicate: Predicate<H>,
}

impl<H> Clone for Validation<H> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<H> std::fmt::Debug for Validation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validation").field("name", &self.name).finish()
    }
}

/// Allowed content type: an exact MIME type or a pattern
#[derive(Debug, Clone)]
pub enum ContentTypeRule {
    Exact(String),
    Pattern(Regex),
}

impl ContentTypeRule {
    pub fn matches(&self, content_type: &str) -> bool {
        match self {
            Self::Exact(allowed) => allowed == content_type,
            Self::Pattern(pattern) => pattern.is_match(content_type),
        }
    }
}

impl From<&str> for ContentTypeRule {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for ContentTypeRule {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for ContentTypeRule {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

impl<H: HostRecord> Validation<H> {
    /// Arbitrary predicate under `name`
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Attachment<H>, &H) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Fails when no file is assigned
    pub fn presence() -> Self {
        Self::custom("presence", |attachment, host| {
            (!attachment.exists(host)).then(|| "must be set".to_string())
        })
    }

    /// Fails when the size is outside `min..=max`. A missing file counts as zero bytes.
    pub fn size(min: u64, max: u64) -> Self {
        Self::custom("size", move |attachment, host| {
            let size = attachment.size(host).unwrap_or(0);
            if (min..=max).contains(&size) {
                None
            } else if max == u64::MAX {
                Some(format!("file size must be at least {min} bytes"))
            } else {
                Some(format!("file size must be between {min} and {max} bytes"))
            }
        })
    }

    pub fn max_size(bytes: u64) -> Self {
        Self::size(0, bytes)
    }

    pub fn min_size(bytes: u64) -> Self {
        Self::size(bytes, u64::MAX)
    }

    /// Fails when an assigned file's content type matches none of `allowed`
    pub fn content_type<I, R>(allowed: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ContentTypeRule>,
    {
        let allowed: Vec<ContentTypeRule> = allowed.into_iter().map(Into::into).collect();
        Self::custom("content_type", move |attachment, host| {
            if !attachment.exists(host) {
                return None;
            }
            let content_type = attachment.content_type(host).unwrap_or_default();
            (!allowed.iter().any(|rule| rule.matches(content_type)))
                .then(|| "is not one of the allowed file types".to_string())
        })
    }

    pub fn check(&self, attachment: &Attachment<H>, host: &H) -> Option<String> {
        (self.predicate)(attachment, host)
    }
}

/// Ordered set of validations for one attachment
pub struct ValidationEngine<H> {
    validations: Vec<Validation<H>>,
}

impl<H> Default for ValidationEngine<H> {
    fn default() -> Self {
        Self {
            validations: Vec::new(),
        }
    }
}

impl<H> Clone for ValidationEngine<H> {
    fn clone(&self) -> Self {
        Self {
            validations: self.validations.clone(),
        }
    }
}

impl<H> std::fmt::Debug for ValidationEngine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validations.iter().map(|v| &v.name))
            .finish()
    }
}

impl<H: HostRecord> ValidationEngine<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation. A later one with the same name replaces the earlier.
    pub fn add(&mut self, validation: Validation<H>) {
        self.validations.retain(|v| v.name != validation.name);
        self.validations.push(validation);
    }

    pub fn with(mut self, validation: Validation<H>) -> Self {
        self.add(validation);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.validations.iter().map(|v| v.name.as_str()).collect()
    }

    /// Run every validation, keeping the failures
    pub fn run(&self, attachment: &Attachment<H>, host: &H) -> BTreeMap<String, String> {
        self.validations
            .iter()
            .filter_map(|validation| {
                validation
                    .check(attachment, host)
                    .map(|message| (validation.name.clone(), message))
            })
            .collect()
    }
}
