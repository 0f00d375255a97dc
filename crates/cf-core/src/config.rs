//! Configuration types and loading
//!
//! Options are plain values handed to each attachment through its context;
//! nothing here is a process-wide mutable singleton.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default options shared by every attachment
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AttachmentOptions {
    /// Record processing failures as errors on the attachment
    pub whiny_thumbnails: bool,
    /// Directory holding the external command-line programs.
    /// `None` uses the first executable found on the search path.
    pub command_path: Option<PathBuf>,
    /// Log attachment lifecycle progress
    pub log: bool,
    /// Discard stderr of external commands
    pub swallow_stderr: bool,
    /// Upper bound for a single external command, in seconds
    pub command_timeout_secs: Option<u64>,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            whiny_thumbnails: false,
            command_path: None,
            log: true,
            swallow_stderr: true,
            command_timeout_secs: Some(60),
        }
    }
}

impl AttachmentOptions {
    /// Load options from `CLIPFILE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load options through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(v) = lookup("CLIPFILE_WHINY_THUMBNAILS") {
            options.whiny_thumbnails = parse_bool("CLIPFILE_WHINY_THUMBNAILS", &v)?;
        }
        if let Some(path) = lookup("CLIPFILE_COMMAND_PATH") {
            options.command_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(v) = lookup("CLIPFILE_LOG") {
            options.log = parse_bool("CLIPFILE_LOG", &v)?;
        }
        if let Some(v) = lookup("CLIPFILE_SWALLOW_STDERR") {
            options.swallow_stderr = parse_bool("CLIPFILE_SWALLOW_STDERR", &v)?;
        }
        if let Some(v) = lookup("CLIPFILE_COMMAND_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| ConfigError::invalid("CLIPFILE_COMMAND_TIMEOUT_SECS", format!("'{v}' is not a number of seconds")))?;
            // 0 disables the timeout
            options.command_timeout_secs = (secs > 0).then_some(secs);
        }

        Ok(options)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_whiny_thumbnails(mut self, whiny: bool) -> Self {
        self.whiny_thumbnails = whiny;
        self
    }

    pub fn with_command_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.command_path = Some(path.into());
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

/// Host environment markers available to path templates (`:root`, `:env`)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Environment {
    /// Application root directory
    pub root: PathBuf,
    /// Environment name, e.g. `production`
    pub name: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            name: "development".to_string(),
        }
    }
}

impl Environment {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    /// Load from `CLIPFILE_ROOT` and `CLIPFILE_ENV`
    pub fn from_env() -> Self {
        let mut env = Self::default();
        if let Ok(root) = std::env::var("CLIPFILE_ROOT") {
            env.root = PathBuf::from(root);
        }
        if let Ok(name) = std::env::var("CLIPFILE_ENV") {
            env.name = name;
        }
        env
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("'{other}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_options() {
        let options = AttachmentOptions::default();
        assert!(!options.whiny_thumbnails);
        assert!(options.command_path.is_none());
        assert!(options.log);
        assert!(options.swallow_stderr);
        assert_eq!(options.command_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_options_from_lookup() {
        let options = AttachmentOptions::from_lookup(lookup(&[
            ("CLIPFILE_WHINY_THUMBNAILS", "yes"),
            ("CLIPFILE_COMMAND_PATH", "/usr/local/bin"),
            ("CLIPFILE_LOG", "0"),
            ("CLIPFILE_COMMAND_TIMEOUT_SECS", "0"),
        ]))
        .unwrap();

        assert!(options.whiny_thumbnails);
        assert_eq!(options.command_path, Some(PathBuf::from("/usr/local/bin")));
        assert!(!options.log);
        assert!(options.swallow_stderr);
        assert_eq!(options.command_timeout(), None);
    }

    #[test]
    fn test_invalid_bool() {
        let result = AttachmentOptions::from_lookup(lookup(&[("CLIPFILE_LOG", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_timeout() {
        let result =
            AttachmentOptions::from_lookup(lookup(&[("CLIPFILE_COMMAND_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_default_environment() {
        let env = Environment::default();
        assert_eq!(env.root, PathBuf::from("."));
        assert_eq!(env.name, "development");
    }
}
