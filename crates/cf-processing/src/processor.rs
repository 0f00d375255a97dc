//! Processor trait and name-keyed registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::Artifact;
use crate::command::CommandRunner;
use crate::error::{ProcessingError, ProcessingResult};
use crate::style::ResolvedStyle;
use crate::thumbnail::Thumbnail;

/// One transformation step of a style's pipeline
#[async_trait]
pub trait Processor: Send + Sync {
    /// Produce a new artifact from `source` for `style`. The source is never modified.
    async fn make(
        &self,
        source: &Artifact,
        style: &ResolvedStyle,
        runner: &dyn CommandRunner,
    ) -> ProcessingResult<Artifact>;
}

/// Processors by name. The default registry knows `thumbnail`.
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::empty().with("thumbnail", Thumbnail)
    }
}

impl ProcessorRegistry {
    /// Registry with the built-in processors
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without any processors
    pub fn empty() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    pub fn register<P: Processor + 'static>(&mut self, name: impl Into<String>, processor: P) {
        self.processors.insert(name.into(), Arc::new(processor));
    }

    pub fn with<P: Processor + 'static>(mut self, name: impl Into<String>, processor: P) -> Self {
        self.register(name, processor);
        self
    }

    pub fn resolve(&self, name: &str) -> ProcessingResult<Arc<dyn Processor>> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessingError::ProcessorNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_thumbnail() {
        let registry = ProcessorRegistry::default();
        assert_eq!(registry.names(), vec!["thumbnail"]);
        assert!(registry.resolve("thumbnail").is_ok());
    }

    #[test]
    fn test_unknown_processor() {
        let registry = ProcessorRegistry::empty();
        assert!(matches!(
            registry.resolve("watermark"),
            Err(ProcessingError::ProcessorNotFound(name)) if name == "watermark"
        ));
    }
}
