//! Name-keyed storage backends

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::{Storage, StorageError, StorageResult};

/// Maps backend names (`"filesystem"`, `"memory"`, ...) to adapters
#[derive(Clone, Default)]
pub struct StorageRegistry {
    backends: HashMap<String, Arc<dyn Storage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under a name, replacing any previous one
    pub fn register<S: Storage + 'static>(&mut self, name: impl Into<String>, storage: S) {
        self.backends.insert(name.into(), Arc::new(storage));
    }

    /// Register an already shared backend
    pub fn register_shared(&mut self, name: impl Into<String>, storage: Arc<dyn Storage>) {
        self.backends.insert(name.into(), storage);
    }

    pub fn with<S: Storage + 'static>(mut self, name: impl Into<String>, storage: S) -> Self {
        self.register(name, storage);
        self
    }

    pub fn with_shared(mut self, name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        self.register_shared(name, storage);
        self
    }

    /// Look up a backend by name
    pub fn get(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBackend(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.backends.keys().collect();
        names.sort();
        f.debug_struct("StorageRegistry").field("backends", &names).finish()
    }
}
