use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::handler::Handler;

pub type DynHandler = Arc<dyn Handler>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler is already registered for '{0}'")]
    AlreadyRegistered(String),
    #[error("handler key must not be empty")]
    EmptyKey,
}

/// Handlers keyed by action or screen name.
///
/// Written at configuration time, read on every request. Nothing is overwritten
/// unless the caller asks for it with [`HandlerRegistry::replace`].
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, DynHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: Handler>(
        &self,
        key: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_arc(key, Arc::new(handler))
    }

    pub fn register_arc(
        &self,
        key: impl Into<String>,
        handler: DynHandler,
    ) -> Result<(), RegistryError> {
        let key = non_empty(key.into())?;
        match self.handlers.write().entry(key) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(slot) => {
                tracing::debug!(key = slot.key().as_str(), "registered handler");
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Register `handler` under `key`, returning the handler it displaced
    pub fn replace<H: Handler>(
        &self,
        key: impl Into<String>,
        handler: H,
    ) -> Result<Option<DynHandler>, RegistryError> {
        let key = non_empty(key.into())?;
        Ok(self.handlers.write().insert(key, Arc::new(handler)))
    }

    pub fn unregister(&self, key: &str) -> Option<DynHandler> {
        self.handlers.write().remove(key)
    }

    /// Clone out the handler for `key`; the lock is released on return
    pub fn get(&self, key: &str) -> Option<DynHandler> {
        self.handlers.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

fn non_empty(key: String) -> Result<String, RegistryError> {
    if key.is_empty() {
        return Err(RegistryError::EmptyKey);
    }
    Ok(key)
}
