use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::crypto::KeyStore;

use super::endpoints::EndpointRegistry;

/// Main service state, shared by every HTTP handler
#[derive(Debug, Clone, Default)]
pub struct State {
    keys: Arc<KeyStore>,
    endpoints: Arc<EndpointRegistry>,
    shutting_down: Arc<AtomicBool>,
}

impl State {
    pub fn new(keys: Arc<KeyStore>, endpoints: Arc<EndpointRegistry>) -> Self {
        Self {
            keys,
            endpoints,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    /// Flag the service as draining; readiness reports failure from here on
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl AsRef<KeyStore> for State {
    fn as_ref(&self) -> &KeyStore {
        &self.keys
    }
}

impl AsRef<EndpointRegistry> for State {
    fn as_ref(&self) -> &EndpointRegistry {
        &self.endpoints
    }
}
