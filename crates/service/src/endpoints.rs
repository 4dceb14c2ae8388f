use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::endpoint::FlowEndpoint;

/// Flow endpoints keyed by flow id
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<String, Arc<FlowEndpoint>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `endpoint` under its flow id, returning any endpoint it replaced
    pub fn register(&self, endpoint: FlowEndpoint) -> Option<Arc<FlowEndpoint>> {
        let flow_id = endpoint.flow_id().to_string();
        tracing::info!(flow_id = flow_id.as_str(), "registered flow endpoint");
        self.endpoints.write().insert(flow_id, Arc::new(endpoint))
    }

    pub fn get(&self, flow_id: &str) -> Option<Arc<FlowEndpoint>> {
        self.endpoints.read().get(flow_id).cloned()
    }

    pub fn remove(&self, flow_id: &str) -> Option<Arc<FlowEndpoint>> {
        self.endpoints.write().remove(flow_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.endpoints.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Ids of endpoints whose key pair is loaded
    pub fn ready_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .endpoints
            .read()
            .values()
            .filter(|endpoint| endpoint.has_key())
            .map(|endpoint| endpoint.flow_id().to_string())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use common::crypto::KeyStore;

    use super::*;
    use crate::endpoint::FlowEndpointConfig;

    #[test]
    fn test_register_get_remove() {
        let keys = Arc::new(KeyStore::new());
        let registry = EndpointRegistry::new();
        assert!(registry.is_empty());

        registry.register(FlowEndpoint::new("b", FlowEndpointConfig::new("b"), keys.clone()));
        registry.register(FlowEndpoint::new("a", FlowEndpointConfig::new("a"), keys.clone()));
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());

        let replaced =
            registry.register(FlowEndpoint::new("a", FlowEndpointConfig::new("other"), keys));
        assert!(replaced.is_some());
        assert_eq!(registry.get("a").unwrap().config().key_id, "other");

        assert!(registry.remove("a").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ready_ids_track_key_store() {
        let keys = Arc::new(KeyStore::new());
        let registry = EndpointRegistry::new();
        registry.register(FlowEndpoint::new("a", FlowEndpointConfig::new("a"), keys.clone()));
        assert!(registry.ready_ids().is_empty());

        keys.generate("a").unwrap();
        assert_eq!(registry.ready_ids(), vec!["a".to_string()]);
    }
}
