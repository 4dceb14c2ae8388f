use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use crate::ServiceState;

#[async_trait]
pub trait DataSource {
    /// Check that the service can take flow traffic right now
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("no flow endpoint has a key pair loaded")]
    DependencyFailure,

    #[error("service has received signal indicating it should shutdown")]
    ShuttingDown,
}

pub type DynDataSource = Arc<dyn DataSource + Send + Sync>;

pub struct StateDataSource(DynDataSource);

impl Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDataSource").finish()
    }
}

impl StateDataSource {
    #[cfg(test)]
    pub fn new(dds: DynDataSource) -> Self {
        Self(dds)
    }
}

impl Deref for StateDataSource {
    type Target = DynDataSource;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Readiness backed by the live endpoint registry and key store
struct EndpointSource {
    state: ServiceState,
}

#[async_trait]
impl DataSource for EndpointSource {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        if self.state.is_shutting_down() {
            return Err(DataSourceError::ShuttingDown);
        }

        if self.state.endpoints().ready_ids().is_empty() {
            return Err(DataSourceError::DependencyFailure);
        }

        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StateDataSource
where
    ServiceState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ();

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource(Arc::new(EndpointSource {
            state: ServiceState::from_ref(state),
        })))
    }
}
