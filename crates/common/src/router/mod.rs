//! Action and screen dispatch
//!
//! Resolution order for a decrypted request:
//!
//! 1. `ping` is answered directly with `{"status": "active"}`, registry untouched
//! 2. `INIT` resolves only the `"INIT"` key, never the screen
//! 3. anything else resolves by `action`, then by `screen`
//!
//! Many integrations send the generic `data_exchange` action and let the screen
//! carry intent; others register per-action handlers. Both work without duplicate
//! registrations.

mod handler;
mod registry;

use std::sync::Arc;

pub use handler::{handler_fn, FnHandler, Handler, HandlerError};
pub use registry::{DynHandler, HandlerRegistry, RegistryError};

use crate::protocol::{DecryptedRequest, ProtocolReply, ACTION_INIT, ACTION_PING};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler registered for INIT")]
    NoInitHandler,
    #[error("no handler for action '{action}' or screen '{screen}'")]
    NoHandlerForRequest { action: String, screen: String },
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Resolves a request to a handler and runs it
#[derive(Debug, Clone, Default)]
pub struct ActionRouter {
    registry: Arc<HandlerRegistry>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn register<H: Handler>(
        &self,
        key: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.registry.register(key, handler)
    }

    /// Find the handler for `request`.
    ///
    /// Returns `Ok(None)` for `ping`, which needs no handler.
    pub fn resolve(
        &self,
        request: &DecryptedRequest,
    ) -> Result<Option<DynHandler>, DispatchError> {
        if request.action == ACTION_PING {
            return Ok(None);
        }
        if request.action == ACTION_INIT {
            return self
                .registry
                .get(ACTION_INIT)
                .map(Some)
                .ok_or(DispatchError::NoInitHandler);
        }
        self.registry
            .get(&request.action)
            .or_else(|| self.registry.get(&request.screen))
            .map(Some)
            .ok_or_else(|| DispatchError::NoHandlerForRequest {
                action: request.action.clone(),
                screen: request.screen.clone(),
            })
    }

    /// Route `request` and run its handler.
    ///
    /// No registry lock is held while the handler runs. Handler errors come back
    /// unchanged as [`DispatchError::Handler`].
    pub async fn dispatch(
        &self,
        request: DecryptedRequest,
    ) -> Result<ProtocolReply, DispatchError> {
        let Some(handler) = self.resolve(&request)? else {
            tracing::debug!("answering ping");
            return Ok(ProtocolReply::ping(request.version));
        };
        tracing::debug!(
            action = request.action.as_str(),
            screen = request.screen.as_str(),
            "dispatching request"
        );
        Ok(handler.handle(request).await?)
    }
}
