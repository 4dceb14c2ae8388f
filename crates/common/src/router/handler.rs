use std::future::Future;

use async_trait::async_trait;

use crate::protocol::{DecryptedRequest, ProtocolReply};

/// A business failure raised by a handler.
///
/// The message comes from locally registered code and is passed back to the
/// requester as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Application logic behind an action or a screen
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle one decrypted request
    ///
    /// # Arguments
    /// * `request` - The decrypted request, including the caller's opaque `flow_token`
    ///
    /// # Returns
    /// * `Ok(ProtocolReply)` - The reply to encrypt and send back
    /// * `Err(HandlerError)` - A business failure, reported to the requester unencrypted
    async fn handle(&self, request: DecryptedRequest) -> Result<ProtocolReply, HandlerError>;
}

/// [`Handler`] backed by an async closure; see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(DecryptedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProtocolReply, HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: DecryptedRequest) -> Result<ProtocolReply, HandlerError> {
        (self.f)(request).await
    }
}

/// Wrap an async closure as a [`Handler`]
///
/// ```ignore
/// registry.register("FORM", handler_fn(|request| async move {
///     Ok(ProtocolReply::navigate(request.version, "CONFIRM", json!({})))
/// }))?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(DecryptedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProtocolReply, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}
