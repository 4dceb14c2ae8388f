//! Service infrastructure for Flowgate flow endpoints.
//!
//! This crate wires the protocol core from `common` to the outside world:
//! - Flow endpoints (signature check, envelope decryption, dispatch, reply encryption)
//! - The endpoint registry keyed by flow id
//! - HTTP server (flow routes, health checks)
//! - Process plumbing (logging, panic hook, graceful shutdown)

pub mod config;
pub mod endpoint;
pub mod endpoints;
pub mod http;
pub mod process;
pub mod state;

// Re-export key types for convenience
pub use config::Config;
pub use endpoint::{
    EndpointBody, EndpointResponse, ExchangeError, FlowEndpoint, FlowEndpointConfig,
};
pub use endpoints::EndpointRegistry;
pub use state::State as ServiceState;
