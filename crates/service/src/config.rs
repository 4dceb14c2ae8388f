use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single handler invocation
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);
/// Default request body limit (1 MiB); envelopes are small
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// address for the flow endpoint server to listen on.
    ///  if not set then 0.0.0.0:8080 will be used
    pub listen_addr: SocketAddr,
    /// largest request body we will read
    pub max_body_bytes: usize,
    /// how long a handler may run before the exchange
    ///  is abandoned with an error reply
    pub handler_timeout: Duration,

    // misc
    pub log_level: tracing::Level,
    /// directory for a daily-rolling log file,
    ///  stdout only if not set
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 8080),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
