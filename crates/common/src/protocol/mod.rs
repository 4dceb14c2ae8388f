//! Plaintext shapes exchanged inside the encrypted envelope.
//!
//! A request names an `action` and the `screen` it came from; a reply names the
//! `screen` to show next and the data to fill it with.

mod reply;
mod request;

pub use reply::ProtocolReply;
pub use request::DecryptedRequest;

/// Liveness probe sent by the provider; answered without consulting any handler
pub const ACTION_PING: &str = "ping";
/// First request of an exchange
pub const ACTION_INIT: &str = "INIT";
/// Generic form submission; the screen identifies intent
pub const ACTION_DATA_EXCHANGE: &str = "data_exchange";
/// User navigated back
pub const ACTION_BACK: &str = "BACK";

/// Screen name that ends the exchange
pub const TERMINAL_SCREEN: &str = "SUCCESS";
/// Key under which a close reply carries its completion payload
pub const CLOSE_PAYLOAD_KEY: &str = "extension_message_response";
