/**
 * Shared-secret signature check
 *  over raw request bodies.
 */
pub mod auth;
/**
 * Cryptographic types and operations.
 *  - RSA key pairs and the key store
 *  - Per-request session keys
 *  - Envelope decryption and reply encryption
 */
pub mod crypto;
/**
 * Plaintext request and reply shapes
 *  carried inside the envelope.
 */
pub mod protocol;
/**
 * Handler registry and the
 *  action/screen dispatch rules.
 */
pub mod router;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::auth::{RequestAuthenticator, SIGNATURE_HEADER};
    pub use crate::crypto::{
        CipherMode, EncryptedRequest, EncryptedResponse, EnvelopeCodec, EnvelopeError, KeyPair,
        KeyStore, PublicKey, SessionKey,
    };
    pub use crate::protocol::{DecryptedRequest, ProtocolReply};
    pub use crate::router::{
        handler_fn, ActionRouter, DispatchError, Handler, HandlerError, HandlerRegistry,
    };
    pub use crate::version::build_info;
}
