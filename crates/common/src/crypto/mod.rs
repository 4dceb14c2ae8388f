//! Cryptographic primitives for the encrypted data-exchange protocol
//!
//! # Security Model
//!
//! ## Integration Keys
//! Each flow has an RSA key pair (2048-bit minimum). The public half is registered
//! with the remote provider as base64 DER; the private half stays in the
//! [`KeyStore`] and is only exported explicitly for backup.
//!
//! ## Per-request Session Keys
//! The provider generates a fresh 256-bit [`SessionKey`] for every request and wraps
//! it with RSA-OAEP (SHA-256). We unwrap it, decrypt the payload with AES-256-GCM,
//! and encrypt our reply under the same key with a fresh 96-bit IV.
//!
//! ## Failure Reporting
//! Key unwrap failures and failed authentication tags surface as the same error
//! text. Unwrap failures still run the symmetric step with a throwaway key.
//!
//! ## Legacy Mode
//! AES-256-CBC without authentication is available through
//! [`EnvelopeCodec::legacy_cbc`] for old peers. It is never selected by default.

mod envelope;
mod key_store;
mod keys;
mod legacy;
mod session;

pub use envelope::{
    decrypt_request, encrypt_reply, CipherMode, EncryptedRequest, EncryptedResponse,
    EnvelopeCodec, EnvelopeError, GCM_IV_SIZE, GCM_TAG_SIZE, WIDE_GCM_IV_SIZE,
};
pub use key_store::{KeyStore, KeyStoreError};
pub use keys::{
    KeyError, KeyPair, KeyPairPem, PublicKey, DEFAULT_MODULUS_BITS, MIN_MODULUS_BITS,
};
pub use legacy::CBC_IV_SIZE;
pub use session::{SessionKey, SessionKeyError, SESSION_KEY_SIZE};
