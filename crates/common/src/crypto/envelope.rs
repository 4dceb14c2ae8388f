//! Hybrid envelope encryption for the data-exchange protocol
//!
//! Inbound, the requester generates a fresh AES-256 session key, wraps it with our
//! RSA public key (OAEP, SHA-256) and encrypts the request JSON with AES-256-GCM.
//! We unwrap the key, decrypt, and answer with the *same* session key under a fresh
//! random IV.
//!
//! # Wire Format
//!
//! ```text
//! request:  { encrypted_aes_key: b64(rsa_oaep(key)),
//!             initial_vector:    b64(iv),
//!             encrypted_flow_data: b64(ciphertext || tag) }
//! response: { encrypted_flow_data: b64(iv (12 bytes) || ciphertext || tag (16 bytes)) }
//! ```

use aes_gcm::aead::consts::{U12, U16};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{Aes256Gcm, AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::{KeyPair, PublicKey};
use super::legacy::{self, CBC_IV_SIZE};
use super::session::SessionKey;
use crate::protocol::{DecryptedRequest, ProtocolReply};

/// Size of the GCM nonce we generate (96 bits)
pub const GCM_IV_SIZE: usize = 12;
/// Some requesters send a 128-bit GCM IV; we accept it inbound only
pub const WIDE_GCM_IV_SIZE: usize = 16;
/// Size of the GCM authentication tag in bytes
pub const GCM_TAG_SIZE: usize = 16;

type Aes256GcmWideIv = AesGcm<Aes256, U16>;

const DECRYPTION_FAILED: &str = "failed to decrypt request";

/// Inbound envelope as it arrives in the HTTP body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRequest {
    pub encrypted_flow_data: String,
    pub encrypted_aes_key: String,
    pub initial_vector: String,
}

/// Outbound envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedResponse {
    pub encrypted_flow_data: String,
}

/// Errors that can occur while opening or sealing an envelope
///
/// `KeyRecoveryFailed` and `AuthenticationFailed` render identically; only code in
/// this process can tell them apart.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),
    #[error("{}", DECRYPTION_FAILED)]
    KeyRecoveryFailed,
    #[error("{}", DECRYPTION_FAILED)]
    AuthenticationFailed,
    #[error("malformed request payload")]
    PayloadMalformed(#[source] serde_json::Error),
    #[error("failed to serialize payload")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to encrypt payload")]
    EncryptionFailed,
}

impl EnvelopeError {
    /// True for the failures that must be reported without detail
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            EnvelopeError::KeyRecoveryFailed | EnvelopeError::AuthenticationFailed
        )
    }
}

/// Symmetric mode used for the payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherMode {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    AesGcm,
    /// Unauthenticated; see [`EnvelopeCodec::legacy_cbc`]
    #[serde(rename = "legacy-aes-256-cbc")]
    LegacyAesCbc,
}

impl CipherMode {
    fn iv_size(&self) -> usize {
        match self {
            CipherMode::AesGcm => GCM_IV_SIZE,
            CipherMode::LegacyAesCbc => CBC_IV_SIZE,
        }
    }
}

impl std::fmt::Display for CipherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherMode::AesGcm => f.write_str("aes-256-gcm"),
            CipherMode::LegacyAesCbc => f.write_str("legacy-aes-256-cbc"),
        }
    }
}

/// Opens request envelopes and seals replies for one [`CipherMode`].
///
/// `EnvelopeCodec::default()` is AES-256-GCM. The unauthenticated CBC mode can only
/// be obtained through [`EnvelopeCodec::legacy_cbc`].
///
/// # Examples
///
/// ```ignore
/// let codec = EnvelopeCodec::default();
/// let (request, session_key) = codec.decrypt_request(&envelope, &key_pair)?;
/// let reply = ProtocolReply::navigate(&request.version, "NEXT", json!({}));
/// let response = codec.encrypt_reply(&reply, &session_key)?;
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeCodec {
    mode: CipherMode,
}

impl EnvelopeCodec {
    /// Codec for a mode named in configuration
    pub fn new(mode: CipherMode) -> Self {
        match mode {
            CipherMode::AesGcm => Self::aes_gcm(),
            CipherMode::LegacyAesCbc => Self::legacy_cbc(),
        }
    }

    pub fn aes_gcm() -> Self {
        Self {
            mode: CipherMode::AesGcm,
        }
    }

    /// Codec for the AES-256-CBC compatibility mode.
    ///
    /// This mode provides no integrity guarantee for the payload.
    pub fn legacy_cbc() -> Self {
        tracing::warn!("using legacy AES-256-CBC envelope mode, payloads are not authenticated");
        Self {
            mode: CipherMode::LegacyAesCbc,
        }
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Open an inbound envelope with our key pair.
    ///
    /// All three fields are base64-decoded before any cryptographic work. If the
    /// wrapped key cannot be recovered, a random stand-in key is used so the
    /// symmetric step still runs and both failure causes take the same path.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::MalformedEnvelope`] for bad base64 or an unusable IV length
    /// - [`EnvelopeError::KeyRecoveryFailed`] if the session key cannot be unwrapped
    /// - [`EnvelopeError::AuthenticationFailed`] if the payload fails authentication
    /// - [`EnvelopeError::PayloadMalformed`] if the plaintext is not a request
    pub fn decrypt_request(
        &self,
        envelope: &EncryptedRequest,
        key_pair: &KeyPair,
    ) -> Result<(DecryptedRequest, SessionKey), EnvelopeError> {
        let wrapped_key =
            decode_field(&envelope.encrypted_aes_key, "encrypted_aes_key is not valid base64")?;
        let iv = decode_field(&envelope.initial_vector, "initial_vector is not valid base64")?;
        let ciphertext = decode_field(
            &envelope.encrypted_flow_data,
            "encrypted_flow_data is not valid base64",
        )?;
        self.check_inbound_iv(&iv)?;

        let (session_key, recovered) = match key_pair.unwrap_session_key(&wrapped_key) {
            Some(key) => (key, true),
            None => (SessionKey::generate(), false),
        };
        let plaintext = self.open(&session_key, &iv, &ciphertext);
        if !recovered {
            return Err(EnvelopeError::KeyRecoveryFailed);
        }
        let plaintext = plaintext?;

        let request =
            serde_json::from_slice(&plaintext).map_err(EnvelopeError::PayloadMalformed)?;
        Ok((request, session_key))
    }

    /// Seal a reply with the session key recovered from the request
    pub fn encrypt_reply(
        &self,
        reply: &ProtocolReply,
        session_key: &SessionKey,
    ) -> Result<EncryptedResponse, EnvelopeError> {
        self.encrypt_reply_with_rng(reply, session_key, &mut OsRng)
    }

    /// Like [`EnvelopeCodec::encrypt_reply`], drawing the IV from `rng`
    pub fn encrypt_reply_with_rng<R>(
        &self,
        reply: &ProtocolReply,
        session_key: &SessionKey,
        rng: &mut R,
    ) -> Result<EncryptedResponse, EnvelopeError>
    where
        R: RngCore + CryptoRng,
    {
        let plaintext = Zeroizing::new(serde_json::to_vec(reply).map_err(EnvelopeError::Serialize)?);
        let (iv, ciphertext) = self.seal(session_key, &plaintext, rng)?;

        let mut out = Vec::with_capacity(iv.len() + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);

        Ok(EncryptedResponse {
            encrypted_flow_data: BASE64.encode(out),
        })
    }

    /// Build an inbound envelope the way the requester does.
    ///
    /// Used by the `ping` tooling and by tests that stand in for the remote side.
    pub fn seal_request<R>(
        &self,
        request: &DecryptedRequest,
        session_key: &SessionKey,
        recipient: &PublicKey,
        rng: &mut R,
    ) -> Result<EncryptedRequest, EnvelopeError>
    where
        R: RngCore + CryptoRng,
    {
        let wrapped_key = recipient
            .wrap_session_key(session_key, rng)
            .map_err(|_| EnvelopeError::EncryptionFailed)?;
        let plaintext =
            Zeroizing::new(serde_json::to_vec(request).map_err(EnvelopeError::Serialize)?);
        let (iv, ciphertext) = self.seal(session_key, &plaintext, rng)?;

        Ok(EncryptedRequest {
            encrypted_flow_data: BASE64.encode(ciphertext),
            encrypted_aes_key: BASE64.encode(wrapped_key),
            initial_vector: BASE64.encode(iv),
        })
    }

    /// Open a reply the way the requester does
    pub fn open_reply(
        &self,
        response: &EncryptedResponse,
        session_key: &SessionKey,
    ) -> Result<ProtocolReply, EnvelopeError> {
        let data = decode_field(
            &response.encrypted_flow_data,
            "encrypted_flow_data is not valid base64",
        )?;
        let iv_size = self.mode.iv_size();
        if data.len() < iv_size {
            return Err(EnvelopeError::MalformedEnvelope(
                "encrypted_flow_data is shorter than its IV",
            ));
        }
        let (iv, ciphertext) = data.split_at(iv_size);
        let plaintext = self.open(session_key, iv, ciphertext)?;
        serde_json::from_slice(&plaintext).map_err(EnvelopeError::PayloadMalformed)
    }

    fn check_inbound_iv(&self, iv: &[u8]) -> Result<(), EnvelopeError> {
        let ok = match self.mode {
            CipherMode::AesGcm => iv.len() == GCM_IV_SIZE || iv.len() == WIDE_GCM_IV_SIZE,
            CipherMode::LegacyAesCbc => iv.len() == CBC_IV_SIZE,
        };
        if !ok {
            return Err(EnvelopeError::MalformedEnvelope(
                "initial_vector has an unsupported length",
            ));
        }
        Ok(())
    }

    fn open(
        &self,
        key: &SessionKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let plaintext = match self.mode {
            CipherMode::AesGcm => open_gcm(key, iv, ciphertext),
            CipherMode::LegacyAesCbc => legacy::decrypt(key, iv, ciphertext),
        };
        plaintext
            .map(Zeroizing::new)
            .ok_or(EnvelopeError::AuthenticationFailed)
    }

    fn seal<R>(
        &self,
        key: &SessionKey,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>), EnvelopeError>
    where
        R: RngCore + CryptoRng,
    {
        // A fresh IV per message; reuse under one key breaks GCM confidentiality
        let mut iv = vec![0u8; self.mode.iv_size()];
        rng.fill_bytes(&mut iv);

        let ciphertext = match self.mode {
            CipherMode::AesGcm => {
                let cipher = Aes256Gcm::new_from_slice(key.bytes())
                    .map_err(|_| EnvelopeError::EncryptionFailed)?;
                cipher
                    .encrypt(Nonce::<U12>::from_slice(&iv), plaintext)
                    .map_err(|_| EnvelopeError::EncryptionFailed)?
            }
            CipherMode::LegacyAesCbc => {
                legacy::encrypt(key, &iv, plaintext).ok_or(EnvelopeError::EncryptionFailed)?
            }
        };
        Ok((iv, ciphertext))
    }
}

fn open_gcm(key: &SessionKey, iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    match iv.len() {
        GCM_IV_SIZE => Aes256Gcm::new_from_slice(key.bytes())
            .ok()?
            .decrypt(Nonce::<U12>::from_slice(iv), ciphertext)
            .ok(),
        WIDE_GCM_IV_SIZE => Aes256GcmWideIv::new_from_slice(key.bytes())
            .ok()?
            .decrypt(Nonce::<U16>::from_slice(iv), ciphertext)
            .ok(),
        _ => None,
    }
}

fn decode_field(value: &str, invalid: &'static str) -> Result<Vec<u8>, EnvelopeError> {
    BASE64
        .decode(value)
        .map_err(|_| EnvelopeError::MalformedEnvelope(invalid))
}

/// Open an inbound envelope with the default AES-256-GCM codec
pub fn decrypt_request(
    envelope: &EncryptedRequest,
    key_pair: &KeyPair,
) -> Result<(DecryptedRequest, SessionKey), EnvelopeError> {
    EnvelopeCodec::aes_gcm().decrypt_request(envelope, key_pair)
}

/// Seal a reply with the default AES-256-GCM codec
pub fn encrypt_reply(
    reply: &ProtocolReply,
    session_key: &SessionKey,
) -> Result<EncryptedResponse, EnvelopeError> {
    EnvelopeCodec::aes_gcm().encrypt_reply(reply, session_key)
}
