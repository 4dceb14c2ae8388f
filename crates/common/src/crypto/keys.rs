use std::fmt;
use std::ops::Deref;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::session::SessionKey;

/// Smallest RSA modulus we accept, in bits
pub const MIN_MODULUS_BITS: usize = 2048;
/// Modulus size used by [`KeyPair::generate`]
pub const DEFAULT_MODULUS_BITS: usize = 2048;

const PKCS1_PRIVATE_TAG: &str = "RSA PRIVATE KEY";
const PKCS8_PRIVATE_TAG: &str = "PRIVATE KEY";
const PUBLIC_TAG: &str = "PUBLIC KEY";

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key too small: {bits} bits, at least {min} required", min = MIN_MODULUS_BITS)]
    TooSmall { bits: usize },
    #[error("public key does not match private key")]
    Mismatch,
}

/// Public half of an RSA key pair.
///
/// This is what gets registered with the remote provider: it uses it to wrap the
/// per-request session key with RSA-OAEP (SHA-256 digest and MGF1 hash, no label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl Deref for PublicKey {
    type Target = RsaPublicKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        PublicKey(key)
    }
}

impl PublicKey {
    /// Parse a public key from SubjectPublicKeyInfo DER
    pub fn from_der(der: &[u8]) -> Result<Self, KeyError> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| anyhow::anyhow!("failed to parse public key: {}", e))?;
        Ok(Self(key))
    }

    /// Parse a public key from a PEM string with tag "PUBLIC KEY"
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;
        if pem.tag() != PUBLIC_TAG {
            return Err(anyhow::anyhow!("invalid PEM tag, expected {}", PUBLIC_TAG).into());
        }
        Self::from_der(pem.contents())
    }

    /// Parse the base64 DER form produced by [`PublicKey::to_base64`]
    pub fn from_base64_der(encoded: &str) -> Result<Self, KeyError> {
        let der = BASE64
            .decode(encoded.trim())
            .map_err(|_| anyhow::anyhow!("public key base64 decode error"))?;
        Self::from_der(&der)
    }

    /// Encode as SubjectPublicKeyInfo DER
    pub fn to_der(&self) -> Result<Vec<u8>, KeyError> {
        let document = self
            .0
            .to_public_key_der()
            .map_err(|e| anyhow::anyhow!("failed to encode public key: {}", e))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Encode as a "PUBLIC KEY" PEM string
    pub fn to_pem(&self) -> Result<String, KeyError> {
        let pem = pem::Pem::new(PUBLIC_TAG, self.to_der()?);
        Ok(pem::encode(&pem))
    }

    /// Base64 of the DER encoding.
    ///
    /// This is the exact format the provider expects when the key is uploaded for a
    /// business number, so rotating it must be coordinated with that upload.
    pub fn to_base64(&self) -> Result<String, KeyError> {
        Ok(BASE64.encode(self.to_der()?))
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.0.size() * 8
    }

    /// Wrap a session key for the holder of the matching private key.
    ///
    /// This is the requester's half of the exchange; the server never calls it outside
    /// of tooling and tests.
    pub fn wrap_session_key<R>(&self, session_key: &SessionKey, rng: &mut R) -> Result<Vec<u8>, KeyError>
    where
        R: RngCore + CryptoRng,
    {
        let wrapped = self
            .0
            .encrypt(rng, Oaep::new::<Sha256>(), session_key.bytes())
            .map_err(|e| anyhow::anyhow!("failed to wrap session key: {}", e))?;
        Ok(wrapped)
    }
}

/// Both halves of a key pair in PEM form, for offline backup or registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPairPem {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// RSA key pair used to recover per-request session keys.
///
/// The private half never leaves this type except through the explicit export
/// methods (`private_key_pem`, `private_key_der`, `to_pem`), and `Debug` only prints
/// the modulus size.
///
/// # Examples
///
/// ```ignore
/// let pair = KeyPair::generate()?;
///
/// // Register this with the provider
/// let registration = pair.public_key_base64()?;
///
/// // Persist for the next start
/// std::fs::write("flow.pem", pair.private_key_pem()?.as_bytes())?;
/// let recovered = KeyPair::from_pem(&std::fs::read_to_string("flow.pem")?)?;
/// ```
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PublicKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new 2048-bit key pair using the OS RNG
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with_bits(DEFAULT_MODULUS_BITS)
    }

    /// Generate a new key pair with the given modulus size
    pub fn generate_with_bits(bits: usize) -> Result<Self, KeyError> {
        Self::generate_with_rng(bits, &mut OsRng)
    }

    pub fn generate_with_rng<R>(bits: usize, rng: &mut R) -> Result<Self, KeyError>
    where
        R: RngCore + CryptoRng,
    {
        if bits < MIN_MODULUS_BITS {
            return Err(KeyError::TooSmall { bits });
        }
        let private = RsaPrivateKey::new(rng, bits)
            .map_err(|e| anyhow::anyhow!("failed to generate RSA key pair: {}", e))?;
        Self::from_private_key(private)
    }

    /// Wrap an existing private key, enforcing the minimum modulus size
    pub fn from_private_key(private: RsaPrivateKey) -> Result<Self, KeyError> {
        let bits = private.size() * 8;
        if bits < MIN_MODULUS_BITS {
            return Err(KeyError::TooSmall { bits });
        }
        let public = PublicKey(private.to_public_key());
        Ok(Self { private, public })
    }

    /// Parse a private key from PEM.
    ///
    /// Accepts both PKCS#1 ("RSA PRIVATE KEY") and PKCS#8 ("PRIVATE KEY") encodings.
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;
        let private = match pem.tag() {
            PKCS1_PRIVATE_TAG => RsaPrivateKey::from_pkcs1_der(pem.contents())
                .map_err(|e| anyhow::anyhow!("failed to parse PKCS#1 private key: {}", e))?,
            PKCS8_PRIVATE_TAG => RsaPrivateKey::from_pkcs8_der(pem.contents())
                .map_err(|e| anyhow::anyhow!("failed to parse PKCS#8 private key: {}", e))?,
            other => {
                return Err(anyhow::anyhow!(
                    "invalid PEM tag {}, expected {} or {}",
                    other,
                    PKCS1_PRIVATE_TAG,
                    PKCS8_PRIVATE_TAG
                )
                .into())
            }
        };
        Self::from_private_key(private)
    }

    /// Load a key pair from separate private and public PEM strings
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Mismatch`] if the public key is not the one derived from
    /// the private key.
    pub fn from_pem_pair(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let pair = Self::from_pem(private_pem)?;
        let public = PublicKey::from_pem(public_pem)?;
        if public != pair.public {
            return Err(KeyError::Mismatch);
        }
        Ok(pair)
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public.bits()
    }

    /// PKCS#1 DER encoding of the private key
    pub fn private_key_der(&self) -> Result<Zeroizing<Vec<u8>>, KeyError> {
        let document = self
            .private
            .to_pkcs1_der()
            .map_err(|e| anyhow::anyhow!("failed to encode private key: {}", e))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// PKCS#1 PEM ("RSA PRIVATE KEY") encoding of the private key
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>, KeyError> {
        let der = self.private_key_der()?;
        let pem = pem::Pem::new(PKCS1_PRIVATE_TAG, der.to_vec());
        Ok(Zeroizing::new(pem::encode(&pem)))
    }

    pub fn public_key_der(&self) -> Result<Vec<u8>, KeyError> {
        self.public.to_der()
    }

    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public.to_pem()
    }

    /// Base64 DER public key, the registration artifact
    pub fn public_key_base64(&self) -> Result<String, KeyError> {
        self.public.to_base64()
    }

    pub fn to_pem(&self) -> Result<KeyPairPem, KeyError> {
        Ok(KeyPairPem {
            private_key_pem: self.private_key_pem()?.to_string(),
            public_key_pem: self.public_key_pem()?,
        })
    }

    /// Recover a session key wrapped with RSA-OAEP (SHA-256, MGF1-SHA-256, no label).
    ///
    /// Returns `None` for every failure (bad padding, wrong key, wrong length) so that
    /// callers cannot tell the causes apart.
    pub(crate) fn unwrap_session_key(&self, wrapped: &[u8]) -> Option<SessionKey> {
        let unwrapped = self
            .private
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), wrapped)
            .ok()
            .map(Zeroizing::new)?;
        SessionKey::from_slice(&unwrapped).ok()
    }
}
