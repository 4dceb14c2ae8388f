use std::fmt;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 session key in bytes
pub const SESSION_KEY_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionKeyError {
    #[error("invalid session key size, expected {expected}, got {0}", expected = SESSION_KEY_SIZE)]
    InvalidLength(usize),
}

/// A 256-bit symmetric key shared by one request and its response.
///
/// Recovered from the envelope, used once to decrypt and once to encrypt, then
/// dropped. The bytes are wiped on drop, never printed and never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl From<[u8; SESSION_KEY_SIZE]> for SessionKey {
    fn from(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        SessionKey(bytes)
    }
}

impl SessionKey {
    /// Generate a fresh key from the OS RNG
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    pub fn generate_with_rng<R>(rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng,
    {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SessionKeyError> {
        if data.len() != SESSION_KEY_SIZE {
            return Err(SessionKeyError::InvalidLength(data.len()));
        }
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        bytes.copy_from_slice(data);
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_session_key_size_validation() {
        assert!(SessionKey::from_slice(&[1u8; 16]).is_err());
        assert!(SessionKey::from_slice(&[1u8; 33]).is_err());
        assert!(SessionKey::from_slice(&[1u8; SESSION_KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = SessionKey::generate_with_rng(&mut StdRng::seed_from_u64(7));
        let b = SessionKey::generate_with_rng(&mut StdRng::seed_from_u64(7));
        assert_eq!(a.bytes(), b.bytes());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SessionKey::from([0xAB; SESSION_KEY_SIZE]);
        let debug = format!("{:?}", key);
        assert_eq!(debug, "SessionKey(..)");
        assert!(!debug.to_lowercase().contains("ab"));
    }
}
