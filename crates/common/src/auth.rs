//! Shared-secret signature check over the raw request body.
//!
//! The provider signs every request with HMAC-SHA256 and sends
//! `X-Hub-Signature-256: sha256=<hex>`. The check runs on the exact bytes received,
//! before the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
/// Prefix in front of the hex digest
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies request signatures against one configured secret
#[derive(Clone)]
pub struct RequestAuthenticator {
    secret: Vec<u8>,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator").finish_non_exhaustive()
    }
}

impl RequestAuthenticator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, body: &[u8], signature_header: Option<&str>) -> bool {
        verify(body, signature_header, &self.secret)
    }
}

/// Check `signature_header` against the HMAC-SHA256 of `body` under `secret`.
///
/// Accepts `sha256=<hex>` or bare hex. Returns `false` for a missing or empty
/// header, an empty secret, a value that is not hex, or a mismatch. The digest
/// comparison is constant time.
pub fn verify(body: &[u8], signature_header: Option<&str>, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(header) = signature_header.map(str::trim).filter(|h| !h.is_empty()) else {
        return false;
    };
    let hex_digest = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Produce the `sha256=<hex>` header value for `body`
pub fn sign(body: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
