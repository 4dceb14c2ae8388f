//! AES-256-CBC with PKCS#7 padding.
//!
//! Kept only for peers that predate the GCM envelope. It has no integrity
//! protection: a modified ciphertext either fails to unpad or decrypts to garbage.
//! Reachable only through [`EnvelopeCodec::legacy_cbc`](super::EnvelopeCodec::legacy_cbc).

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::session::SessionKey;

/// Size of the CBC initialization vector in bytes
pub const CBC_IV_SIZE: usize = 16;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

pub(crate) fn encrypt(key: &SessionKey, iv: &[u8], plaintext: &[u8]) -> Option<Vec<u8>> {
    let cipher = Encryptor::new_from_slices(key.bytes(), iv).ok()?;
    Some(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Returns `None` on a bad IV, a ciphertext that is not a whole number of blocks, or
/// bad padding.
pub(crate) fn decrypt(key: &SessionKey, iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
    let cipher = Decryptor::new_from_slices(key.bytes(), iv).ok()?;
    cipher.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()
}
