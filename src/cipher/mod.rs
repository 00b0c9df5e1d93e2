//! Symmetric message protocol used on the platform's push and reply channels.
//!
//! ```text
//! plaintext buffer:  seed(16) | len(4, BE) | payload(len) | tenant id | pad(1..=32)
//! wire:              base64(AES-256-CBC(buffer, key, iv = key[..16]))
//! ```
//!
//! Envelopes carry the ciphertext plus a SHA1 signature over the sorted
//! `(token, timestamp, nonce, ciphertext)` strings.

use crate::error::{Error, Result};
use aes::Aes256;
use base64::{
    alphabet,
    engine::{general_purpose::STANDARD as BASE64, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;

mod envelope;
mod signature;


pub use envelope::EncryptedEnvelope;
pub use signature::{js_api_signature, random_seed, random_string, sign, verify_url_signature};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const KEY_SIZE: usize = 32;
pub const SEED_SIZE: usize = 16;
const IV_SIZE: usize = 16;
const LENGTH_SIZE: usize = 4;

/// Padding block size. Deliberately larger than the AES block.
pub(crate) const PAD_BLOCK: usize = 32;

/// The platform's 43-character EncodingAESKey is unpadded base64 whose last
/// character may carry non-zero trailing bits.
const ENCODING_KEY: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encrypts and authenticates messages for one tenant.
#[derive(Clone)]
pub struct MessageCipher {
    token: String,
    key: [u8; KEY_SIZE],
    tenant_id: String,
}

impl fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCipher")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl MessageCipher {
    pub fn new(token: impl Into<String>, key: [u8; KEY_SIZE], tenant_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            key,
            tenant_id: tenant_id.into(),
        }
    }

    /// Builds a cipher from the platform's base64 EncodingAESKey.
    pub fn from_encoding_key(
        token: impl Into<String>,
        encoding_key: &str,
        tenant_id: impl Into<String>,
    ) -> Result<Self> {
        let decoded = ENCODING_KEY
            .decode(encoding_key.trim())
            .map_err(|e| Error::InvalidKey(format!("EncodingAESKey is not base64: {}", e)))?;

        let key: [u8; KEY_SIZE] = decoded.as_slice().try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "EncodingAESKey must decode to {} bytes, got {}",
                KEY_SIZE,
                decoded.len()
            ))
        })?;

        Ok(Self::new(token, key, tenant_id))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Encrypts `plaintext` and returns base64 ciphertext.
    pub fn encrypt(&self, seed: &[u8; SEED_SIZE], plaintext: &[u8]) -> Result<String> {
        let len = u32::try_from(plaintext.len()).map_err(|_| Error::PayloadTooLarge(plaintext.len()))?;

        let mut buffer = Vec::with_capacity(
            SEED_SIZE + LENGTH_SIZE + plaintext.len() + self.tenant_id.len() + PAD_BLOCK,
        );
        buffer.extend_from_slice(seed);
        buffer.extend_from_slice(&len.to_be_bytes());
        buffer.extend_from_slice(plaintext);
        buffer.extend_from_slice(self.tenant_id.as_bytes());
        pad(&mut buffer);

        let msg_len = buffer.len();
        let encrypted = Aes256CbcEnc::new_from_slices(&self.key, self.iv())
            .map_err(|e| Error::InvalidKey(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(&mut buffer, msg_len)
            .map_err(|_| Error::Decode("buffer is not block aligned".to_string()))?;

        Ok(BASE64.encode(encrypted))
    }

    /// Decrypts base64 ciphertext and checks the embedded tenant id.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let mut buffer = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| Error::Decode(format!("ciphertext is not base64: {}", e)))?;

        if buffer.is_empty() || buffer.len() % IV_SIZE != 0 {
            return Err(Error::Decode(format!(
                "ciphertext length {} is not a multiple of the block size",
                buffer.len()
            )));
        }

        let decrypted_len = Aes256CbcDec::new_from_slices(&self.key, self.iv())
            .map_err(|e| Error::InvalidKey(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| Error::Decode("block decryption failed".to_string()))?
            .len();
        buffer.truncate(decrypted_len);

        let content = unpad(&buffer)?;
        let (payload, tenant) = split_content(content)?;

        if tenant != self.tenant_id.as_bytes() {
            return Err(Error::TenantMismatch {
                expected: self.tenant_id.clone(),
                actual: String::from_utf8_lossy(tenant).into_owned(),
            });
        }

        Ok(payload.to_vec())
    }

    fn iv(&self) -> &[u8] {
        &self.key[..IV_SIZE]
    }
}

/// Appends 1..=32 bytes, each holding the pad length.
pub(crate) fn pad(buffer: &mut Vec<u8>) {
    let pad_len = PAD_BLOCK - buffer.len() % PAD_BLOCK;
    buffer.resize(buffer.len() + pad_len, pad_len as u8);
}

/// Strips the padding added by [`pad`]. A trailing byte outside `1..=32`
/// (or longer than the buffer) means the ciphertext is corrupt.
pub(crate) fn unpad(buffer: &[u8]) -> Result<&[u8]> {
    let pad_len = match buffer.last() {
        Some(&b) => b as usize,
        None => return Err(Error::Decode("empty plaintext buffer".to_string())),
    };

    if !(1..=PAD_BLOCK).contains(&pad_len) || pad_len > buffer.len() {
        return Err(Error::Decode(format!("invalid padding length {}", pad_len)));
    }

    Ok(&buffer[..buffer.len() - pad_len])
}

/// Splits `seed | len | payload | tenant` into `(payload, tenant)`.
fn split_content(content: &[u8]) -> Result<(&[u8], &[u8])> {
    let header = SEED_SIZE + LENGTH_SIZE;
    if content.len() < header {
        return Err(Error::Decode(format!(
            "decrypted content too short: {} bytes",
            content.len()
        )));
    }

    let mut len_bytes = [0u8; LENGTH_SIZE];
    len_bytes.copy_from_slice(&content[SEED_SIZE..header]);
    let len = u32::from_be_bytes(len_bytes) as usize;

    let body = &content[header..];
    if len > body.len() {
        return Err(Error::Decode(format!(
            "declared payload length {} exceeds {} available bytes",
            len,
            body.len()
        )));
    }

    Ok(body.split_at(len))
}
