//! AES-256-GCM sealing for credentials at rest.
//!
//! Every sealed field gets its own random 96-bit nonce, stored next to it.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Master key used by [`SqliteStorage`](super::SqliteStorage).
#[derive(Clone)]
pub struct SealingKey {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(..)")
    }
}

impl SealingKey {
    /// Builds a key from its base64 form. The decoded key must be 32 bytes.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64.trim())
            .context("Failed to decode base64 sealing key")?;

        if key_bytes.len() != KEY_SIZE {
            return Err(anyhow!(
                "Sealing key must be {} bytes, got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;
        Ok(Self { cipher })
    }

    /// Returns `(ciphertext, nonce)`, both base64.
    pub fn seal(&self, plaintext: &str) -> Result<(String, String)> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Sealing failed: {}", e))?;

        Ok((BASE64.encode(sealed), BASE64.encode(nonce)))
    }

    pub fn open(&self, ciphertext: &str, nonce: &str) -> Result<String> {
        let sealed = BASE64
            .decode(ciphertext)
            .context("Failed to decode sealed value")?;
        let nonce_bytes = BASE64.decode(nonce).context("Failed to decode nonce")?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(anyhow!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            ));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), sealed.as_ref())
            .map_err(|e| anyhow!("Opening failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Opened value is not valid UTF-8")
    }
}
