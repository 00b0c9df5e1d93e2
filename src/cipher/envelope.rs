use super::{random_seed, random_string, sign, MessageCipher};
use crate::error::{Error, Result};
use chrono::Utc;
use quick_xml::escape::escape;
use serde::Deserialize;
use tracing::warn;

const NONCE_LEN: usize = 16;

/// Outbound envelope: ciphertext plus the fields the receiver needs to verify it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: i64,
    pub nonce: String,
}

impl EncryptedEnvelope {
    /// Renders the XML document the platform expects as a passive reply.
    pub fn to_xml(&self) -> String {
        format!(
            "<xml><Encrypt><![CDATA[{}]]></Encrypt><MsgSignature>{}</MsgSignature><TimeStamp>{}</TimeStamp><Nonce>{}</Nonce></xml>",
            self.encrypt,
            escape(self.msg_signature.as_str()),
            self.timestamp,
            escape(self.nonce.as_str()),
        )
    }
}

/// Inbound envelope. Only the ciphertext travels in the body; signature,
/// timestamp and nonce arrive as query parameters.
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "Encrypt")]
    encrypt: String,
}

impl MessageCipher {
    /// Encrypts `plaintext` with a fresh seed and signs the result.
    ///
    /// `timestamp` and `nonce` default to now and a random 16-character string.
    pub fn encrypt_envelope(
        &self,
        plaintext: &[u8],
        timestamp: Option<i64>,
        nonce: Option<&str>,
    ) -> Result<EncryptedEnvelope> {
        let encrypt = self.encrypt(&random_seed(), plaintext)?;
        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let nonce = match nonce {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => random_string(NONCE_LEN),
        };

        let msg_signature = sign(&[
            self.token.as_str(),
            timestamp.to_string().as_str(),
            nonce.as_str(),
            encrypt.as_str(),
        ]);

        Ok(EncryptedEnvelope {
            encrypt,
            msg_signature,
            timestamp,
            nonce,
        })
    }

    /// Verifies the envelope signature, then decrypts its ciphertext.
    ///
    /// Nothing is decrypted unless the signature matches.
    pub fn decrypt_envelope(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let body = std::str::from_utf8(body)
            .map_err(|e| Error::Envelope(format!("body is not UTF-8: {}", e)))?;
        let envelope: InboundEnvelope =
            quick_xml::de::from_str(body).map_err(|e| Error::Envelope(e.to_string()))?;

        let expected = sign(&[self.token.as_str(), timestamp, nonce, envelope.encrypt.as_str()]);
        if expected != msg_signature {
            warn!(tenant = %self.tenant_id, "Envelope signature mismatch");
            return Err(Error::SignatureMismatch);
        }

        self.decrypt(&envelope.encrypt)
    }
}
