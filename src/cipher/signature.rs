use super::SEED_SIZE;
use rand::{rngs::OsRng, Rng};
use sha1::{Digest, Sha1};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// SHA1 over the parts sorted lexicographically and joined without separator,
/// as lowercase hex.
pub fn sign(parts: &[&str]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha1::new();
    for part in sorted {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Checks the plain `signature` query parameter the platform sends when a
/// callback URL is first configured.
pub fn verify_url_signature(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
    sign(&[token, timestamp, nonce]) == signature
}

/// Signature handed to the browser-side JS SDK.
///
/// Parameters are sorted by name and joined as `k=v&...`. Empty values and a
/// zero timestamp are left out. The digest is rendered as uppercase hex.
pub fn js_api_signature(ticket: &str, nonce: &str, timestamp: i64, url: &str) -> String {
    let timestamp = match timestamp {
        0 => String::new(),
        t => t.to_string(),
    };
    let params = [
        ("jsapi_ticket", ticket),
        ("noncestr", nonce),
        ("timestamp", timestamp.as_str()),
        ("url", url),
    ];

    let query = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    hex::encode_upper(Sha1::digest(query.as_bytes()))
}

/// Random string over `[A-Za-z0-9]` from the OS generator.
pub fn random_string(len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[OsRng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Random 16-byte cipher seed, printable like the platform's own.
pub fn random_seed() -> [u8; SEED_SIZE] {
    let mut seed = [0u8; SEED_SIZE];
    for b in seed.iter_mut() {
        *b = ALPHABET[OsRng.gen_range(0..ALPHABET.len())];
    }
    seed
}
