//! Crate error type.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the credential layer and the message cipher.
#[derive(Debug, Error)]
pub enum Error {
    /// Decrypted payload carries a different tenant id than expected.
    #[error("tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch { expected: String, actual: String },

    /// Recomputed envelope signature does not match the supplied one.
    #[error("message signature mismatch")]
    SignatureMismatch,

    /// No refresh token on record for the user.
    #[error("user has not authorized the application")]
    UserNotAuthorized,

    /// The application has no parent component platform.
    #[error("no component platform configured for {0}")]
    ComponentNotConfigured(String),

    /// The appid is not a delegated application.
    #[error("{0} is not a delegated application")]
    RequiresDelegatedApplication(String),

    /// A refresh provider failed. `store` names the cache that was refreshing.
    #[error("expiring credential store [{store}]: {source}")]
    Refresh {
        store: String,
        #[source]
        source: Box<Error>,
    },

    /// A declared lifetime does not fit the clock's range.
    #[error("credential lifetime of {0}s is out of range")]
    InvalidLifetime(i64),

    /// The platform has not pushed a verify ticket yet.
    #[error("no verify ticket received for component {0}")]
    MissingVerifyTicket(String),

    /// Remote platform answered with a non-zero errcode.
    #[error("platform error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Ciphertext could not be decoded or unpadded.
    #[error("malformed ciphertext: {0}")]
    Decode(String),

    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("payload of {0} bytes is too large to encrypt")]
    PayloadTooLarge(usize),

    #[error("storage error: {0}")]
    Storage(String),

    /// A tenant configuration provider failed.
    #[error("provider error: {0}")]
    Provider(String),
}

impl Error {
    /// Returns the innermost error, skipping refresh annotations.
    pub fn root_cause(&self) -> &Error {
        let mut err = self;
        while let Error::Refresh { source, .. } = err {
            err = source;
        }
        err
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Error::Storage(format!("{:#}", err))
    }
}
