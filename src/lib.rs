// Credential graphs for components and applications
pub mod access;

// Message encryption and signatures
pub mod cipher;

// Time source for expiry decisions
pub mod clock;

// TOML configuration
pub mod config;

pub mod error;

// Remote platform API
pub mod platform;

// Per-tenant lookup and lazy construction
pub mod registry;

// Persistence backends
pub mod storage;

// Expiring and plain credential caches
pub mod store;

// Authorization notification receiver
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::{
    AccessContext, ApplicationCredentials, AuthType, ComponentCredentials, OAuthScope,
};
pub use cipher::MessageCipher;
pub use error::{Error, Result};
pub use registry::CredentialRegistry;
