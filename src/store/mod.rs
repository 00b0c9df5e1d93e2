//! Credential caches built on the storage collaborators.
//!
//! - [`ExpiringCredentialStore`] renews its credential through a [`Refresher`]
//!   before the platform would reject it.
//! - [`SimpleCredentialStore`] holds values pushed by the platform itself.
//!
//! Each instance serializes all of its operations behind one lock, so there is at
//! most one refresh in flight per store instance. Reads of other keys on the same
//! instance wait for it.

mod expiring;
mod simple;


pub use expiring::{ExpiringCredentialStore, Refreshed, Refresher, DEFAULT_REFRESH_MARGIN};
pub use simple::SimpleCredentialStore;
