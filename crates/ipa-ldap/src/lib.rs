//! LDAP backend for the IPA directory object engine.
//!
//! This crate implements [`ipa_core::DirectoryBackend`] on top of `ldap3`, translating LDAP
//! result codes into the engine's error kinds so callers never see raw backend fault codes.

#![deny(missing_docs)]

mod client;
mod config;

pub use client::{LdapDirectory, SearchScope};
pub use config::{
    BindCredentials, LdapConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ipa_core::Result<T>;
