//! # ipa-core
//!
//! Core types shared by the directory object engine and its backends.
//!
//! This crate provides the error type, distinguished names, raw directory entries, search
//! filters and the narrow backend interface the engine consumes, along with an in-memory
//! backend suitable for tests and embedding.
//!
//! ## Modules
//!
//! - [`error`] - Error kinds and structured error responses
//! - [`dn`] - Distinguished name parsing and composition
//! - [`entry`] - Raw directory entries and attribute modifications
//! - [`filter`] - Search filters with LDAP rendering and in-memory evaluation
//! - [`backend`] - The `DirectoryBackend` trait consumed by the engine
//! - [`memory`] - In-memory `DirectoryBackend` implementation
//! - [`uuid`] - System-generated unique identifiers
//! - [`config`] - Engine configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod memory;
pub mod uuid;

// Re-export commonly used types
pub use backend::DirectoryBackend;
pub use config::EngineConfig;
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{DirectoryModification, Entry};
pub use error::{Error, Result};
pub use filter::Filter;
pub use memory::MemoryDirectory;
pub use uuid::UniqueId;
