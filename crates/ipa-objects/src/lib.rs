//! # ipa-objects
//!
//! Generic directory object engine.
//!
//! Entity types are described once as [`ObjectTypeConfig`] values and collected in an
//! [`ObjectRegistry`]. Every operation is generic over that configuration: entries are
//! encoded and decoded by the [`codec`], stored through the [`ObjectRepository`], and
//! group membership is kept symmetric on both sides by the [`MembershipManager`].
//!
//! ## Modules
//!
//! - [`schema`] - Attribute, relation and entity type descriptions
//! - [`registry`] - Startup registry of entity types
//! - [`object`] - Business objects and change sets
//! - [`codec`] - Object to entry mapping
//! - [`repository`] - Create, retrieve, update, delete and search
//! - [`membership`] - Member add/remove with paired reverse references
//! - [`summary`] - Operation summaries
//! - [`hbac`] - HBAC service and service group definitions

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
mod context;
mod directory;
pub mod hbac;
pub mod membership;
pub mod object;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod summary;

pub use directory::{members, Directory, ObjectApi};
pub use membership::{MemberFailure, MemberRef, MembershipManager, MembershipResult};
pub use object::{AttributeValue, BusinessObject, Changes};
pub use registry::{ObjectRegistry, ObjectRegistryBuilder};
pub use repository::{ObjectRepository, SearchRequest, SearchResult};
pub use schema::{AttributeSpec, Cardinality, ObjectTypeConfig, RelationSpec};
pub use summary::{OperationKind, Outcome};
