//! The narrow directory interface consumed by the object engine.

use async_trait::async_trait;

use crate::{
    dn::DistinguishedName,
    entry::{DirectoryModification, Entry},
    filter::Filter,
    Result,
};

/// Directory backend operations.
///
/// Each call touches a single entry (or performs a single search) and is expected to be atomic
/// at the backend. Callers bound every call with their own deadline; implementations may apply
/// an additional transport-level timeout.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// Short backend name used in error messages.
    fn name(&self) -> &'static str;

    /// Fetches the entry at `dn`, or `None` when absent.
    async fn find_entry(&self, dn: &DistinguishedName) -> Result<Option<Entry>>;

    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AlreadyExists`] if an entry is already stored at the location.
    async fn create_entry(&self, entry: &Entry) -> Result<()>;

    /// Applies attribute modifications to an existing entry as a single atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the entry does not exist or a deleted value is
    /// absent, and [`crate::Error::AlreadyExists`] if an added value is already present.
    async fn modify_entry(
        &self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()>;

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the entry does not exist.
    async fn delete_entry(&self, dn: &DistinguishedName) -> Result<()>;

    /// Returns entries below `base` matching `filter`, at most `limit` of them.
    async fn search_entries(
        &self,
        base: &DistinguishedName,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>>;
}
