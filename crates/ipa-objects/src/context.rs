//! Shared engine state and deadline-bounded backend access.

use ipa_core::{
    DirectoryBackend, DirectoryModification, DistinguishedName, EngineConfig, Entry, Error,
    Filter, Result,
};
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

use crate::registry::ObjectRegistry;
use crate::schema::ObjectTypeConfig;

/// State shared by the repository and the membership manager.
pub(crate) struct EngineContext {
    pub(crate) registry: Arc<ObjectRegistry>,
    pub(crate) config: EngineConfig,
    backend: Arc<dyn DirectoryBackend>,
}

impl EngineContext {
    pub(crate) fn new(
        registry: Arc<ObjectRegistry>,
        backend: Arc<dyn DirectoryBackend>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            config,
            backend,
        }
    }

    async fn execute_with_timeout<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        timeout(self.config.operation_timeout(), fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} {operation} exceeded {}s",
                    self.backend.name(),
                    self.config.operation_timeout_secs
                ))
            })?
    }

    pub(crate) async fn find_entry(&self, dn: &DistinguishedName) -> Result<Option<Entry>> {
        debug!(dn = %dn, "find entry");
        self.execute_with_timeout("find", self.backend.find_entry(dn))
            .await
    }

    pub(crate) async fn create_entry(&self, entry: &Entry) -> Result<()> {
        debug!(dn = %entry.dn, "create entry");
        self.execute_with_timeout("create", self.backend.create_entry(entry))
            .await
    }

    pub(crate) async fn modify_entry(
        &self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        debug!(dn = %dn, ?modifications, "modify entry");
        self.execute_with_timeout("modify", self.backend.modify_entry(dn, modifications))
            .await
    }

    pub(crate) async fn delete_entry(&self, dn: &DistinguishedName) -> Result<()> {
        debug!(dn = %dn, "delete entry");
        self.execute_with_timeout("delete", self.backend.delete_entry(dn))
            .await
    }

    pub(crate) async fn search_entries(
        &self,
        base: &DistinguishedName,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>> {
        debug!(base = %base, filter = %filter, ?limit, "search entries");
        self.execute_with_timeout("search", self.backend.search_entries(base, filter, limit))
            .await
    }

    /// Fetches the entry of `config` with normalized primary key `key`.
    pub(crate) async fn load(&self, config: &ObjectTypeConfig, key: &str) -> Result<Entry> {
        let dn = self.registry.entry_dn(config, key);
        self.find_entry(&dn)
            .await?
            .ok_or_else(|| not_found(config, key))
    }
}

pub(crate) fn not_found(config: &ObjectTypeConfig, key: &str) -> Error {
    Error::NotFound(format!("{} \"{key}\" not found", config.object_name()))
}
