//! In-memory directory backend.
//!
//! Mirrors the single-entry write semantics of an LDAP server: each call takes the store lock
//! once, so a modification either applies completely or not at all.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    backend::DirectoryBackend,
    dn::DistinguishedName,
    entry::{DirectoryModification, Entry},
    filter::Filter,
    Error, Result,
};

/// Directory backend that keeps entries in process memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true when no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns a snapshot of every stored entry, ordered by normalized DN.
    pub async fn snapshot(&self) -> Vec<Entry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Stores an entry unconditionally, replacing whatever was there.
    pub async fn insert_raw(&self, entry: Entry) {
        self.entries
            .write()
            .await
            .insert(entry.dn.normalized(), entry);
    }
}

#[async_trait]
impl DirectoryBackend for MemoryDirectory {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn find_entry(&self, dn: &DistinguishedName) -> Result<Option<Entry>> {
        Ok(self.entries.read().await.get(&dn.normalized()).cloned())
    }

    async fn create_entry(&self, entry: &Entry) -> Result<()> {
        let mut entries = self.entries.write().await;
        let key = entry.dn.normalized();
        if entries.contains_key(&key) {
            return Err(Error::AlreadyExists(format!("entry `{}`", entry.dn)));
        }
        debug!(dn = %entry.dn, "memory: create entry");
        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn modify_entry(
        &self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        let current = entries
            .get(&dn.normalized())
            .ok_or_else(|| Error::NotFound(format!("entry `{dn}`")))?;

        // Work on a copy so a failing modification leaves the stored entry untouched.
        let mut updated = current.clone();
        for modification in modifications {
            check_modification(&updated, modification)?;
            updated.apply(modification);
        }
        debug!(dn = %dn, count = modifications.len(), "memory: modify entry");
        entries.insert(dn.normalized(), updated);
        Ok(())
    }

    async fn delete_entry(&self, dn: &DistinguishedName) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(&dn.normalized()).is_none() {
            return Err(Error::NotFound(format!("entry `{dn}`")));
        }
        debug!(dn = %dn, "memory: delete entry");
        Ok(())
    }

    async fn search_entries(
        &self,
        base: &DistinguishedName,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>> {
        let entries = self.entries.read().await;
        let matches = entries
            .values()
            .filter(|entry| entry.dn.is_descendant_of(base) || entry.dn.matches(base))
            .filter(|entry| filter.matches(entry))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect::<Vec<_>>();
        debug!(base = %base, filter = %filter, found = matches.len(), "memory: search");
        Ok(matches)
    }
}

fn check_modification(entry: &Entry, modification: &DirectoryModification) -> Result<()> {
    match modification {
        DirectoryModification::Add { attribute, values } => {
            if let Some(existing) = values.iter().find(|v| entry.has_value(attribute, v)) {
                return Err(Error::AlreadyExists(format!(
                    "value `{existing}` already present in `{attribute}` of `{}`",
                    entry.dn
                )));
            }
        }
        DirectoryModification::Delete { attribute, values } => {
            if values.is_empty() && entry.values(attribute).is_none() {
                return Err(Error::NotFound(format!(
                    "attribute `{attribute}` of `{}`",
                    entry.dn
                )));
            }
            if let Some(missing) = values.iter().find(|v| !entry.has_value(attribute, v)) {
                return Err(Error::NotFound(format!(
                    "value `{missing}` in `{attribute}` of `{}`",
                    entry.dn
                )));
            }
        }
        DirectoryModification::Replace { .. } => {}
    }
    Ok(())
}
