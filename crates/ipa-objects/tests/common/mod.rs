//! Shared setup for engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ipa_core::{
    DirectoryBackend, DirectoryModification, DistinguishedName, EngineConfig, Entry, Error,
    Filter, MemoryDirectory, Result,
};
use ipa_objects::{hbac, Directory, ObjectRegistry};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_DN: &str = "dc=example,dc=com";

/// Engine plus direct access to the store behind it.
pub struct Harness {
    pub directory: Directory,
    pub store: Arc<MemoryDirectory>,
    pub backend: Arc<FaultyBackend>,
}

pub fn engine_config() -> EngineConfig {
    EngineConfig::new(BASE_DN).unwrap()
}

pub fn setup() -> Harness {
    setup_with(engine_config(), None)
}

pub fn setup_with(config: EngineConfig, latency: Option<Duration>) -> Harness {
    let store = Arc::new(MemoryDirectory::new());
    let backend = Arc::new(FaultyBackend::new(Arc::clone(&store), latency));
    let registry = hbac::register_hbac(ObjectRegistry::builder(config.parse_base_dn().unwrap()))
        .unwrap()
        .build()
        .unwrap();
    let directory = Directory::new(registry, Arc::clone(&backend) as Arc<dyn DirectoryBackend>, config)
        .unwrap();
    Harness {
        directory,
        store,
        backend,
    }
}

pub fn service_dn(name: &str) -> DistinguishedName {
    DistinguishedName::parse(format!("cn={name},cn=hbacservices,cn=hbac,{BASE_DN}")).unwrap()
}

pub fn group_dn(name: &str) -> DistinguishedName {
    DistinguishedName::parse(format!("cn={name},cn=hbacservicegroups,cn=hbac,{BASE_DN}")).unwrap()
}

impl Harness {
    pub async fn create_service(&self, name: &str) {
        self.directory
            .object(hbac::HBAC_SERVICE)
            .unwrap()
            .create(name, [("description", format!("{name} service"))])
            .await
            .unwrap();
    }

    pub async fn create_group(&self, name: &str) {
        self.directory
            .object(hbac::HBAC_SERVICE_GROUP)
            .unwrap()
            .create(name, [("description", format!("{name} services"))])
            .await
            .unwrap();
    }

    /// Raw stored values of `attribute` on `dn`, lowercased and sorted.
    pub async fn stored(&self, dn: &DistinguishedName, attribute: &str) -> Vec<String> {
        let entry = self.store.find_entry(dn).await.unwrap().unwrap();
        let mut values = entry
            .values(attribute)
            .unwrap_or_default()
            .iter()
            .map(|v| v.to_lowercase())
            .collect::<Vec<_>>();
        values.sort();
        values
    }

    /// Asserts that every `member` value has a matching `memberof` value and vice versa.
    pub async fn assert_symmetric(&self) {
        let entries = self.store.snapshot().await;
        let holds = |dn: &str, attribute: &str, value: &str| {
            entries
                .iter()
                .find(|e| e.dn.as_str().eq_ignore_ascii_case(dn))
                .is_some_and(|e| e.has_value(attribute, value))
        };
        for entry in &entries {
            for member in entry.values("member").unwrap_or_default() {
                assert!(
                    holds(member, "memberof", entry.dn.as_str()),
                    "{member} lacks memberof {}",
                    entry.dn
                );
            }
            for container in entry.values("memberof").unwrap_or_default() {
                assert!(
                    holds(container, "member", entry.dn.as_str()),
                    "{container} lacks member {}",
                    entry.dn
                );
            }
        }
    }
}

struct Fault {
    dn: String,
    skip: usize,
    times: usize,
    error: Error,
}

/// Wraps a [`MemoryDirectory`] with injectable failures and uniform latency.
pub struct FaultyBackend {
    inner: Arc<MemoryDirectory>,
    faults: Mutex<Vec<Fault>>,
    read_faults: Mutex<Vec<(String, bool)>>,
    latency: Option<Duration>,
}

impl FaultyBackend {
    pub fn new(inner: Arc<MemoryDirectory>, latency: Option<Duration>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            read_faults: Mutex::new(Vec::new()),
            latency,
        }
    }

    /// Fails `times` modifications of `dn` after letting `skip` of them through.
    pub fn fail_modify(&self, dn: &DistinguishedName, skip: usize, times: usize, error: Error) {
        self.faults.lock().unwrap().push(Fault {
            dn: dn.normalized(),
            skip,
            times,
            error,
        });
    }

    /// Fails every read of `dn` once a modification of it has gone through.
    pub fn fail_reads_after_write(&self, dn: &DistinguishedName) {
        self.read_faults
            .lock()
            .unwrap()
            .push((dn.normalized(), false));
    }

    fn mark_written(&self, dn: &DistinguishedName) {
        let target = dn.normalized();
        for (fault_dn, armed) in self.read_faults.lock().unwrap().iter_mut() {
            if *fault_dn == target {
                *armed = true;
            }
        }
    }

    fn read_blocked(&self, dn: &DistinguishedName) -> bool {
        let target = dn.normalized();
        self.read_faults
            .lock()
            .unwrap()
            .iter()
            .any(|(fault_dn, armed)| *armed && *fault_dn == target)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn injected(&self, dn: &DistinguishedName) -> Option<Error> {
        let mut faults = self.faults.lock().unwrap();
        let fault = faults
            .iter_mut()
            .find(|f| f.dn == dn.normalized() && f.times > 0)?;
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        fault.times -= 1;
        Some(fault.error.clone())
    }
}

#[async_trait]
impl DirectoryBackend for FaultyBackend {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn find_entry(&self, dn: &DistinguishedName) -> Result<Option<Entry>> {
        self.delay().await;
        if self.read_blocked(dn) {
            return Err(Error::BackendUnavailable(format!("read of {dn} failed")));
        }
        self.inner.find_entry(dn).await
    }

    async fn create_entry(&self, entry: &Entry) -> Result<()> {
        self.delay().await;
        self.inner.create_entry(entry).await
    }

    async fn modify_entry(
        &self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        self.delay().await;
        if let Some(error) = self.injected(dn) {
            return Err(error);
        }
        self.inner.modify_entry(dn, modifications).await?;
        self.mark_written(dn);
        Ok(())
    }

    async fn delete_entry(&self, dn: &DistinguishedName) -> Result<()> {
        self.delay().await;
        self.inner.delete_entry(dn).await
    }

    async fn search_entries(
        &self,
        base: &DistinguishedName,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>> {
        self.delay().await;
        self.inner.search_entries(base, filter, limit).await
    }
}
