//! LDAP directory backend implementation.

use crate::{config::LdapConfig, Result};
use async_trait::async_trait;
use ipa_core::{
    DirectoryBackend, DirectoryModification, DistinguishedName, Entry, Error, Filter,
};
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchOptions};
use native_tls::{Certificate, TlsConnector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

const ALL_USER_ATTRIBUTES: &[&str] = &["*"];
const ANY_OBJECT_FILTER: &str = "(objectClass=*)";
const BACKEND_NAME: &str = "ldap";

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// LDAP entry as returned by the wire session.
#[derive(Debug, Clone)]
pub(crate) struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserved order from server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    fn into_entry(self) -> Result<Entry> {
        let dn = DistinguishedName::parse(&self.dn)?;
        Ok(Entry::from_attributes(dn, self.attributes))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        size_limit: Option<usize>,
    ) -> Result<Vec<LdapEntry>>;
    async fn add(&mut self, dn: &str, attributes: Vec<(String, Vec<String>)>) -> Result<()>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn delete(&mut self, dn: &str) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory backend speaking LDAP, with a pluggable connection layer.
///
/// Every operation opens a session, binds with the configured credentials, performs a single
/// request and unbinds.
pub struct LdapDirectory {
    config: Arc<LdapConfig>,
    connector: Box<dyn LdapConnector>,
}

impl LdapDirectory {
    /// Creates a backend that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: LdapConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(config: LdapConfig, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    async fn admin_session(&self) -> Result<Box<dyn LdapSession>> {
        let mut session = self.connector.connect().await?;
        let credentials = self.config.credentials();
        self.execute_with_timeout(
            session.simple_bind(credentials.bind_dn().as_str(), credentials.bind_password()),
        )
        .await?;
        Ok(session)
    }

    async fn release(&self, mut session: Box<dyn LdapSession>) {
        if let Err(err) = session.unbind().await {
            warn!("LDAP unbind failed: {err}");
        }
    }

    async fn execute_with_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        timeout(self.config.operation_timeout(), fut)
            .await
            .map_err(|_| Error::Timeout("LDAP operation timed out".to_string()))?
    }
}

#[async_trait]
impl DirectoryBackend for LdapDirectory {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn find_entry(&self, dn: &DistinguishedName) -> Result<Option<Entry>> {
        let mut session = self.admin_session().await?;
        let result = self
            .execute_with_timeout(session.search(
                dn.as_str(),
                SearchScope::Base,
                ANY_OBJECT_FILTER,
                Some(1),
            ))
            .await;
        self.release(session).await;

        match result {
            Ok(entries) => entries.into_iter().next().map(LdapEntry::into_entry).transpose(),
            Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_entry(&self, entry: &Entry) -> Result<()> {
        let attributes = entry
            .attributes()
            .map(|(key, values)| (key.to_string(), values.to_vec()))
            .collect::<Vec<_>>();
        debug!(dn = %entry.dn, "ldap: add entry");

        let mut session = self.admin_session().await?;
        let result = self
            .execute_with_timeout(session.add(entry.dn.as_str(), attributes))
            .await;
        self.release(session).await;
        result
    }

    async fn modify_entry(
        &self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        debug!(dn = %dn, count = modifications.len(), "ldap: modify entry");
        let mut session = self.admin_session().await?;
        let result = self
            .execute_with_timeout(session.modify(dn.as_str(), modifications))
            .await;
        self.release(session).await;
        result
    }

    async fn delete_entry(&self, dn: &DistinguishedName) -> Result<()> {
        debug!(dn = %dn, "ldap: delete entry");
        let mut session = self.admin_session().await?;
        let result = self.execute_with_timeout(session.delete(dn.as_str())).await;
        self.release(session).await;
        result
    }

    async fn search_entries(
        &self,
        base: &DistinguishedName,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>> {
        let filter = filter.to_ldap_string();
        debug!(base = %base, filter = %filter, ?limit, "ldap: search");

        let mut session = self.admin_session().await?;
        let result = self
            .execute_with_timeout(session.search(
                base.as_str(),
                SearchScope::Subtree,
                &filter,
                limit,
            ))
            .await;
        self.release(session).await;

        result?
            .into_iter()
            .map(LdapEntry::into_entry)
            .collect()
    }
}

/// Real LDAP connector backed by `ldap3`.
pub(crate) struct RealLdapConnector {
    config: Arc<LdapConfig>,
}

impl RealLdapConnector {
    pub(crate) fn new(config: Arc<LdapConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::Timeout("LDAP bind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(&result, dn)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        size_limit: Option<usize>,
    ) -> Result<Vec<LdapEntry>> {
        if let Some(limit) = size_limit {
            let limit = i32::try_from(limit).unwrap_or(i32::MAX);
            self.inner
                .with_search_options(SearchOptions::new().sizelimit(limit));
        }
        let result = timeout(
            self.operation_timeout,
            self.inner
                .search(base_dn, scope.into(), filter, ALL_USER_ATTRIBUTES.to_vec()),
        )
        .await
        .map_err(|_| Error::Timeout("LDAP search timed out".to_string()))?
        .map_err(map_ldap_error)?;

        let ldap3::SearchResult(entries, status) = result;
        check_search_result(status.rc, &status.text, entries.len(), size_limit, base_dn)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: Vec<(String, Vec<String>)>) -> Result<()> {
        let attrs = attributes
            .into_iter()
            .map(|(key, values)| (key, values.into_iter().collect::<HashSet<_>>()))
            .collect::<Vec<_>>();
        let result = timeout(self.operation_timeout, self.inner.add(dn, attrs))
            .await
            .map_err(|_| Error::Timeout("LDAP add timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(&result, dn)
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Delete { attribute, values } => Mod::Delete(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Replace { attribute, values } => Mod::Replace(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let result = timeout(self.operation_timeout, self.inner.modify(dn, mods))
            .await
            .map_err(|_| Error::Timeout("LDAP modify timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(&result, dn)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.delete(dn))
            .await
            .map_err(|_| Error::Timeout("LDAP delete timed out".to_string()))?
            .map_err(map_ldap_error)?;
        check_result(&result, dn)
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("LDAP unbind timed out".to_string()))?
            .map_err(map_ldap_error)?;
        Ok(())
    }
}

fn build_ldap_settings(config: &LdapConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

const RC_SUCCESS: u32 = 0;
const RC_TIME_LIMIT_EXCEEDED: u32 = 3;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_UNDEFINED_ATTRIBUTE_TYPE: u32 = 17;
const RC_CONSTRAINT_VIOLATION: u32 = 19;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_INVALID_ATTRIBUTE_SYNTAX: u32 = 21;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_BUSY: u32 = 51;
const RC_UNAVAILABLE: u32 = 52;
const RC_UNWILLING_TO_PERFORM: u32 = 53;
const RC_OBJECT_CLASS_VIOLATION: u32 = 65;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;
const RC_TIMEOUT: u32 = 85;

fn check_result(result: &ldap3::LdapResult, target: &str) -> Result<()> {
    if result.rc == RC_SUCCESS {
        return Ok(());
    }
    Err(translate_result_code(result.rc, &result.text, target))
}

/// Accepts sizeLimitExceeded only when the server stopped at the requested limit.
///
/// A server-side administrative limit below the requested one yields a partial page that
/// cannot be told apart from an exhaustive result, so it is reported as a backend error.
pub(crate) fn check_search_result(
    rc: u32,
    text: &str,
    returned: usize,
    size_limit: Option<usize>,
    target: &str,
) -> Result<()> {
    if rc == RC_SIZE_LIMIT_EXCEEDED && size_limit.is_some_and(|limit| returned >= limit) {
        return Ok(());
    }
    if rc == RC_SIZE_LIMIT_EXCEEDED {
        return Err(Error::BackendError {
            backend: BACKEND_NAME.to_string(),
            message: format!(
                "{target}: server size limit reached after {returned} entries (requested {size_limit:?})"
            ),
        });
    }
    if rc == RC_SUCCESS {
        return Ok(());
    }
    Err(translate_result_code(rc, text, target))
}

/// Translates an LDAP result code into the engine's error kinds.
pub(crate) fn translate_result_code(rc: u32, text: &str, target: &str) -> Error {
    let detail = if text.is_empty() {
        target.to_string()
    } else {
        format!("{target}: {text}")
    };
    match rc {
        RC_NO_SUCH_OBJECT | RC_NO_SUCH_ATTRIBUTE => Error::NotFound(detail),
        RC_ENTRY_ALREADY_EXISTS | RC_ATTRIBUTE_OR_VALUE_EXISTS => Error::AlreadyExists(detail),
        RC_BUSY | RC_UNAVAILABLE | RC_UNWILLING_TO_PERFORM => Error::BackendUnavailable(detail),
        RC_TIME_LIMIT_EXCEEDED | RC_TIMEOUT => Error::Timeout(detail),
        RC_CONSTRAINT_VIOLATION
        | RC_INVALID_ATTRIBUTE_SYNTAX
        | RC_OBJECT_CLASS_VIOLATION
        | RC_UNDEFINED_ATTRIBUTE_TYPE => Error::ValidationError(detail),
        RC_INVALID_CREDENTIALS => Error::ConfigError(format!("directory bind rejected for {target}")),
        _ => Error::BackendError {
            backend: BACKEND_NAME.to_string(),
            message: format!("result code {rc}: {detail}"),
        },
    }
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::BackendUnavailable(format!("{BACKEND_NAME}: {err}"))
}
