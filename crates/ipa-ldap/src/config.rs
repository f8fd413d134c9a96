//! Configuration types for the LDAP backend.

use ipa_core::{DistinguishedName, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Credentials used to bind to the directory.
#[derive(Debug)]
pub struct BindCredentials {
    bind_dn: DistinguishedName,
    password: SecretString,
}

impl BindCredentials {
    /// Creates bind credentials.
    #[must_use]
    pub fn new(bind_dn: DistinguishedName, password: impl Into<String>) -> Self {
        Self {
            bind_dn,
            password: SecretString::from(password.into()),
        }
    }

    /// The DN to bind as.
    #[must_use]
    pub const fn bind_dn(&self) -> &DistinguishedName {
        &self.bind_dn
    }

    /// The bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Configuration for connecting to an LDAP directory.
#[derive(Debug)]
pub struct LdapConfig {
    url: String,
    credentials: BindCredentials,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl LdapConfig {
    /// Creates a new LDAP configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid or does not use an LDAP scheme.
    pub fn new(url: impl Into<String>, credentials: BindCredentials) -> Result<Self> {
        let url_string = url.into();
        let parsed = Url::parse(&url_string)?;
        if !matches!(parsed.scheme(), "ldap" | "ldaps" | "ldapi") {
            return Err(ipa_core::Error::ConfigError(format!(
                "unsupported directory URL scheme `{}`",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: url_string,
            credentials,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
