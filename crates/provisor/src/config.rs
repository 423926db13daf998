//! Connection configuration for the account manager.

use crate::dn::DistinguishedName;
use provisor_core::{AccountPolicy, Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Configuration for the provisioning session.
///
/// Fixed at construction and shared read-only by the manager for its whole lifetime.
#[derive(Debug, Clone, Validate)]
pub struct ProvisorConfig {
    url: String,
    user_base_dn: DistinguishedName,
    group_base_dn: DistinguishedName,
    starttls: bool,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    #[validate(range(min = 1, max = 300))]
    connection_timeout_secs: u64,
    #[validate(range(min = 1, max = 300))]
    operation_timeout_secs: u64,
    policy: AccountPolicy,
}

impl ProvisorConfig {
    /// Creates a configuration for the directory at `url`.
    ///
    /// StartTLS is enabled by default for `ldap://` URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL is invalid or not an LDAP URL.
    pub fn new(
        url: impl Into<String>,
        user_base_dn: DistinguishedName,
        group_base_dn: DistinguishedName,
    ) -> Result<Self> {
        let url_string = url.into();
        let parsed = Url::parse(&url_string)?;
        if !matches!(parsed.scheme(), "ldap" | "ldaps") {
            return Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{}`",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: url_string,
            user_base_dn,
            group_base_dn,
            starttls: true,
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            policy: AccountPolicy::default(),
        })
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Container holding user entries.
    #[must_use]
    pub const fn user_base_dn(&self) -> &DistinguishedName {
        &self.user_base_dn
    }

    /// Container holding group entries.
    #[must_use]
    pub const fn group_base_dn(&self) -> &DistinguishedName {
        &self.group_base_dn
    }

    /// DN of the entry for `username`.
    #[must_use]
    pub fn user_dn(&self, username: &str) -> DistinguishedName {
        self.user_base_dn.child("uid", username)
    }

    /// DN of the entry for `groupname`.
    #[must_use]
    pub fn group_dn(&self, groupname: &str) -> DistinguishedName {
        self.group_base_dn.child("cn", groupname)
    }

    /// Returns true when the URL uses implicit TLS (`ldaps://`).
    #[must_use]
    pub fn is_ldaps(&self) -> bool {
        self.url
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("ldaps://"))
    }

    /// Returns whether StartTLS is negotiated on plain `ldap://` connections.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
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

    /// Account policy applied to allocation and new entries.
    #[must_use]
    pub const fn policy(&self) -> &AccountPolicy {
        &self.policy
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
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

    /// Replaces the account policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AccountPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checks the whole configuration before a session is opened.
    ///
    /// Plaintext sessions are refused: the URL must be `ldaps://` or StartTLS must be enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an unencrypted configuration or an invalid policy and
    /// [`Error::ValidationError`] for out-of-range timeouts.
    pub fn validated(&self) -> Result<()> {
        self.validate()?;
        self.policy.clone().validated()?;
        if !self.is_ldaps() && !self.starttls {
            return Err(Error::ConfigError(format!(
                "refusing unencrypted session to {}: enable StartTLS or use ldaps://",
                self.url
            )));
        }
        Ok(())
    }
}
