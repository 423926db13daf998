//! LDAP session abstraction and the `ldap3` implementation behind it.

use crate::{
    config::ProvisorConfig,
    entry::{DirectoryModification, EntryAttributes},
};
use async_trait::async_trait;
use ldap3::{
    exop::{WhoAmI, WhoAmIResp},
    result::{CompareResult, SearchResult},
    LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry,
};
use native_tls::{Certificate, TlsConnector};
use provisor_core::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

// LDAP result codes (RFC 4511, appendix A).
const RC_SUCCESS: u32 = 0;
const RC_COMPARE_FALSE: u32 = 5;
const RC_COMPARE_TRUE: u32 = 6;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
        }
    }
}

/// LDAP entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attributes returned for the entry.
    pub attributes: EntryAttributes,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn whoami(&mut self) -> Result<Option<String>>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<bool>;
    async fn add(&mut self, dn: &str, attributes: &EntryAttributes) -> Result<()>;
    async fn delete(&mut self, dn: &str) -> Result<()>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Real LDAP connector backed by `ldap3`.
pub(crate) struct RealLdapConnector {
    config: Arc<ProvisorConfig>,
}

impl RealLdapConnector {
    pub(crate) fn new(config: Arc<ProvisorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        debug!(url = %self.config.url(), "connecting to directory");
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(|err| {
                Error::Connection(format!("failed to connect to {}: {err}", self.config.url()))
            })?;
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(error = %err, "directory connection driver error");
            }
        });
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

async fn timed<F, T>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = ldap3::result::Result<T>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(format!("directory {operation} timed out")))?
        .map_err(map_ldap_error)
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let limit = self.operation_timeout;
        let result = timed(limit, "bind", self.inner.simple_bind(dn, password)).await?;
        check_bind_result(result.rc, &result.text, dn)
    }

    async fn whoami(&mut self) -> Result<Option<String>> {
        let limit = self.operation_timeout;
        let result = timed(limit, "whoami", self.inner.extended(WhoAmI)).await?;
        let (exop, _) = result.success().map_err(map_ldap_error)?;
        let response: WhoAmIResp = exop.parse();
        Ok(Some(response.authzid).filter(|authzid| !authzid.is_empty()))
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let limit = self.operation_timeout;
        let SearchResult(entries, outcome) = timed(
            limit,
            "search",
            self.inner
                .search(base_dn, scope.into(), filter, attributes.to_vec()),
        )
        .await?;
        check_result_code(outcome.rc, &outcome.text, base_dn)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: EntryAttributes::from(entry.attrs),
            })
            .collect())
    }

    async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<bool> {
        let limit = self.operation_timeout;
        let CompareResult(result) =
            timed(limit, "compare", self.inner.compare(dn, attribute, value)).await?;
        match result.rc {
            RC_COMPARE_TRUE => Ok(true),
            RC_COMPARE_FALSE | RC_NO_SUCH_ATTRIBUTE => Ok(false),
            rc => check_result_code(rc, &result.text, dn).map(|()| false),
        }
    }

    async fn add(&mut self, dn: &str, attributes: &EntryAttributes) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| {
                (
                    name,
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();
        let limit = self.operation_timeout;
        let result = timed(limit, "add", self.inner.add(dn, attrs)).await?;
        check_result_code(result.rc, &result.text, dn)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let limit = self.operation_timeout;
        let result = timed(limit, "delete", self.inner.delete(dn)).await?;
        check_result_code(result.rc, &result.text, dn)
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
                DirectoryModification::Delete { attribute, values } => Mod::Delete(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
                DirectoryModification::Replace { attribute, values } => Mod::Replace(
                    attribute.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let limit = self.operation_timeout;
        let result = timed(limit, "modify", self.inner.modify(dn, mods)).await?;
        check_result_code(result.rc, &result.text, dn)
    }

    async fn unbind(&mut self) -> Result<()> {
        let limit = self.operation_timeout;
        timed(limit, "unbind", self.inner.unbind()).await
    }
}

fn build_ldap_settings(config: &ProvisorConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.starttls() && !config.is_ldaps());

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
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
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

fn map_ldap_error(err: LdapError) -> Error {
    match err {
        LdapError::LdapResult { result } => {
            check_result_code(result.rc, &result.text, "").err().unwrap_or_else(|| {
                Error::Directory {
                    code: result.rc,
                    message: result.text,
                }
            })
        }
        other => Error::Connection(other.to_string()),
    }
}

fn check_bind_result(rc: u32, text: &str, dn: &str) -> Result<()> {
    match rc {
        RC_INVALID_CREDENTIALS => Err(Error::Authentication(format!(
            "bind as {dn} rejected: {text}"
        ))),
        rc => check_result_code(rc, text, dn),
    }
}

/// Maps a non-success LDAP result code onto the error taxonomy.
pub(crate) fn check_result_code(rc: u32, text: &str, dn: &str) -> Result<()> {
    match rc {
        RC_SUCCESS => Ok(()),
        RC_NO_SUCH_OBJECT => Err(Error::NoSuchEntry(dn.to_string())),
        RC_ENTRY_ALREADY_EXISTS => Err(Error::DuplicateEntry(dn.to_string())),
        RC_ATTRIBUTE_OR_VALUE_EXISTS => Err(Error::DuplicateEntry(format!(
            "{dn}: attribute value already present"
        ))),
        RC_INVALID_CREDENTIALS => Err(Error::Authentication(text.to_string())),
        code => Err(Error::Directory {
            code,
            message: text.to_string(),
        }),
    }
}
