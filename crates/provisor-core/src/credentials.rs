//! Bind credentials for the directory session.

use secrecy::{ExposeSecret, SecretString};

/// Credentials used to bind the provisioning session.
///
/// The password is held as a [`SecretString`] so it is redacted from `Debug` output and
/// zeroized on drop.
#[derive(Debug)]
pub struct BindCredentials {
    bind_dn: String,
    password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    ///
    /// # Arguments
    ///
    /// * `bind_dn` - The DN of the provisioning account
    /// * `password` - The bind secret
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: password.into(),
        }
    }

    /// Get the LDAP bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the LDAP bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.password.expose_secret()
    }
}
