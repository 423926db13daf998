//! Account policy configuration.
//!
//! The policy holds the site-wide constants that shape every provisioned entry: the numeric
//! identifier range, identifiers that must never be handed out, and the defaults applied to new
//! accounts. It is fixed at initialization and shared read-only afterwards.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

/// Day count used by the shadow-aging attributes to mean "never".
pub const SHADOW_NEVER: i64 = 99_999;

/// Site policy applied when allocating identifiers and composing account entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AccountPolicy {
    /// Lowest identifier handed out (inclusive)
    #[serde(default = "default_min_id")]
    pub min_id: u32,

    /// Upper identifier bound (exclusive)
    #[serde(default = "default_max_id")]
    pub max_id: u32,

    /// Identifiers inside the range that are never allocated (e.g. `nobody`)
    #[serde(default = "default_excluded_ids")]
    pub excluded_ids: BTreeSet<u32>,

    /// Login shell for accounts created without an explicit shell
    #[validate(length(min = 1))]
    #[serde(default = "default_shell")]
    pub default_shell: String,

    /// Directory under which home directories are derived from the username
    #[validate(length(min = 1))]
    #[serde(default = "default_home_root")]
    pub home_root: String,

    /// Domain used for `mailRoutingAddress`
    #[validate(length(min = 1))]
    #[serde(default = "default_mail_domain")]
    pub mail_domain: String,

    /// Default `shadowMax` for new accounts
    #[validate(range(min = 0))]
    #[serde(default = "default_shadow_never")]
    pub shadow_max_days: i64,

    /// Default `shadowWarning` for new accounts
    #[validate(range(min = 0))]
    #[serde(default = "default_shadow_warning_days")]
    pub shadow_warning_days: i64,

    /// Value written to `shadowInactive` and `shadowExpire` when unset
    #[validate(range(min = 0))]
    #[serde(default = "default_shadow_never")]
    pub shadow_never: i64,
}

const fn default_min_id() -> u32 {
    3000
}

const fn default_max_id() -> u32 {
    1_000_000
}

fn default_excluded_ids() -> BTreeSet<u32> {
    BTreeSet::from([65534])
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_home_root() -> String {
    "/home".to_string()
}

fn default_mail_domain() -> String {
    "hashbang.sh".to_string()
}

const fn default_shadow_never() -> i64 {
    SHADOW_NEVER
}

const fn default_shadow_warning_days() -> i64 {
    7
}

impl AccountPolicy {
    /// Create a policy with the default identifier range and account defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_id: default_min_id(),
            max_id: default_max_id(),
            excluded_ids: default_excluded_ids(),
            default_shell: default_shell(),
            home_root: default_home_root(),
            mail_domain: default_mail_domain(),
            shadow_max_days: default_shadow_never(),
            shadow_warning_days: default_shadow_warning_days(),
            shadow_never: default_shadow_never(),
        }
    }

    /// Set the allocatable identifier range `[min, max)`.
    #[must_use]
    pub const fn with_id_range(mut self, min: u32, max: u32) -> Self {
        self.min_id = min;
        self.max_id = max;
        self
    }

    /// Replace the set of identifiers that are never allocated.
    #[must_use]
    pub fn with_excluded_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        self.excluded_ids = ids.into_iter().collect();
        self
    }

    /// Set the default login shell.
    #[must_use]
    pub fn with_default_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = shell.into();
        self
    }

    /// Set the root directory for derived home directories.
    #[must_use]
    pub fn with_home_root(mut self, root: impl Into<String>) -> Self {
        self.home_root = root.into();
        self
    }

    /// Set the mail routing domain.
    #[must_use]
    pub fn with_mail_domain(mut self, domain: impl Into<String>) -> Self {
        self.mail_domain = domain.into();
        self
    }

    /// Check field constraints and the identifier range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if a field is out of bounds, or
    /// [`Error::ConfigError`] if the identifier range is empty.
    pub fn validated(self) -> Result<Self, Error> {
        self.validate()?;
        if self.min_id >= self.max_id {
            return Err(Error::ConfigError(format!(
                "identifier range [{}, {}) is empty",
                self.min_id, self.max_id
            )));
        }
        Ok(self)
    }

    /// Returns true if `id` may never be allocated.
    #[must_use]
    pub fn is_excluded(&self, id: u32) -> bool {
        self.excluded_ids.contains(&id)
    }

    /// Home directory derived for `username`.
    #[must_use]
    pub fn home_directory_for(&self, username: &str) -> String {
        format!("{}/{}", self.home_root.trim_end_matches('/'), username)
    }

    /// Mail routing address for `username`.
    #[must_use]
    pub fn mail_routing_address(&self, username: &str) -> String {
        format!("{username}@{}", self.mail_domain)
    }
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self::new()
    }
}
