//! POSIX account entries: the typed model, creation requests and change sets.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    entry::EntryAttributes,
    password::{Credential, CRYPT_SCHEME_TAG, DISABLED_LOGIN},
};
use provisor_core::{AccountPolicy, Error, Result};

/// Object classes written on every new account.
pub const USER_OBJECT_CLASSES: &[&str] = &[
    "account",
    "posixAccount",
    "top",
    "shadowAccount",
    "ldapPublicKey",
    "inetLocalMailRecipient",
];

/// Object classes an account must carry after any modification.
pub const REQUIRED_USER_CLASSES: &[&str] = &["shadowAccount", "inetLocalMailRecipient"];

/// Shadow password aging values, in days since the Unix epoch or day counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShadowAging {
    /// `shadowLastChange`
    pub last_change: Option<i64>,
    /// `shadowMax`
    pub max: Option<i64>,
    /// `shadowWarning`
    pub warning: Option<i64>,
    /// `shadowInactive`
    pub inactive: Option<i64>,
    /// `shadowExpire`
    pub expire: Option<i64>,
}

/// Mail routing attributes, present only for accounts bound to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRouting {
    /// `host`
    pub host: String,
    /// `mailRoutingAddress`
    pub routing_address: String,
    /// `mailHost`
    pub mail_host: String,
}

impl MailRouting {
    /// Derives the routing attributes for `username` on `hostname`.
    #[must_use]
    pub fn for_host(username: &str, hostname: &str, policy: &AccountPolicy) -> Self {
        Self {
            host: hostname.to_string(),
            routing_address: policy.mail_routing_address(username),
            mail_host: format!("smtp:{hostname}"),
        }
    }

    fn write_to(&self, attributes: &mut EntryAttributes) {
        attributes.set_single("host", self.host.as_str());
        attributes.set_single("mailRoutingAddress", self.routing_address.as_str());
        attributes.set_single("mailHost", self.mail_host.as_str());
    }
}

/// A POSIX account as stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosixAccount {
    /// Login name (`uid`).
    pub username: String,
    /// `uidNumber`
    pub uid_number: u32,
    /// `gidNumber`
    pub gid_number: u32,
    /// `loginShell`
    #[serde(default)]
    pub login_shell: Option<String>,
    /// `homeDirectory`
    pub home_directory: String,
    /// `sshPublicKey` values.
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,
    /// Raw `userPassword`, including its scheme tag.
    #[serde(default, skip_serializing)]
    pub user_password: Option<String>,
    /// Shadow aging values.
    #[serde(default)]
    pub shadow: ShadowAging,
    /// Mail routing, when the account is bound to a host.
    #[serde(default)]
    pub mail: Option<MailRouting>,
}

impl PosixAccount {
    /// Parses an account from its directory attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if a mandatory attribute is missing or malformed.
    pub fn from_attributes(attributes: &EntryAttributes) -> Result<Self> {
        let username = required(attributes, "uid")?.to_string();
        let mail = match (
            attributes.first("host"),
            attributes.first("mailRoutingAddress"),
            attributes.first("mailHost"),
        ) {
            (Some(host), Some(routing_address), Some(mail_host)) => Some(MailRouting {
                host: host.to_string(),
                routing_address: routing_address.to_string(),
                mail_host: mail_host.to_string(),
            }),
            _ => None,
        };

        Ok(Self {
            uid_number: parse_number(attributes, "uidNumber")?,
            gid_number: parse_number(attributes, "gidNumber")?,
            login_shell: attributes.first("loginShell").map(str::to_string),
            home_directory: required(attributes, "homeDirectory")?.to_string(),
            ssh_public_keys: attributes
                .get("sshPublicKey")
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            user_password: attributes.first("userPassword").map(str::to_string),
            shadow: ShadowAging {
                last_change: optional_days(attributes, "shadowLastChange"),
                max: optional_days(attributes, "shadowMax"),
                warning: optional_days(attributes, "shadowWarning"),
                inactive: optional_days(attributes, "shadowInactive"),
                expire: optional_days(attributes, "shadowExpire"),
            },
            mail,
            username,
        })
    }

    /// Returns true if the stored credential is the disabled-login sentinel (or absent).
    #[must_use]
    pub fn is_login_disabled(&self) -> bool {
        self.user_password.as_deref().map_or(true, |stored| {
            stored == DISABLED_LOGIN || stored == format!("{CRYPT_SCHEME_TAG}{DISABLED_LOGIN}")
        })
    }
}

/// Request to create a new account.
#[derive(Debug)]
pub struct NewUser {
    username: String,
    ssh_public_keys: Vec<String>,
    hostname: Option<String>,
    shell: Option<String>,
    home_directory: Option<String>,
    credential: Credential,
    uid_number: Option<u32>,
    gid_number: Option<u32>,
    last_change: Option<i64>,
    max_days: Option<i64>,
    warning_days: Option<i64>,
}

impl NewUser {
    /// Starts a creation request with the two required fields.
    #[must_use]
    pub fn new(username: impl Into<String>, ssh_public_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ssh_public_keys: vec![ssh_public_key.into()],
            hostname: None,
            shell: None,
            home_directory: None,
            credential: Credential::Disabled,
            uid_number: None,
            gid_number: None,
            last_change: None,
            max_days: None,
            warning_days: None,
        }
    }

    /// Login name of the account to create.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Binds the account to a host, which also writes the mail routing attributes.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Appends another SSH public key.
    #[must_use]
    pub fn add_ssh_public_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_public_keys.push(key.into());
        self
    }

    /// Overrides the policy default shell.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Overrides the derived home directory.
    #[must_use]
    pub fn home_directory(mut self, home_directory: impl Into<String>) -> Self {
        self.home_directory = Some(home_directory.into());
        self
    }

    /// Sets the initial credential (login is disabled otherwise).
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Uses an explicit `uidNumber` instead of allocating one.
    #[must_use]
    pub const fn uid_number(mut self, uid: u32) -> Self {
        self.uid_number = Some(uid);
        self
    }

    /// Uses an explicit `gidNumber` instead of allocating one.
    #[must_use]
    pub const fn gid_number(mut self, gid: u32) -> Self {
        self.gid_number = Some(gid);
        self
    }

    /// Overrides `shadowLastChange` (defaults to today).
    #[must_use]
    pub const fn last_change(mut self, day: i64) -> Self {
        self.last_change = Some(day);
        self
    }

    /// Overrides `shadowMax`.
    #[must_use]
    pub const fn max_days(mut self, days: i64) -> Self {
        self.max_days = Some(days);
        self
    }

    /// Overrides `shadowWarning`.
    #[must_use]
    pub const fn warning_days(mut self, days: i64) -> Self {
        self.warning_days = Some(days);
        self
    }

    pub(crate) const fn requested_uid(&self) -> Option<u32> {
        self.uid_number
    }

    pub(crate) const fn requested_gid(&self) -> Option<u32> {
        self.gid_number
    }

    /// Composes the full attribute set of the new entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordHash`] if a plaintext credential cannot be hashed.
    pub fn to_attributes(
        &self,
        uid: u32,
        gid: u32,
        policy: &AccountPolicy,
        today: i64,
    ) -> Result<EntryAttributes> {
        let home = self
            .home_directory
            .clone()
            .unwrap_or_else(|| policy.home_directory_for(&self.username));
        let shell = self.shell.as_deref().unwrap_or(&policy.default_shell);

        let mut attributes = EntryAttributes::new();
        attributes.set("objectClass", USER_OBJECT_CLASSES.iter().copied());
        attributes.set_single("uid", self.username.as_str());
        attributes.set_single("cn", self.username.as_str());
        attributes.set_single("uidNumber", uid.to_string());
        attributes.set_single("gidNumber", gid.to_string());
        attributes.set_single("loginShell", shell);
        attributes.set_single("homeDirectory", home);
        attributes.set_single(
            "shadowLastChange",
            self.last_change.unwrap_or(today).to_string(),
        );
        attributes.set_single(
            "shadowMax",
            self.max_days.unwrap_or(policy.shadow_max_days).to_string(),
        );
        attributes.set_single(
            "shadowWarning",
            self.warning_days
                .unwrap_or(policy.shadow_warning_days)
                .to_string(),
        );
        attributes.set_single("shadowInactive", policy.shadow_never.to_string());
        attributes.set_single("shadowExpire", policy.shadow_never.to_string());
        attributes.set_single("userPassword", self.credential.to_user_password()?);
        attributes.set("sshPublicKey", self.ssh_public_keys.iter().map(String::as_str));

        if let Some(hostname) = &self.hostname {
            MailRouting::for_host(&self.username, hostname, policy).write_to(&mut attributes);
        }

        Ok(attributes)
    }
}

/// Field-by-field changes to an existing account. Unset fields are left untouched.
#[derive(Debug, Default)]
pub struct UserChanges {
    ssh_public_keys: Option<Vec<String>>,
    shell: Option<String>,
    home_directory: Option<String>,
    credential: Option<Credential>,
    uid_number: Option<u32>,
    gid_number: Option<u32>,
    last_change: Option<i64>,
    max_days: Option<i64>,
    warning_days: Option<i64>,
    hostname: Option<String>,
}

impl UserChanges {
    /// Empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all SSH public keys with `key`.
    #[must_use]
    pub fn ssh_public_key(self, key: impl Into<String>) -> Self {
        self.ssh_public_keys([key.into()])
    }

    /// Replaces all SSH public keys.
    #[must_use]
    pub fn ssh_public_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.ssh_public_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the login shell.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Replaces the home directory.
    #[must_use]
    pub fn home_directory(mut self, home_directory: impl Into<String>) -> Self {
        self.home_directory = Some(home_directory.into());
        self
    }

    /// Replaces the credential; also resets `shadowLastChange` to today.
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Replaces `uidNumber`.
    #[must_use]
    pub const fn uid_number(mut self, uid: u32) -> Self {
        self.uid_number = Some(uid);
        self
    }

    /// Replaces `gidNumber`.
    #[must_use]
    pub const fn gid_number(mut self, gid: u32) -> Self {
        self.gid_number = Some(gid);
        self
    }

    /// Replaces `shadowLastChange`; wins over the reset implied by a new credential.
    #[must_use]
    pub const fn last_change(mut self, day: i64) -> Self {
        self.last_change = Some(day);
        self
    }

    /// Replaces `shadowMax`.
    #[must_use]
    pub const fn max_days(mut self, days: i64) -> Self {
        self.max_days = Some(days);
        self
    }

    /// Replaces `shadowWarning`.
    #[must_use]
    pub const fn warning_days(mut self, days: i64) -> Self {
        self.warning_days = Some(days);
        self
    }

    /// Rebinds the account to `hostname`, rewriting all mail routing attributes.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Computes the entry that results from applying these changes to `current`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordHash`] if a plaintext credential cannot be hashed.
    pub fn apply(
        &self,
        username: &str,
        current: &EntryAttributes,
        policy: &AccountPolicy,
        today: i64,
    ) -> Result<EntryAttributes> {
        let mut next = current.clone();

        for class in REQUIRED_USER_CLASSES {
            next.push_value("objectClass", *class);
        }

        if let Some(keys) = &self.ssh_public_keys {
            next.set("sshPublicKey", keys.iter().map(String::as_str));
        }
        if let Some(shell) = &self.shell {
            next.set_single("loginShell", shell.as_str());
        }
        if let Some(home) = &self.home_directory {
            next.set_single("homeDirectory", home.as_str());
        }
        if let Some(credential) = &self.credential {
            next.set_single("userPassword", credential.to_user_password()?);
            next.set_single("shadowLastChange", today.to_string());
        }
        if let Some(day) = self.last_change {
            next.set_single("shadowLastChange", day.to_string());
        }
        if let Some(uid) = self.uid_number {
            next.set_single("uidNumber", uid.to_string());
        }
        if let Some(gid) = self.gid_number {
            next.set_single("gidNumber", gid.to_string());
        }
        if let Some(days) = self.max_days {
            next.set_single("shadowMax", days.to_string());
        }
        if let Some(days) = self.warning_days {
            next.set_single("shadowWarning", days.to_string());
        }

        next.set_if_absent("shadowInactive", policy.shadow_never.to_string());
        next.set_if_absent("shadowExpire", policy.shadow_never.to_string());

        if let Some(hostname) = &self.hostname {
            MailRouting::for_host(username, hostname, policy).write_to(&mut next);
        }

        Ok(next)
    }
}

fn required<'a>(attributes: &'a EntryAttributes, attribute: &str) -> Result<&'a str> {
    attributes
        .first(attribute)
        .ok_or_else(|| Error::InvalidRequest(format!("account entry missing `{attribute}`")))
}

fn parse_number(attributes: &EntryAttributes, attribute: &str) -> Result<u32> {
    let raw = required(attributes, attribute)?;
    raw.parse().map_err(|_| {
        Error::InvalidRequest(format!("account attribute `{attribute}` is not a number: {raw}"))
    })
}

fn optional_days(attributes: &EntryAttributes, attribute: &str) -> Option<i64> {
    let raw = attributes.first(attribute)?;
    match raw.parse() {
        Ok(days) => Some(days),
        Err(_) => {
            warn!(attribute, value = raw, "ignoring non-numeric shadow attribute");
            None
        }
    }
}

/// Days since the Unix epoch, the unit of `shadowLastChange`.
#[must_use]
pub fn days_since_epoch() -> i64 {
    chrono::Utc::now().timestamp() / 86_400
}
