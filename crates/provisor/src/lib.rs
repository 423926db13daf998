//! Directory account manager for POSIX users and groups.
//!
//! A [`Provisioner`] holds one authenticated, encrypted LDAP session and offers the account
//! lifecycle on top of it: existence checks, listing, identifier allocation, creation,
//! read-modify-write updates, group membership and deletion.
//!
//! ```no_run
//! use provisor::{DistinguishedName, NewUser, Provisioner, ProvisorConfig};
//! use provisor_core::BindCredentials;
//!
//! # async fn example() -> provisor::Result<()> {
//! let config = ProvisorConfig::new(
//!     "ldap://ldap.hashbang.sh",
//!     DistinguishedName::parse("ou=People,dc=hashbang,dc=sh")?,
//!     DistinguishedName::parse("ou=Group,dc=hashbang,dc=sh")?,
//! )?;
//! let credentials = BindCredentials::new("cn=provisor,dc=hashbang,dc=sh", "secret".to_string());
//!
//! let account = Provisioner::scoped(config, credentials, |p| {
//!     Box::pin(async move {
//!         p.add_user(NewUser::new("alice", "ssh-ed25519 AAAA...").hostname("de1")).await
//!     })
//! })
//! .await?;
//! println!("created uid {}", account.uid_number);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod allocation;
mod client;
mod config;
mod dn;
mod entry;
mod group;
mod password;
mod provisor;
#[cfg(test)]
mod testing;
mod user;

pub use allocation::{next_free_id, IdNamespace};
pub use client::{LdapEntry, SearchScope};
pub use config::{ProvisorConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{diff, DirectoryModification, EntryAttributes};
pub use group::{NewGroup, PosixGroup, GROUP_OBJECT_CLASSES, MEMBER_ATTRIBUTE};
pub use password::{
    generate_salt, hash_password, hash_password_with_salt, strip_scheme_tag, verify_password,
    Credential, CRYPT_SCHEME_TAG, DISABLED_LOGIN,
};
pub use provisor::{Provisioner, ScopedFuture};
pub use user::{
    days_since_epoch, MailRouting, NewUser, PosixAccount, ShadowAging, UserChanges,
    REQUIRED_USER_CLASSES, USER_OBJECT_CLASSES,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = provisor_core::Result<T>;
