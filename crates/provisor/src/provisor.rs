//! The directory account manager.

use crate::{
    allocation::{next_free_id, IdNamespace},
    client::{LdapConnector, LdapEntry, LdapSession, RealLdapConnector, SearchScope},
    config::ProvisorConfig,
    dn::DistinguishedName,
    entry::{diff, DirectoryModification, EntryAttributes},
    group::{NewGroup, PosixGroup, MEMBER_ATTRIBUTE},
    user::{days_since_epoch, NewUser, PosixAccount, UserChanges},
};
use provisor_core::{BindCredentials, Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const ANY_OBJECT: &str = "(objectClass=*)";
const ALL_ATTRIBUTES: &[&str] = &["*"];

/// Future returned by the closure passed to [`Provisioner::scoped`].
pub type ScopedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Manages POSIX users and groups over one authenticated directory session.
///
/// The session is opened by [`Provisioner::connect`] and released by [`Provisioner::close`].
/// [`Provisioner::scoped`] wraps both around a closure and releases the session on every path.
///
/// Operations run one at a time on the session and are never retried. Identifier allocation
/// reads the directory and then writes it without any lock, so two processes provisioning at the
/// same moment can both be handed the same free `uidNumber`/`gidNumber`.
pub struct Provisioner {
    config: Arc<ProvisorConfig>,
    session: Option<Box<dyn LdapSession>>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("open", &self.session.is_some())
            .finish()
    }
}

impl Provisioner {
    /// Opens an encrypted session to the directory and binds with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration would produce an unencrypted
    /// session, [`Error::Connection`] if the transport or TLS negotiation fails, and
    /// [`Error::Authentication`] if the bind is rejected.
    pub async fn connect(config: ProvisorConfig, credentials: BindCredentials) -> Result<Self> {
        let config = Arc::new(config);
        let connector = RealLdapConnector::new(config.clone());
        Self::connect_with(config, &connector, &credentials).await
    }

    pub(crate) async fn connect_with(
        config: Arc<ProvisorConfig>,
        connector: &dyn LdapConnector,
        credentials: &BindCredentials,
    ) -> Result<Self> {
        config.validated()?;
        let mut session = connector.connect().await?;
        if let Err(err) = session
            .simple_bind(credentials.bind_dn(), credentials.bind_password())
            .await
        {
            error!(bind_dn = credentials.bind_dn(), error = %err, "directory bind failed");
            if let Err(unbind_err) = session.unbind().await {
                debug!(error = %unbind_err, "unbind after failed bind also failed");
            }
            return Err(err);
        }
        info!(url = config.url(), bind_dn = credentials.bind_dn(), "directory session bound");

        Ok(Self {
            config,
            session: Some(session),
        })
    }

    /// Connects, runs `operation`, and unbinds whether or not `operation` succeeded.
    ///
    /// An error from `operation` takes precedence over an error from unbinding.
    ///
    /// # Errors
    ///
    /// Returns any error from connecting, from `operation`, or from releasing the session.
    pub async fn scoped<T, F>(
        config: ProvisorConfig,
        credentials: BindCredentials,
        operation: F,
    ) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Provisioner) -> ScopedFuture<'a, T>,
    {
        let provisioner = Self::connect(config, credentials).await?;
        provisioner.run_scoped(operation).await
    }

    async fn run_scoped<T, F>(mut self, operation: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Provisioner) -> ScopedFuture<'a, T>,
    {
        let outcome = operation(&mut self).await;
        let released = self.close().await;
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) | (Ok(_), Err(err)) => Err(err),
        }
    }

    /// Unbinds and releases the session.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the unbind request could not be sent.
    pub async fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => {
                debug!(url = self.config.url(), "releasing directory session");
                session.unbind().await
            }
            None => Ok(()),
        }
    }

    /// Configuration the manager was built with.
    #[must_use]
    pub fn config(&self) -> &ProvisorConfig {
        &self.config
    }

    /// Authorization identity the server associates with this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not support the "Who am I?" operation.
    pub async fn whoami(&mut self) -> Result<Option<String>> {
        self.session()?.whoami().await
    }

    /// Lists the usernames directly under the user container, in no particular order.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    pub async fn list_usernames(&mut self) -> Result<Vec<String>> {
        let base = self.config.user_base_dn().clone();
        self.list_names(&base, "uid").await
    }

    /// Lists the group names directly under the group container, in no particular order.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    pub async fn list_groupnames(&mut self) -> Result<Vec<String>> {
        let base = self.config.group_base_dn().clone();
        self.list_names(&base, "cn").await
    }

    /// Returns true if an account named `username` exists.
    ///
    /// # Errors
    ///
    /// Propagates failures other than "no such entry".
    pub async fn user_exists(&mut self, username: &str) -> Result<bool> {
        let dn = self.config.user_dn(username);
        self.probe(&dn, "uid", username).await
    }

    /// Returns true if a group named `groupname` exists.
    ///
    /// # Errors
    ///
    /// Propagates failures other than "no such entry".
    pub async fn group_exists(&mut self, groupname: &str) -> Result<bool> {
        let dn = self.config.group_dn(groupname);
        self.probe(&dn, "cn", groupname).await
    }

    /// Returns true if `username` is listed in the membership of `group`.
    ///
    /// A missing group counts as "not a member".
    ///
    /// # Errors
    ///
    /// Propagates failures other than "no such entry".
    pub async fn is_group_member(&mut self, group: &str, username: &str) -> Result<bool> {
        let dn = self.config.group_dn(group);
        self.probe(&dn, MEMBER_ATTRIBUTE, username).await
    }

    /// Returns every `memberUid` value of `group` (possibly none).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the group does not exist.
    pub async fn list_group_members(&mut self, group: &str) -> Result<Vec<String>> {
        let dn = self.config.group_dn(group);
        let entry = self.read_entry(&dn, &[MEMBER_ATTRIBUTE]).await?;
        Ok(entry
            .attributes
            .get(MEMBER_ATTRIBUTE)
            .map(<[String]>::to_vec)
            .unwrap_or_default())
    }

    /// Fetches and parses the full account entry of `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the account does not exist.
    pub async fn fetch_user(&mut self, username: &str) -> Result<PosixAccount> {
        let dn = self.config.user_dn(username);
        let entry = self.read_entry(&dn, ALL_ATTRIBUTES).await?;
        PosixAccount::from_attributes(&entry.attributes)
    }

    /// Fetches and parses the full group entry of `groupname`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the group does not exist.
    pub async fn fetch_group(&mut self, groupname: &str) -> Result<PosixGroup> {
        let dn = self.config.group_dn(groupname);
        let entry = self.read_entry(&dn, ALL_ATTRIBUTES).await?;
        PosixGroup::from_attributes(&entry.attributes)
    }

    /// Smallest free `uidNumber`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NamespaceExhausted`] if the configured range is full.
    pub async fn next_uid(&mut self) -> Result<u32> {
        let base = self.config.user_base_dn().clone();
        self.next_id(&base, IdNamespace::Uid).await
    }

    /// Smallest free `gidNumber`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NamespaceExhausted`] if the configured range is full.
    pub async fn next_gid(&mut self) -> Result<u32> {
        let base = self.config.group_base_dn().clone();
        self.next_id(&base, IdNamespace::Gid).await
    }

    /// Creates an account, allocating `uidNumber`/`gidNumber` when they were not given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEntry`] if the account already exists.
    pub async fn add_user(&mut self, user: NewUser) -> Result<PosixAccount> {
        let uid = match user.requested_uid() {
            Some(uid) => uid,
            None => self.next_uid().await?,
        };
        let gid = match user.requested_gid() {
            Some(gid) => gid,
            None => self.next_gid().await?,
        };

        let attributes = user.to_attributes(uid, gid, self.config.policy(), days_since_epoch())?;
        let account = PosixAccount::from_attributes(&attributes)?;
        let dn = self.config.user_dn(user.username());
        debug!(dn = %dn, uid, gid, "adding account");
        let result = self.session()?.add(dn.as_str(), &attributes).await;
        logged("add_user", &dn, result)?;
        info!(username = user.username(), uid, gid, "account created");
        Ok(account)
    }

    /// Creates a group, allocating its `gidNumber` when it was not given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEntry`] if the group already exists.
    pub async fn add_group(&mut self, group: NewGroup) -> Result<PosixGroup> {
        let gid = match group.requested_gid() {
            Some(gid) => gid,
            None => self.next_gid().await?,
        };

        let attributes = group.to_attributes(gid);
        let created = PosixGroup::from_attributes(&attributes)?;
        let dn = self.config.group_dn(group.name());
        debug!(dn = %dn, gid, "adding group");
        let result = self.session()?.add(dn.as_str(), &attributes).await;
        logged("add_group", &dn, result)?;
        info!(group = group.name(), gid, "group created");
        Ok(created)
    }

    /// Applies `changes` to the account of `username` with a single modify request.
    ///
    /// Nothing is written when the changes leave the entry as it was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the account does not exist.
    pub async fn modify_user(&mut self, username: &str, changes: &UserChanges) -> Result<()> {
        let dn = self.config.user_dn(username);
        let current = self.read_entry(&dn, ALL_ATTRIBUTES).await?;
        let next = changes.apply(
            username,
            &current.attributes,
            self.config.policy(),
            days_since_epoch(),
        )?;

        let modifications = diff(&current.attributes, &next);
        if modifications.is_empty() {
            debug!(dn = %dn, "account already up to date");
            return Ok(());
        }

        let touched: Vec<&str> = modifications
            .iter()
            .map(DirectoryModification::attribute)
            .collect();
        debug!(dn = %dn, attributes = ?touched, "modifying account");
        let result = self.session()?.modify(dn.as_str(), &modifications).await;
        logged("modify_user", &dn, result)?;
        info!(username, "account modified");
        Ok(())
    }

    /// Adds `username` to the membership of `group`.
    ///
    /// The change is additive and does not read the current membership first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the group does not exist and
    /// [`Error::DuplicateEntry`] if `username` is already a member.
    pub async fn add_group_member(&mut self, group: &str, username: &str) -> Result<()> {
        let dn = self.config.group_dn(group);
        let mut membership = EntryAttributes::new();
        membership.set_single(MEMBER_ATTRIBUTE, username);
        let modifications = diff(&EntryAttributes::new(), &membership);

        let result = self.session()?.modify(dn.as_str(), &modifications).await;
        logged("add_group_member", &dn, result)?;
        info!(group, username, "group member added");
        Ok(())
    }

    /// Removes `username` from the membership of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAMember`] without writing anything if `username` is not listed, and
    /// [`Error::NoSuchEntry`] if the group does not exist.
    pub async fn del_group_member(&mut self, group: &str, username: &str) -> Result<()> {
        let dn = self.config.group_dn(group);
        let current = self.read_entry(&dn, &[MEMBER_ATTRIBUTE]).await?;
        let mut next = current.attributes.clone();
        if !next.remove_value(MEMBER_ATTRIBUTE, username) {
            return Err(Error::NotAMember {
                group: group.to_string(),
                member: username.to_string(),
            });
        }

        let modifications = diff(&current.attributes, &next);
        let result = self.session()?.modify(dn.as_str(), &modifications).await;
        logged("del_group_member", &dn, result)?;
        info!(group, username, "group member removed");
        Ok(())
    }

    /// Deletes the account of `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the account does not exist.
    pub async fn del_user(&mut self, username: &str) -> Result<()> {
        let dn = self.config.user_dn(username);
        let result = self.session()?.delete(dn.as_str()).await;
        logged("del_user", &dn, result)?;
        info!(username, "account deleted");
        Ok(())
    }

    /// Deletes the group `groupname`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchEntry`] if the group does not exist.
    pub async fn del_group(&mut self, groupname: &str) -> Result<()> {
        let dn = self.config.group_dn(groupname);
        let result = self.session()?.delete(dn.as_str()).await;
        logged("del_group", &dn, result)?;
        info!(group = groupname, "group deleted");
        Ok(())
    }

    fn session(&mut self) -> Result<&mut (dyn LdapSession + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| Error::Connection("directory session already released".to_string()))
    }

    async fn list_names(
        &mut self,
        base: &DistinguishedName,
        attribute: &'static str,
    ) -> Result<Vec<String>> {
        let result = self
            .session()?
            .search(base.as_str(), SearchScope::OneLevel, ANY_OBJECT, &[attribute])
            .await;
        let entries = logged("search", base, result)?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.attributes.first(attribute))
            .map(str::to_string)
            .collect())
    }

    async fn probe(&mut self, dn: &DistinguishedName, attribute: &str, value: &str) -> Result<bool> {
        match self.session()?.compare(dn.as_str(), attribute, value).await {
            Ok(matched) => Ok(matched),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => logged("compare", dn, Err(err)),
        }
    }

    async fn read_entry(
        &mut self,
        dn: &DistinguishedName,
        attributes: &[&'static str],
    ) -> Result<LdapEntry> {
        let result = self
            .session()?
            .search(dn.as_str(), SearchScope::Base, ANY_OBJECT, attributes)
            .await;
        logged("read", dn, result)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoSuchEntry(dn.to_string()))
    }

    async fn next_id(&mut self, base: &DistinguishedName, namespace: IdNamespace) -> Result<u32> {
        let attribute = namespace.attribute();
        let result = self
            .session()?
            .search(base.as_str(), SearchScope::OneLevel, ANY_OBJECT, &[attribute])
            .await;
        let entries = logged("search", base, result)?;

        let assigned = entries.iter().filter_map(|entry| {
            let raw = entry.attributes.first(attribute)?;
            match raw.parse::<u32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(dn = %entry.dn, attribute, value = raw, "ignoring non-numeric identifier");
                    None
                }
            }
        });
        let id = logged("allocate", base, next_free_id(assigned, self.config.policy(), namespace))?;
        debug!(%namespace, id, "allocated identifier");
        Ok(id)
    }
}

impl Drop for Provisioner {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                url = self.config.url(),
                "directory session dropped without close(); connection closed without unbind"
            );
        }
    }
}

fn logged<T>(operation: &'static str, dn: &DistinguishedName, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        if err.should_log() {
            error!(operation, dn = %dn, code = err.error_code(), error = %err, "directory operation failed");
        } else {
            debug!(operation, dn = %dn, code = err.error_code(), error = %err, "directory operation rejected");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockLdapConnector, MockLdapSession};
    use crate::password::Credential;
    use crate::testing::MemoryDirectory;
    use provisor_core::AccountPolicy;

    const USERS: &str = "ou=People,dc=hashbang,dc=sh";
    const GROUPS: &str = "ou=Group,dc=hashbang,dc=sh";

    fn config() -> Arc<ProvisorConfig> {
        let policy = AccountPolicy::new()
            .with_mail_domain("hashbang.sh")
            .with_excluded_ids([3002]);
        Arc::new(
            ProvisorConfig::new(
                "ldap://ldap.hashbang.sh",
                DistinguishedName::parse(USERS).unwrap(),
                DistinguishedName::parse(GROUPS).unwrap(),
            )
            .unwrap()
            .with_policy(policy),
        )
    }

    fn credentials() -> BindCredentials {
        BindCredentials::new("cn=provisor,dc=hashbang,dc=sh", "hunter2".to_string())
    }

    fn seeded() -> MemoryDirectory {
        let directory = MemoryDirectory::new("hunter2");
        for (name, id) in [("alice", 3000), ("bob", 3001)] {
            let attributes = NewUser::new(name, format!("ssh-ed25519 AAAA{name}"))
                .to_attributes(id, id, config().policy(), 20_000)
                .unwrap();
            directory.insert(&format!("uid={name},{USERS}"), attributes);
            let mut group = NewGroup::new(name).to_attributes(id);
            group.push_value(MEMBER_ATTRIBUTE, name);
            directory.insert(&format!("cn={name},{GROUPS}"), group);
        }
        directory
    }

    async fn open(directory: &MemoryDirectory) -> Provisioner {
        Provisioner::connect_with(config(), directory, &credentials())
            .await
            .unwrap()
    }

    fn connector_for(session: MockLdapSession) -> MockLdapConnector {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(Box::new(session)));
        connector
    }

    fn bound_session() -> MockLdapSession {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().returning(|_, _| Ok(()));
        session
    }

    #[tokio::test]
    async fn rejected_bind_releases_the_session() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .returning(|dn, _| Err(Error::Authentication(format!("bind as {dn} rejected"))));
        session.expect_unbind().times(1).returning(|| Ok(()));
        let connector = connector_for(session);

        let result = Provisioner::connect_with(config(), &connector, &credentials()).await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn bind_error_wins_over_unbind_error() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .returning(|_, _| Err(Error::Authentication("invalid credentials".to_string())));
        session
            .expect_unbind()
            .times(1)
            .returning(|| Err(Error::Connection("broken pipe".to_string())));
        let connector = connector_for(session);

        let result = Provisioner::connect_with(config(), &connector, &credentials()).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Authentication("invalid credentials".to_string())
        );
    }

    #[tokio::test]
    async fn unencrypted_configuration_never_connects() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let plaintext = Arc::new((*config()).clone().with_starttls(false));

        let result = Provisioner::connect_with(plaintext, &connector, &credentials()).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn missing_entry_does_not_exist() {
        let mut session = bound_session();
        session
            .expect_compare()
            .withf(|dn, attribute, value| {
                dn == "uid=zed,ou=People,dc=hashbang,dc=sh" && attribute == "uid" && value == "zed"
            })
            .returning(|dn, _, _| Err(Error::NoSuchEntry(dn.to_string())));
        session.expect_unbind().returning(|| Ok(()));
        let connector = connector_for(session);

        let mut provisioner = Provisioner::connect_with(config(), &connector, &credentials())
            .await
            .unwrap();
        assert!(!provisioner.user_exists("zed").await.unwrap());
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn removing_a_non_member_writes_nothing() {
        let mut session = bound_session();
        session.expect_search().returning(|base, _, _, _| {
            Ok(vec![LdapEntry {
                dn: base.to_string(),
                attributes: [("memberUid", vec!["alice"])].into_iter().collect(),
            }])
        });
        session.expect_modify().never();
        session.expect_unbind().returning(|| Ok(()));
        let connector = connector_for(session);

        let mut provisioner = Provisioner::connect_with(config(), &connector, &credentials())
            .await
            .unwrap();
        let err = provisioner.del_group_member("sudo", "mallory").await.unwrap_err();
        assert_eq!(
            err,
            Error::NotAMember {
                group: "sudo".to_string(),
                member: "mallory".to_string(),
            }
        );
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn add_group_member_is_a_single_additive_change() {
        let mut session = bound_session();
        session
            .expect_modify()
            .withf(|dn, modifications| {
                dn == "cn=sudo,ou=Group,dc=hashbang,dc=sh"
                    && *modifications
                        == [DirectoryModification::Add {
                            attribute: "memberUid".to_string(),
                            values: vec!["alice".to_string()],
                        }]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_unbind().returning(|| Ok(()));
        let connector = connector_for(session);

        let mut provisioner = Provisioner::connect_with(config(), &connector, &credentials())
            .await
            .unwrap();
        provisioner.add_group_member("sudo", "alice").await.unwrap();
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn scoped_session_is_released_when_the_operation_fails() {
        let directory = seeded();
        let provisioner = open(&directory).await;

        let result: Result<()> = provisioner
            .run_scoped(|p| Box::pin(async move { p.del_user("nobody").await }))
            .await;

        assert!(matches!(result, Err(Error::NoSuchEntry(_))));
        assert_eq!(directory.unbinds(), 1);
    }

    #[tokio::test]
    async fn scoped_session_returns_the_operation_value() {
        let directory = seeded();
        let provisioner = open(&directory).await;

        let names = provisioner
            .run_scoped(|p| Box::pin(async move { p.list_usernames().await }))
            .await
            .unwrap();

        assert_eq!(names.len(), 2);
        assert_eq!(directory.unbinds(), 1);
    }

    #[tokio::test]
    async fn add_user_allocates_the_next_free_identifiers() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        let account = provisioner
            .add_user(NewUser::new("carol", "ssh-ed25519 AAAAcarol").hostname("de1"))
            .await
            .unwrap();

        // 3002 is excluded by policy in both namespaces.
        assert_eq!(account.uid_number, 3003);
        assert_eq!(account.gid_number, 3003);
        assert!(provisioner.user_exists("carol").await.unwrap());

        let fetched = provisioner.fetch_user("carol").await.unwrap();
        assert_eq!(fetched, account);
        assert_eq!(fetched.home_directory, "/home/carol");
        assert_eq!(
            fetched.mail.map(|mail| mail.routing_address),
            Some("carol@hashbang.sh".to_string())
        );
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn escaped_username_is_listed() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        provisioner
            .add_user(NewUser::new("weird,name=x", "ssh-ed25519 AAAAweird"))
            .await
            .unwrap();

        assert!(provisioner.user_exists("weird,name=x").await.unwrap());
        let mut names = provisioner.list_usernames().await.unwrap();
        names.sort();
        assert_eq!(names, ["alice", "bob", "weird,name=x"]);
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_user_is_reported() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        let result = provisioner
            .add_user(NewUser::new("alice", "ssh-ed25519 AAAA").uid_number(5000).gid_number(5000))
            .await;
        assert!(matches!(result, Err(Error::DuplicateEntry(_))));
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn add_group_uses_the_allocated_gid() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        let group = provisioner.add_group(NewGroup::new("staff")).await.unwrap();
        assert_eq!(group.gid_number, 3003);
        assert_eq!(provisioner.fetch_group("staff").await.unwrap(), group);
        assert!(provisioner.group_exists("staff").await.unwrap());
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn non_numeric_identifiers_are_skipped_by_allocation() {
        let directory = seeded();
        let mut broken = NewGroup::new("broken").to_attributes(0);
        broken.set_single("gidNumber", "many");
        directory.insert(&format!("cn=broken,{GROUPS}"), broken);
        let mut provisioner = open(&directory).await;

        assert_eq!(provisioner.next_gid().await.unwrap(), 3003);
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn modify_shell_touches_only_login_shell() {
        let directory = seeded();
        let dn = format!("uid=alice,{USERS}");
        let before = directory.entry(&dn).unwrap();
        let mut provisioner = open(&directory).await;

        provisioner
            .modify_user("alice", &UserChanges::new().shell("/bin/zsh"))
            .await
            .unwrap();

        let mut expected = before;
        expected.set_single("loginShell", "/bin/zsh");
        assert_eq!(directory.entry(&dn).unwrap(), expected);
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn unchanged_account_skips_the_modify_request() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        provisioner
            .modify_user("alice", &UserChanges::new().shell("/bin/bash"))
            .await
            .unwrap();

        assert_eq!(directory.modifies(), 0);
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn credential_change_resets_last_change() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        provisioner
            .modify_user(
                "bob",
                &UserChanges::new().credential(Credential::plaintext("correct horse")),
            )
            .await
            .unwrap();

        let account = provisioner.fetch_user("bob").await.unwrap();
        assert_eq!(account.shadow.last_change, Some(days_since_epoch()));
        assert!(!account.is_login_disabled());
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn modifying_a_missing_user_fails() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        let result = provisioner
            .modify_user("zed", &UserChanges::new().shell("/bin/sh"))
            .await;
        assert!(matches!(result, Err(Error::NoSuchEntry(_))));
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn membership_round_trip() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        provisioner.add_group_member("alice", "bob").await.unwrap();
        assert!(provisioner.is_group_member("alice", "bob").await.unwrap());
        let mut members = provisioner.list_group_members("alice").await.unwrap();
        members.sort();
        assert_eq!(members, ["alice", "bob"]);

        let again = provisioner.add_group_member("alice", "bob").await;
        assert!(matches!(again, Err(Error::DuplicateEntry(_))));

        provisioner.del_group_member("alice", "bob").await.unwrap();
        provisioner.del_group_member("alice", "alice").await.unwrap();
        assert!(!provisioner.is_group_member("alice", "bob").await.unwrap());
        assert!(provisioner.list_group_members("alice").await.unwrap().is_empty());
        assert!(!provisioner.is_group_member("nogroup", "bob").await.unwrap());
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn deleted_entries_no_longer_exist() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        provisioner.del_user("bob").await.unwrap();
        provisioner.del_group("bob").await.unwrap();
        assert!(!provisioner.user_exists("bob").await.unwrap());
        assert!(!provisioner.group_exists("bob").await.unwrap());
        assert_eq!(provisioner.list_usernames().await.unwrap(), ["alice"]);
        assert_eq!(provisioner.list_groupnames().await.unwrap(), ["alice"]);

        let missing = provisioner.del_group("bob").await;
        assert!(matches!(missing, Err(Error::NoSuchEntry(_))));
        provisioner.close().await.unwrap();
    }

    #[tokio::test]
    async fn whoami_reports_the_bound_identity() {
        let directory = seeded();
        let mut provisioner = open(&directory).await;

        assert_eq!(
            provisioner.whoami().await.unwrap().as_deref(),
            Some("dn:cn=provisor,dc=hashbang,dc=sh")
        );
        provisioner.close().await.unwrap();
        assert_eq!(directory.unbinds(), 1);
    }
}
