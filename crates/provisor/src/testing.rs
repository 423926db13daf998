//! In-memory directory used by the provisioning tests.

use crate::{
    client::{check_result_code, LdapConnector, LdapEntry, LdapSession, SearchScope},
    dn::DistinguishedName,
    entry::{DirectoryModification, EntryAttributes},
};
use async_trait::async_trait;
use provisor_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, EntryAttributes>,
    bound: Option<String>,
    unbinds: usize,
    modifies: usize,
}

/// Directory tree shared between the test and the sessions it hands out.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryDirectory {
    password: String,
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    pub(crate) fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            state: Arc::default(),
        }
    }

    pub(crate) fn insert(&self, dn: &str, attributes: EntryAttributes) {
        self.lock().entries.insert(dn.to_ascii_lowercase(), attributes);
    }

    pub(crate) fn entry(&self, dn: &str) -> Option<EntryAttributes> {
        self.lock().entries.get(&dn.to_ascii_lowercase()).cloned()
    }

    pub(crate) fn unbinds(&self) -> usize {
        self.lock().unbinds
    }

    pub(crate) fn modifies(&self) -> usize {
        self.lock().modifies
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl LdapConnector for MemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LdapSession for MemoryDirectory {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        if password != self.password {
            return Err(Error::Authentication(format!("bind as {dn} rejected")));
        }
        self.lock().bound = Some(dn.to_string());
        Ok(())
    }

    async fn whoami(&mut self) -> Result<Option<String>> {
        Ok(self.lock().bound.as_ref().map(|dn| format!("dn:{dn}")))
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        _filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let base = base_dn.to_ascii_lowercase();
        let state = self.lock();
        let matched: Vec<(&String, &EntryAttributes)> = match scope {
            SearchScope::Base => match state.entries.get_key_value(&base) {
                Some(found) => vec![found],
                None => return Err(Error::NoSuchEntry(base_dn.to_string())),
            },
            SearchScope::OneLevel => {
                let container = DistinguishedName::parse(&base)?;
                state
                    .entries
                    .iter()
                    .filter(|(dn, _)| {
                        DistinguishedName::parse(dn)
                            .ok()
                            .and_then(|dn| dn.parent())
                            .is_some_and(|parent| parent == container)
                    })
                    .collect()
            }
        };

        Ok(matched
            .into_iter()
            .map(|(dn, entry)| LdapEntry {
                dn: dn.clone(),
                attributes: project(entry, attributes),
            })
            .collect())
    }

    async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<bool> {
        let state = self.lock();
        let entry = state
            .entries
            .get(&dn.to_ascii_lowercase())
            .ok_or_else(|| Error::NoSuchEntry(dn.to_string()))?;
        Ok(entry.contains_value(attribute, value))
    }

    async fn add(&mut self, dn: &str, attributes: &EntryAttributes) -> Result<()> {
        let mut state = self.lock();
        let key = dn.to_ascii_lowercase();
        if state.entries.contains_key(&key) {
            return check_result_code(RC_ENTRY_ALREADY_EXISTS, "entry already exists", dn);
        }
        state.entries.insert(key, attributes.clone());
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        match self.lock().entries.remove(&dn.to_ascii_lowercase()) {
            Some(_) => Ok(()),
            None => check_result_code(RC_NO_SUCH_OBJECT, "no such object", dn),
        }
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mut state = self.lock();
        state.modifies += 1;
        let Some(current) = state.entries.get(&dn.to_ascii_lowercase()) else {
            return check_result_code(RC_NO_SUCH_OBJECT, "no such object", dn);
        };

        // Changes are all-or-nothing: work on a copy and commit at the end.
        let mut next = current.clone();
        for modification in modifications {
            match modification {
                DirectoryModification::Add { attribute, values } => {
                    for value in values {
                        if next.contains_value(attribute, value) {
                            return check_result_code(
                                RC_ATTRIBUTE_OR_VALUE_EXISTS,
                                "value exists",
                                dn,
                            );
                        }
                        next.push_value(attribute, value.as_str());
                    }
                }
                DirectoryModification::Delete { attribute, values } if values.is_empty() => {
                    next.remove(attribute);
                }
                DirectoryModification::Delete { attribute, values } => {
                    for value in values {
                        next.remove_value(attribute, value);
                    }
                }
                DirectoryModification::Replace { attribute, values } if values.is_empty() => {
                    next.remove(attribute);
                }
                DirectoryModification::Replace { attribute, values } => {
                    next.set(attribute, values.iter().map(String::as_str));
                }
            }
        }

        state.entries.insert(dn.to_ascii_lowercase(), next);
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.bound = None;
        state.unbinds += 1;
        Ok(())
    }
}

fn project(entry: &EntryAttributes, attributes: &[&str]) -> EntryAttributes {
    if attributes.contains(&"*") {
        return entry.clone();
    }
    entry
        .iter()
        .filter(|(name, _)| attributes.iter().any(|a| a.eq_ignore_ascii_case(name)))
        .map(|(name, values)| (name, values.to_vec()))
        .collect()
}
