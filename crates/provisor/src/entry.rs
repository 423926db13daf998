//! Attribute maps and the old/new diff used for read-modify-write updates.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Multi-valued attribute map of a directory entry.
///
/// Attribute names are matched case-insensitively, as the directory does; the spelling used by
/// the first writer of an attribute is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryAttributes {
    inner: BTreeMap<String, Vec<String>>,
}

impl EntryAttributes {
    /// Creates an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.key_of(attribute)
            .and_then(|key| self.inner.get(key))
            .map(Vec::as_slice)
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.get(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns true if the attribute holds at least one value.
    #[must_use]
    pub fn has(&self, attribute: &str) -> bool {
        self.get(attribute).is_some_and(|values| !values.is_empty())
    }

    /// Returns true if the attribute holds exactly `value`.
    #[must_use]
    pub fn contains_value(&self, attribute: &str, value: &str) -> bool {
        self.get(attribute)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }

    /// Replaces every value of the attribute.
    pub fn set<I, V>(&mut self, attribute: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        let key = self
            .key_of(attribute)
            .map_or_else(|| attribute.to_string(), str::to_string);
        self.inner.insert(key, values);
    }

    /// Replaces the attribute with a single value.
    pub fn set_single(&mut self, attribute: &str, value: impl Into<String>) {
        self.set(attribute, [value.into()]);
    }

    /// Sets the attribute only when it currently has no value.
    pub fn set_if_absent(&mut self, attribute: &str, value: impl Into<String>) {
        if !self.has(attribute) {
            self.set_single(attribute, value);
        }
    }

    /// Appends `value` unless it is already present.
    pub fn push_value(&mut self, attribute: &str, value: impl Into<String>) {
        let value = value.into();
        if self.contains_value(attribute, &value) {
            return;
        }
        match self.key_of(attribute).map(str::to_string) {
            Some(key) => self.inner.entry(key).or_default().push(value),
            None => {
                self.inner.insert(attribute.to_string(), vec![value]);
            }
        }
    }

    /// Removes `value` from the attribute, returning whether it was present.
    pub fn remove_value(&mut self, attribute: &str, value: &str) -> bool {
        let Some(key) = self.key_of(attribute).map(str::to_string) else {
            return false;
        };
        let Some(values) = self.inner.get_mut(&key) else {
            return false;
        };
        let before = values.len();
        values.retain(|v| v != value);
        before != values.len()
    }

    /// Removes the attribute entirely.
    pub fn remove(&mut self, attribute: &str) -> Option<Vec<String>> {
        let key = self.key_of(attribute)?.to_string();
        self.inner.remove(&key)
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.inner
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true when no attribute is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn key_of(&self, attribute: &str) -> Option<&str> {
        self.inner
            .keys()
            .find(|key| key.eq_ignore_ascii_case(attribute))
            .map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, Vec<V>)> for EntryAttributes
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, Vec<V>)>>(iter: T) -> Self {
        let mut attributes = Self::new();
        for (name, values) in iter {
            attributes.set(name.as_ref(), values);
        }
        attributes
    }
}

impl From<HashMap<String, Vec<String>>> for EntryAttributes {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        map.into_iter().collect()
    }
}

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Attribute targeted by this modification.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Delete { attribute, .. }
            | Self::Replace { attribute, .. } => attribute,
        }
    }
}

/// Computes the attribute-level changes that turn `old` into `new`.
///
/// * attribute only in `new` → [`DirectoryModification::Add`]
/// * value set differs (order ignored) → [`DirectoryModification::Replace`]
/// * attribute missing or empty in `new` → [`DirectoryModification::Delete`] with no values
///
/// Identical attributes produce nothing, so an unchanged entry yields an empty list.
#[must_use]
pub fn diff(old: &EntryAttributes, new: &EntryAttributes) -> Vec<DirectoryModification> {
    let mut modifications = Vec::new();

    for (attribute, new_values) in new.iter() {
        if new_values.is_empty() {
            continue;
        }
        match old.get(attribute) {
            Some(old_values) if !old_values.is_empty() => {
                if !same_value_set(old_values, new_values) {
                    modifications.push(DirectoryModification::Replace {
                        attribute: attribute.to_string(),
                        values: new_values.to_vec(),
                    });
                }
            }
            _ => modifications.push(DirectoryModification::Add {
                attribute: attribute.to_string(),
                values: new_values.to_vec(),
            }),
        }
    }

    for (attribute, old_values) in old.iter() {
        if !old_values.is_empty() && !new.has(attribute) {
            modifications.push(DirectoryModification::Delete {
                attribute: attribute.to_string(),
                values: Vec::new(),
            });
        }
    }

    modifications
}

fn same_value_set(left: &[String], right: &[String]) -> bool {
    let left: HashSet<&str> = left.iter().map(String::as_str).collect();
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: Vec<(&str, Vec<&str>)>) -> EntryAttributes {
        pairs.into_iter().collect()
    }

    #[test]
    fn lookups_ignore_attribute_case() {
        let mut entry = attrs(vec![("objectClass", vec!["top", "posixGroup"])]);
        assert!(entry.contains_value("objectclass", "posixGroup"));

        entry.push_value("OBJECTCLASS", "extensibleObject");
        assert_eq!(entry.len(), 1);
        assert_eq!(entry.get("objectClass").map(<[String]>::len), Some(3));

        entry.set_single("ObjectClass", "top");
        assert_eq!(entry.iter().next().map(|(name, _)| name), Some("objectClass"));
    }

    #[test]
    fn push_and_remove_values() {
        let mut entry = EntryAttributes::new();
        entry.push_value("memberUid", "alice");
        entry.push_value("memberUid", "alice");
        entry.push_value("memberUid", "bob");
        assert_eq!(entry.get("memberUid").unwrap(), ["alice", "bob"]);

        assert!(entry.remove_value("memberUid", "alice"));
        assert!(!entry.remove_value("memberUid", "alice"));
        assert!(!entry.remove_value("description", "alice"));
        assert_eq!(entry.first("memberUid"), Some("bob"));
    }

    #[test]
    fn set_if_absent_keeps_existing_value() {
        let mut entry = attrs(vec![("shadowExpire", vec!["19000"])]);
        entry.set_if_absent("shadowExpire", "99999");
        entry.set_if_absent("shadowInactive", "99999");
        assert_eq!(entry.first("shadowExpire"), Some("19000"));
        assert_eq!(entry.first("shadowInactive"), Some("99999"));
    }

    #[test]
    fn diff_of_identical_entries_is_empty() {
        let entry = attrs(vec![("loginShell", vec!["/bin/bash"]), ("uid", vec!["alice"])]);
        assert!(diff(&entry, &entry.clone()).is_empty());
    }

    #[test]
    fn diff_emits_add_replace_delete() {
        let old = attrs(vec![
            ("loginShell", vec!["/bin/bash"]),
            ("mailHost", vec!["smtp:old"]),
            ("uid", vec!["alice"]),
        ]);
        let new = attrs(vec![
            ("loginShell", vec!["/bin/zsh"]),
            ("host", vec!["host1"]),
            ("uid", vec!["alice"]),
        ]);

        let mods = diff(&old, &new);
        assert_eq!(
            mods,
            vec![
                DirectoryModification::Add {
                    attribute: "host".to_string(),
                    values: vec!["host1".to_string()],
                },
                DirectoryModification::Replace {
                    attribute: "loginShell".to_string(),
                    values: vec!["/bin/zsh".to_string()],
                },
                DirectoryModification::Delete {
                    attribute: "mailHost".to_string(),
                    values: Vec::new(),
                },
            ]
        );
    }

    #[test]
    fn modifications_name_their_attribute() {
        let old = attrs(vec![("loginShell", vec!["/bin/bash"]), ("host", vec!["de1"])]);
        let new = attrs(vec![("loginShell", vec!["/bin/zsh"]), ("mailHost", vec!["smtp:de1"])]);

        let changes = diff(&old, &new);
        let mut touched: Vec<&str> = changes.iter().map(DirectoryModification::attribute).collect();
        touched.sort_unstable();
        assert_eq!(touched, ["host", "loginShell", "mailHost"]);
    }

    #[test]
    fn diff_ignores_value_order() {
        let old = attrs(vec![("memberUid", vec!["alice", "bob"])]);
        let new = attrs(vec![("memberUid", vec!["bob", "alice"])]);
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn emptied_attribute_is_deleted() {
        let old = attrs(vec![("memberUid", vec!["alice"])]);
        let mut new = old.clone();
        new.remove_value("memberUid", "alice");

        assert_eq!(
            diff(&old, &new),
            vec![DirectoryModification::Delete {
                attribute: "memberUid".to_string(),
                values: Vec::new(),
            }]
        );
    }

    #[test]
    fn diff_from_empty_is_additive() {
        let new = attrs(vec![("memberUid", vec!["carol"])]);
        let mods = diff(&EntryAttributes::new(), &new);
        assert_eq!(mods.len(), 1);
        assert!(matches!(&mods[0], DirectoryModification::Add { attribute, values }
            if attribute == "memberUid" && values == &["carol"]));
    }
}
