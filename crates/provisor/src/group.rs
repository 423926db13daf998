//! POSIX group entries.

use serde::{Deserialize, Serialize};

use crate::entry::EntryAttributes;
use provisor_core::{Error, Result};

/// Object classes written on every new group.
pub const GROUP_OBJECT_CLASSES: &[&str] = &["top", "posixGroup"];

/// Membership attribute of a POSIX group.
pub const MEMBER_ATTRIBUTE: &str = "memberUid";

/// A POSIX group as stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosixGroup {
    /// Group name (`cn`).
    pub name: String,
    /// `gidNumber`
    pub gid_number: u32,
    /// Usernames listed in `memberUid`.
    #[serde(default)]
    pub members: Vec<String>,
}

impl PosixGroup {
    /// Parses a group from its directory attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `cn` or `gidNumber` is missing or malformed.
    pub fn from_attributes(attributes: &EntryAttributes) -> Result<Self> {
        let name = attributes
            .first("cn")
            .ok_or_else(|| Error::InvalidRequest("group entry missing `cn`".to_string()))?;
        let raw_gid = attributes
            .first("gidNumber")
            .ok_or_else(|| Error::InvalidRequest(format!("group `{name}` missing `gidNumber`")))?;
        let gid_number = raw_gid.parse().map_err(|_| {
            Error::InvalidRequest(format!("group `{name}` has non-numeric gidNumber {raw_gid}"))
        })?;

        Ok(Self {
            name: name.to_string(),
            gid_number,
            members: attributes
                .get(MEMBER_ATTRIBUTE)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
        })
    }

    /// Returns the number of members in the group.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Checks whether `username` is a member of this group.
    #[must_use]
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|member| member == username)
    }
}

/// Request to create a new group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    name: String,
    gid_number: Option<u32>,
}

impl NewGroup {
    /// Starts a creation request; the `gidNumber` is allocated unless set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gid_number: None,
        }
    }

    /// Uses an explicit `gidNumber`.
    #[must_use]
    pub const fn gid_number(mut self, gid: u32) -> Self {
        self.gid_number = Some(gid);
        self
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) const fn requested_gid(&self) -> Option<u32> {
        self.gid_number
    }

    /// Composes the attribute set of the new entry.
    #[must_use]
    pub fn to_attributes(&self, gid: u32) -> EntryAttributes {
        let mut attributes = EntryAttributes::new();
        attributes.set("objectClass", GROUP_OBJECT_CLASSES.iter().copied());
        attributes.set_single("cn", self.name.as_str());
        attributes.set_single("gidNumber", gid.to_string());
        attributes
    }
}
