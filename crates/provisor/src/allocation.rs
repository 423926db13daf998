//! Numeric identifier allocation.

use std::collections::BTreeSet;
use std::fmt;

use provisor_core::{AccountPolicy, Error, Result};

/// The two independent identifier namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdNamespace {
    /// `uidNumber` of user entries.
    Uid,
    /// `gidNumber` of group entries.
    Gid,
}

impl IdNamespace {
    /// Attribute carrying identifiers of this namespace.
    #[must_use]
    pub const fn attribute(self) -> &'static str {
        match self {
            Self::Uid => "uidNumber",
            Self::Gid => "gidNumber",
        }
    }
}

impl fmt::Display for IdNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

/// Returns the smallest identifier in `[policy.min_id, policy.max_id)` that is neither assigned
/// nor excluded.
///
/// The assigned ids are sorted first, so the scan walks them in step with the candidate and
/// stops at the first gap.
///
/// # Errors
///
/// Returns [`Error::NamespaceExhausted`] when every id in the range is taken.
pub fn next_free_id<I>(assigned: I, policy: &AccountPolicy, namespace: IdNamespace) -> Result<u32>
where
    I: IntoIterator<Item = u32>,
{
    let taken: BTreeSet<u32> = assigned
        .into_iter()
        .chain(policy.excluded_ids.iter().copied())
        .filter(|id| *id >= policy.min_id)
        .collect();

    let mut candidate = policy.min_id;
    for id in taken {
        if id > candidate {
            break;
        }
        // `taken` is ascending and starts at or above `min_id`, so `id == candidate` here.
        candidate = match candidate.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    if candidate < policy.max_id {
        Ok(candidate)
    } else {
        Err(Error::NamespaceExhausted {
            namespace: namespace.to_string(),
            min: policy.min_id,
            max: policy.max_id,
        })
    }
}
