//! Distinguished Name handling for user and group entries.
//!
//! Entry DNs are always built by prefixing a single RDN (`uid=<user>` or `cn=<group>`) onto a
//! configured container DN, so the RDN value must be escaped before it reaches the directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use provisor_core::Error as CoreError;

/// Errors that can occur when parsing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// Relative distinguished name (single attribute/value pair).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Create a new relative distinguished name from an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion of the RDN (e.g. `uid`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Strongly-typed distinguished name.
///
/// Keeps the canonical (escaped) string next to the parsed components. Multi-valued RDNs
/// (`cn=a+uid=b`) are accepted on parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or contains invalid
    /// syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = split_escaped(raw, ',')?
            .iter()
            .map(|component| {
                split_escaped(component, '+')?
                    .iter()
                    .map(|part| split_attribute_value(part))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::from_rdns(rdns))
    }

    /// Builds the DN of a direct child of `self` named by `attribute=value`.
    ///
    /// `value` is taken verbatim and escaped as needed.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(vec![RelativeDistinguishedName::new(attribute, value)]);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Borrows the canonical distinguished name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the leftmost RDN (the entry's own name).
    #[must_use]
    pub fn leaf(&self) -> Option<&RelativeDistinguishedName> {
        self.rdns.first().and_then(|rdn| rdn.first())
    }

    /// Returns the DN of the container holding this entry, or `None` for a single-RDN name.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self.rdns.split_first() {
            Some((_, rest)) if !rest.is_empty() => Some(Self::from_rdns(rest.to_vec())),
            _ => None,
        }
    }

    /// Looks up the value for the first attribute that matches `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .flatten()
            .find(|rdn| rdn.matches_attribute(attribute))
            .map(RelativeDistinguishedName::value)
    }

    fn from_rdns(rdns: Vec<Vec<RelativeDistinguishedName>>) -> Self {
        let raw = rdns
            .iter()
            .map(|rdn| {
                rdn.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect::<Vec<_>>()
            .join(",");
        Self { raw, rdns }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            // Keep the escape so the value splitter can still tell `\=` from `=`.
            current.push('\\');
            current.push(ch);
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(
    component: &str,
) -> std::result::Result<RelativeDistinguishedName, DistinguishedNameError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx =
        index.ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value = component[idx + 1..].trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }
    if value.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok(RelativeDistinguishedName::new(attribute, unescape(value)?))
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            result.push(next);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn escape(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx == last && ch == ' ');

        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_container_dn() {
        let dn = DistinguishedName::parse("ou=People, dc=hashbang, dc=sh").unwrap();
        assert_eq!(dn.get("OU"), Some("People"));
        assert_eq!(dn.get("dc"), Some("hashbang"));
        assert_eq!(dn.to_string(), "ou=People,dc=hashbang,dc=sh");
    }

    #[test]
    fn child_escapes_special_characters() {
        let base = DistinguishedName::parse("ou=Group,dc=hashbang,dc=sh").unwrap();
        let dn = base.child("cn", "ops, east");
        assert_eq!(dn.as_str(), "cn=ops\\, east,ou=Group,dc=hashbang,dc=sh");
        assert_eq!(dn.leaf().map(RelativeDistinguishedName::value), Some("ops, east"));

        let leading = base.child("cn", "#admins ");
        assert_eq!(leading.as_str(), "cn=\\#admins\\ ,ou=Group,dc=hashbang,dc=sh");
    }

    #[test]
    fn escaped_dn_round_trips_through_parse() {
        let base = DistinguishedName::parse("ou=People,dc=hashbang,dc=sh").unwrap();
        let dn = base.child("uid", "a=b+c");
        let reparsed = DistinguishedName::parse(dn.as_str()).unwrap();
        assert_eq!(reparsed, dn);
        assert_eq!(reparsed.get("uid"), Some("a=b+c"));
    }

    #[test]
    fn parent_drops_the_leaf_rdn() {
        let base = DistinguishedName::parse("ou=People,dc=hashbang,dc=sh").unwrap();
        let dn = base.child("uid", "weird,name=x");
        assert_eq!(dn.parent(), Some(base));

        let reparsed = DistinguishedName::parse(dn.as_str()).unwrap();
        assert_eq!(reparsed.parent().unwrap().as_str(), "ou=People,dc=hashbang,dc=sh");
        assert_eq!(DistinguishedName::parse("dc=sh").unwrap().parent(), None);
    }

    #[test]
    fn parse_multi_valued_rdn() {
        let dn = DistinguishedName::parse("cn=ops+gidNumber=3001,ou=Group,dc=hashbang,dc=sh")
            .unwrap();
        assert_eq!(dn.get("gidnumber"), Some("3001"));
        assert_eq!(dn.leaf().map(RelativeDistinguishedName::attribute), Some("cn"));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert_eq!(
            DistinguishedName::parse("  ").unwrap_err(),
            DistinguishedNameError::Empty
        );
        assert!(matches!(
            DistinguishedName::parse("uid=alice,").unwrap_err(),
            DistinguishedNameError::InvalidComponent(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("=alice").unwrap_err(),
            DistinguishedNameError::MissingAttribute(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("uid=").unwrap_err(),
            DistinguishedNameError::MissingValue(_)
        ));
        assert_eq!(
            DistinguishedName::parse("uid=alice\\").unwrap_err(),
            DistinguishedNameError::UnterminatedEscape
        );
    }
}
