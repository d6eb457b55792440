//! Projected records returned to HTTP callers.

use crate::schema::AttributeValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// UI classification derived from an entry's object classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// `organizationalUnit`
    Container,
    /// `inetOrgPerson` or `organizationalRole`
    Person,
    /// `posixAccount`
    Account,
    /// `posixGroup`
    Group,
    /// `dcObject` or `organization`
    Domain,
    /// Anything else
    Other,
}

impl EntryKind {
    /// Classifies by the first matching rule: container, account, group, person, domain.
    #[must_use]
    pub fn classify<S: AsRef<str>>(classes: &[S]) -> Self {
        let has = |wanted: &str| {
            classes
                .iter()
                .any(|class| class.as_ref().eq_ignore_ascii_case(wanted))
        };

        if has("organizationalUnit") {
            Self::Container
        } else if has("posixAccount") {
            Self::Account
        } else if has("posixGroup") {
            Self::Group
        } else if has("inetOrgPerson") || has("organizationalRole") {
            Self::Person
        } else if has("dcObject") || has("organization") {
            Self::Domain
        } else {
            Self::Other
        }
    }
}

/// Full projected record of one entry.
///
/// Serializes as a flat object: `dn` followed by every schema attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Distinguished name, as returned by the directory
    pub dn: String,
    /// Every readable schema attribute, keyed by canonical name
    #[serde(flatten)]
    pub attributes: BTreeMap<&'static str, AttributeValue>,
}

impl DirectoryEntry {
    /// Looks up an attribute by canonical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Just enough of a child entry to render a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubordinateSummary {
    /// Distinguished name of the child
    pub dn: String,
    /// `objectClass` values
    pub classes: Vec<String>,
    /// `description`, empty when unset
    pub description: String,
    /// Derived classification
    pub kind: EntryKind,
}
