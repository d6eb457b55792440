//! Static attribute schema and the projector built on it.
//!
//! Every recognized attribute has one fixed [`Cardinality`]. Projection never fails: unknown
//! names are dropped, absent names fall back to an empty scalar or an empty list.

use crate::connection::LdapEntry;
use crate::entry::{DirectoryEntry, EntryKind, SubordinateSummary};
use crate::Result;
use dirgate_core::error::Error;
use dirgate_core::CREDENTIAL_ATTRIBUTE;
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether an attribute projects to a single string or an ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// First raw value only
    Scalar,
    /// Every raw value, in receipt order
    List,
}

const SCHEMA: &[(&str, Cardinality)] = &[
    ("cn", Cardinality::List),
    ("description", Cardinality::Scalar),
    ("displayName", Cardinality::Scalar),
    ("gidNumber", Cardinality::Scalar),
    ("givenName", Cardinality::Scalar),
    ("homeDirectory", Cardinality::Scalar),
    ("initials", Cardinality::Scalar),
    ("mail", Cardinality::Scalar),
    ("memberUid", Cardinality::List),
    ("objectClass", Cardinality::List),
    ("sn", Cardinality::Scalar),
    ("uid", Cardinality::Scalar),
    ("uidNumber", Cardinality::Scalar),
    (CREDENTIAL_ATTRIBUTE, Cardinality::Scalar),
];

/// A projected attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Single string
    Scalar(String),
    /// Ordered list of strings
    List(Vec<String>),
}

impl AttributeValue {
    fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::Scalar => Self::Scalar(String::new()),
            Cardinality::List => Self::List(Vec::new()),
        }
    }
}

/// Returns the schema spelling of `name`, matching case-insensitively.
///
/// The credential attribute is included regardless of read exposure.
#[must_use]
pub fn canonical_name(name: &str) -> Option<&'static str> {
    SCHEMA
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(known, _)| *known)
}

/// Canonicalizes an allow-list against the schema.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] naming every entry the schema does not know.
pub fn canonical_names<I, S>(names: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut canonical = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        let name = name.as_ref();
        match canonical_name(name) {
            Some(known) => canonical.push(known.to_string()),
            None => unknown.push(name.to_string()),
        }
    }

    if unknown.is_empty() {
        Ok(canonical)
    } else {
        Err(Error::ConfigError(format!(
            "mutable attributes not in the attribute schema: {}",
            unknown.join(", ")
        )))
    }
}

/// Read-side view of the schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeSchema {
    expose_credentials: bool,
}

impl AttributeSchema {
    /// Creates the schema; `expose_credentials` adds the credential attribute to reads.
    #[must_use]
    pub const fn new(expose_credentials: bool) -> Self {
        Self { expose_credentials }
    }

    fn fields(&self) -> impl Iterator<Item = &'static (&'static str, Cardinality)> + '_ {
        SCHEMA
            .iter()
            .filter(|(name, _)| self.expose_credentials || *name != CREDENTIAL_ATTRIBUTE)
    }

    /// Looks up a readable attribute, case-insensitively.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<(&'static str, Cardinality)> {
        self.fields()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .copied()
    }

    /// Attribute names to request from the directory for an entry read.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.fields().map(|(name, _)| (*name).to_string()).collect()
    }

    /// Projects a raw entry into the fixed record.
    #[must_use]
    pub fn project(&self, entry: &LdapEntry) -> DirectoryEntry {
        let mut attributes: BTreeMap<&'static str, AttributeValue> = self
            .fields()
            .map(|(name, cardinality)| (*name, AttributeValue::empty(*cardinality)))
            .collect();

        for raw in &entry.attributes {
            let Some((name, _)) = self.lookup(&raw.name) else {
                continue;
            };
            match attributes.get_mut(name) {
                Some(AttributeValue::Scalar(value)) => {
                    *value = raw.values.first().cloned().unwrap_or_default();
                }
                Some(AttributeValue::List(values)) => values.extend(raw.values.iter().cloned()),
                None => {}
            }
        }

        DirectoryEntry {
            dn: entry.dn.clone(),
            attributes,
        }
    }

    /// Reduces a raw entry to what a tree node needs.
    #[must_use]
    pub fn summarize(&self, entry: &LdapEntry) -> SubordinateSummary {
        let mut classes = Vec::new();
        let mut description = String::new();
        for raw in &entry.attributes {
            if raw.name.eq_ignore_ascii_case("objectClass") {
                classes.extend(raw.values.iter().cloned());
            } else if raw.name.eq_ignore_ascii_case("description") {
                description = raw.values.first().cloned().unwrap_or_default();
            }
        }

        SubordinateSummary {
            dn: entry.dn.clone(),
            kind: EntryKind::classify(&classes),
            classes,
            description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> AttributeSchema {
        AttributeSchema::new(false)
    }

    #[test]
    fn empty_entry_yields_defaults_for_every_field() {
        let projected = schema().project(&LdapEntry::new("uid=bob,dc=example,dc=com"));

        assert_eq!(projected.dn, "uid=bob,dc=example,dc=com");
        for (name, cardinality) in SCHEMA.iter().filter(|(n, _)| *n != CREDENTIAL_ATTRIBUTE) {
            let value = projected.get(name).unwrap();
            match cardinality {
                Cardinality::Scalar => assert_eq!(value, &AttributeValue::Scalar(String::new())),
                Cardinality::List => assert_eq!(value, &AttributeValue::List(Vec::new())),
            }
        }
    }

    #[test]
    fn single_value_projects_per_cardinality() {
        for (name, cardinality) in SCHEMA.iter().filter(|(n, _)| *n != CREDENTIAL_ATTRIBUTE) {
            let entry = LdapEntry::new("cn=x").with_attribute(*name, ["value"]);
            let projected = schema().project(&entry);
            let expected = match cardinality {
                Cardinality::Scalar => AttributeValue::Scalar("value".into()),
                Cardinality::List => AttributeValue::List(vec!["value".into()]),
            };
            assert_eq!(projected.get(name), Some(&expected), "attribute {name}");
        }
    }

    #[test]
    fn scalar_takes_first_value() {
        let entry = LdapEntry::new("cn=x").with_attribute("mail", ["a@example.com", "b@example.com"]);
        assert_eq!(
            schema().project(&entry).get("mail"),
            Some(&AttributeValue::Scalar("a@example.com".into()))
        );
    }

    #[test]
    fn list_keeps_receipt_order_and_appends_repeats() {
        let entry = LdapEntry::new("cn=staff")
            .with_attribute("memberUid", ["carol", "alice", "bob"])
            .with_attribute("memberuid", ["dave"]);
        assert_eq!(
            schema().project(&entry).get("memberUid"),
            Some(&AttributeValue::List(vec![
                "carol".into(),
                "alice".into(),
                "bob".into(),
                "dave".into()
            ]))
        );

        let none = LdapEntry::new("cn=staff").with_attribute("memberUid", Vec::<String>::new());
        assert_eq!(
            schema().project(&none).get("memberUid"),
            Some(&AttributeValue::List(Vec::new()))
        );
    }

    #[test]
    fn unknown_attributes_dropped() {
        let entry = LdapEntry::new("cn=x")
            .with_attribute("loginShell", ["/bin/bash"])
            .with_attribute("entryUUID", ["abc"]);
        let projected = schema().project(&entry);
        assert!(projected.get("loginShell").is_none());
        assert!(projected.get("entryUUID").is_none());
    }

    #[test]
    fn names_matched_case_insensitively_and_emitted_canonically() {
        let entry = LdapEntry::new("cn=x").with_attribute("HOMEDIRECTORY", ["/home/bob"]);
        let projected = schema().project(&entry);
        assert_eq!(
            projected.get("homeDirectory"),
            Some(&AttributeValue::Scalar("/home/bob".into()))
        );
    }

    #[test]
    fn credential_attribute_only_projected_when_exposed() {
        let entry = LdapEntry::new("uid=bob").with_attribute("userPassword", ["{SSHA}abc"]);
        assert!(schema().project(&entry).get(CREDENTIAL_ATTRIBUTE).is_none());
        assert!(!schema()
            .attribute_names()
            .contains(&CREDENTIAL_ATTRIBUTE.to_string()));

        let exposed = AttributeSchema::new(true).project(&entry);
        assert_eq!(
            exposed.get(CREDENTIAL_ATTRIBUTE),
            Some(&AttributeValue::Scalar("{SSHA}abc".into()))
        );
    }

    #[test]
    fn summary_reads_classes_and_description_only() {
        let entry = LdapEntry::new("ou=People,dc=example,dc=com")
            .with_attribute("objectClass", ["top", "organizationalUnit"])
            .with_attribute("description", ["All staff"])
            .with_attribute("mail", ["ignored@example.com"]);
        let summary = schema().summarize(&entry);

        assert_eq!(summary.dn, "ou=People,dc=example,dc=com");
        assert_eq!(summary.classes, vec!["top", "organizationalUnit"]);
        assert_eq!(summary.description, "All staff");
        assert_eq!(summary.kind, EntryKind::Container);
    }

    #[test]
    fn canonicalizes_allow_list() {
        assert_eq!(
            canonical_names(["MAIL", "homedirectory", "userpassword"]).unwrap(),
            vec!["mail", "homeDirectory", CREDENTIAL_ATTRIBUTE]
        );
        let err = canonical_names(["mail", "loginShell", "shadowExpire"]).unwrap_err();
        assert_eq!(
            err,
            Error::ConfigError(
                "mutable attributes not in the attribute schema: loginShell, shadowExpire".into()
            )
        );
    }
}
