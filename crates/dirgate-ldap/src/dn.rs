//! Distinguished name validation.
//!
//! Resource paths are distinguished names used verbatim. [`DistinguishedName`] checks that a
//! path is well-formed before any directory work happens, but keeps the caller's spelling so the
//! exact string is what reaches the directory.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use dirgate_core::error::Error as CoreError;

/// Why a path is not a distinguished name. Components are counted from 1, most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// Nothing but whitespace.
    #[error("distinguished name is empty")]
    Empty,
    /// A component has no `=`.
    #[error("component {component} of the distinguished name has no '='")]
    NoSeparator {
        /// Offending component
        component: usize,
    },
    /// A component's attribute type is empty, does not start with a letter or digit, or is not
    /// a descriptor/OID.
    #[error("component {component} has an invalid attribute type {found:?}")]
    BadType {
        /// Offending component
        component: usize,
        /// Attribute type as written
        found: String,
    },
    /// A component has nothing after its `=`.
    #[error("component {component} has an empty value")]
    EmptyValue {
        /// Offending component
        component: usize,
    },
    /// A `\` that is last, or is followed by a single hex digit.
    #[error("malformed escape at byte {0}")]
    BadEscape(usize),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// A syntactically valid distinguished name, most-specific component first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName(String);

impl DistinguishedName {
    /// Validates `input` and keeps it, trimmed, as the DN.
    ///
    /// Multi-valued components (`cn=a+uid=b`) are checked per pair. Values may use `\,` or `\2c`
    /// escapes; they are not decoded.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] describing the first defect found.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut pair = Pair::new(1);
        let mut chars = raw.char_indices().peekable();
        while let Some((at, ch)) = chars.next() {
            match ch {
                '\\' if pair.in_value => {
                    match chars.next() {
                        Some((_, first)) if first.is_ascii_hexdigit() => {
                            chars
                                .next_if(|(_, second)| second.is_ascii_hexdigit())
                                .ok_or(DistinguishedNameError::BadEscape(at))?;
                        }
                        Some(_) => {}
                        None => return Err(DistinguishedNameError::BadEscape(at)),
                    }
                    pair.value_len += 1;
                }
                '=' if !pair.in_value => {
                    pair.check_type()?;
                    pair.in_value = true;
                }
                ',' | '+' => {
                    pair.finish()?;
                    let component = pair.component + usize::from(ch == ',');
                    pair = Pair::new(component);
                }
                c if pair.in_value => {
                    if pair.value_len > 0 || !c.is_whitespace() {
                        pair.value_len += 1;
                    }
                }
                c => pair.attribute.push(c),
            }
        }
        pair.finish()?;

        Ok(Self(raw.to_string()))
    }

    /// Borrows the distinguished name exactly as supplied (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One `type=value` pair being scanned.
struct Pair {
    component: usize,
    attribute: String,
    in_value: bool,
    value_len: usize,
}

impl Pair {
    fn new(component: usize) -> Self {
        Self {
            component,
            attribute: String::new(),
            in_value: false,
            value_len: 0,
        }
    }

    fn check_type(&self) -> std::result::Result<(), DistinguishedNameError> {
        let name = self.attribute.trim();
        let leading = name.starts_with(|c: char| c.is_ascii_alphanumeric());
        let descriptor = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !leading || !descriptor {
            return Err(DistinguishedNameError::BadType {
                component: self.component,
                found: name.to_string(),
            });
        }
        Ok(())
    }

    fn finish(&self) -> std::result::Result<(), DistinguishedNameError> {
        if !self.in_value {
            return Err(DistinguishedNameError::NoSeparator {
                component: self.component,
            });
        }
        if self.value_len == 0 {
            return Err(DistinguishedNameError::EmptyValue {
                component: self.component,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for DistinguishedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> std::result::Result<DistinguishedName, DistinguishedNameError> {
        DistinguishedName::parse(input)
    }

    #[test]
    fn accepts_ordinary_names() {
        for dn in [
            "uid=bob,ou=People,dc=example,dc=com",
            "dc=com",
            "cn=John+uid=1234,ou=People,dc=example,dc=com",
            "cn=Smith\\, John,ou=People,dc=example,dc=com",
            "2.5.4.3=admin,dc=example,dc=com",
            "cn=a=b,dc=com",
        ] {
            assert_eq!(parse(dn).unwrap().as_str(), dn);
        }
    }

    #[test]
    fn keeps_caller_spelling() {
        let dn = parse("  cn=Smith\\2C John , ou=People,dc=example,dc=com ").unwrap();
        assert_eq!(dn.as_str(), "cn=Smith\\2C John , ou=People,dc=example,dc=com");
        assert_eq!(dn.to_string(), dn.as_str());
    }

    #[test]
    fn reports_first_defect() {
        assert_eq!(parse("   ").unwrap_err(), DistinguishedNameError::Empty);
        assert_eq!(
            parse("favicon.ico").unwrap_err(),
            DistinguishedNameError::NoSeparator { component: 1 }
        );
        assert_eq!(
            parse("cn=John,").unwrap_err(),
            DistinguishedNameError::NoSeparator { component: 2 }
        );
        assert_eq!(
            parse("uid=bob,=People").unwrap_err(),
            DistinguishedNameError::BadType {
                component: 2,
                found: String::new()
            }
        );
        assert_eq!(
            parse("--fail=x,dc=example,dc=com").unwrap_err(),
            DistinguishedNameError::BadType {
                component: 1,
                found: "--fail".to_string()
            }
        );
        assert!(matches!(
            parse("uid=bob,.ou=People").unwrap_err(),
            DistinguishedNameError::BadType { component: 2, .. }
        ));
        assert!(matches!(
            parse("u id=bob").unwrap_err(),
            DistinguishedNameError::BadType { component: 1, .. }
        ));
        assert_eq!(
            parse("uid=bob,ou= ,dc=com").unwrap_err(),
            DistinguishedNameError::EmptyValue { component: 2 }
        );
        assert_eq!(
            parse("cn=a+uid=").unwrap_err(),
            DistinguishedNameError::EmptyValue { component: 1 }
        );
    }

    #[test]
    fn rejects_broken_escapes() {
        assert_eq!(parse("cn=bad\\").unwrap_err(), DistinguishedNameError::BadEscape(6));
        assert_eq!(parse("cn=bad\\4").unwrap_err(), DistinguishedNameError::BadEscape(6));
        assert!(matches!(
            parse("c\\n=bad").unwrap_err(),
            DistinguishedNameError::BadType { .. }
        ));
    }

    #[test]
    fn converts_to_invalid_request() {
        let err: CoreError = DistinguishedNameError::Empty.into();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn serializes_as_string() {
        let dn = parse("ou=Groups,dc=example,dc=com").unwrap();
        assert_eq!(
            serde_json::to_string(&dn).unwrap(),
            "\"ou=Groups,dc=example,dc=com\""
        );
    }
}
