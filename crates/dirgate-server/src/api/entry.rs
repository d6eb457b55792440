//! Entry resources: `/{dn}`.
//!
//! The path segment is the distinguished name, used verbatim. Every handler runs the access
//! policy before it touches the directory.

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dirgate_core::{Error, Verb};
use dirgate_ldap::DistinguishedName;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::error::ApiError;
use crate::state::SharedState;

/// What `GET /{dn}` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// The entry's own record
    #[default]
    Entry,
    /// Summaries of its direct children
    Subordinate,
}

/// Query string of `GET /{dn}`.
#[derive(Debug, Default, Deserialize)]
pub struct EntryQuery {
    /// Selected view
    #[serde(default)]
    pub view: View,
    /// Only return the entry if it has this object class
    pub class: Option<String>,
}

/// Body of a mutation: exactly one attribute and its new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUpdate {
    /// Attribute name as sent by the caller
    pub name: String,
    /// New value; `None` clears the attribute
    pub value: Option<String>,
}

impl AttributeUpdate {
    /// Parses a `{"<attribute>": "<value>"}` body. `null` clears, numbers are stringified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for anything but a single-key object with a string,
    /// number or null value.
    pub fn from_json(body: &[u8]) -> Result<Self, Error> {
        let Value::Object(fields) = serde_json::from_slice::<Value>(body)? else {
            return Err(Error::InvalidRequest(
                "body must be a JSON object".to_string(),
            ));
        };
        if fields.len() != 1 {
            return Err(Error::InvalidRequest(format!(
                "body must name exactly one attribute, got {}",
                fields.len()
            )));
        }

        let Some((name, value)) = fields.into_iter().next() else {
            return Err(Error::InvalidRequest("body names no attribute".to_string()));
        };
        let value = match value {
            Value::String(value) => Some(value),
            Value::Number(number) => Some(number.to_string()),
            Value::Null => None,
            _ => {
                return Err(Error::InvalidRequest(format!(
                    "value of {name} must be a string or null"
                )))
            }
        };
        Ok(Self { name, value })
    }
}

fn presented_credential(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// `GET /{dn}`: `[entry]`, or the child summaries with `?view=subordinate`.
pub async fn show(
    State(state): State<SharedState>,
    Path(dn): Path<String>,
    query: Result<Query<EntryQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state
        .policy
        .authenticate(Verb::Read, presented_credential(&headers))
        .into_result()?;
    let Query(query) = query.map_err(|err| Error::InvalidRequest(err.body_text()))?;
    let dn = DistinguishedName::parse(&dn)?;

    match query.view {
        View::Subordinate => {
            let children = state.directory.list_children(&dn).await?;
            Ok(Json(children).into_response())
        }
        View::Entry => {
            let entry = state
                .directory
                .read_entry(&dn, query.class.as_deref())
                .await?
                .ok_or_else(|| Error::NotFound(dn.to_string()))?;
            Ok(Json([entry]).into_response())
        }
    }
}

/// `PUT /{dn}` (and `POST`): replace one attribute, echo the DN.
pub async fn update(
    State(state): State<SharedState>,
    Path(dn): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, ApiError> {
    let presented = presented_credential(&headers);
    state
        .policy
        .authenticate(Verb::Write, presented)
        .into_result()?;
    let update = AttributeUpdate::from_json(&body)?;
    state
        .policy
        .decide(Verb::Write, Some(update.name.as_str()), presented)
        .into_result()?;
    let dn = DistinguishedName::parse(&dn)?;

    debug!(dn = %dn, attribute = %update.name, "applying attribute update");
    let dn = state
        .directory
        .set_attribute(&dn, &update.name, update.value.as_deref())
        .await?;
    Ok(dn.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_string_attribute() {
        let update = AttributeUpdate::from_json(br#"{"mail":"bob@example.com"}"#).unwrap();
        assert_eq!(
            update,
            AttributeUpdate {
                name: "mail".into(),
                value: Some("bob@example.com".into())
            }
        );
    }

    #[test]
    fn null_clears_and_numbers_are_stringified() {
        let cleared = AttributeUpdate::from_json(br#"{"description":null}"#).unwrap();
        assert_eq!(cleared.value, None);

        let number = AttributeUpdate::from_json(br#"{"gidNumber":5000}"#).unwrap();
        assert_eq!(number.value.as_deref(), Some("5000"));
    }

    #[test]
    fn rejects_malformed_bodies() {
        for body in [
            &b"not json"[..],
            br#"["mail"]"#,
            br"{}",
            br#"{"mail":"a","sn":"b"}"#,
            br#"{"memberUid":["a","b"]}"#,
        ] {
            assert!(
                matches!(AttributeUpdate::from_json(body), Err(Error::InvalidRequest(_))),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn view_defaults_to_entry() {
        let query: EntryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.view, View::Entry);
        let query: EntryQuery = serde_json::from_str(r#"{"view":"subordinate"}"#).unwrap();
        assert_eq!(query.view, View::Subordinate);
    }
}
