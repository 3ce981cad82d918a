//! GraphQL operation and wire types.
//!
//! An [`Operation`] describes one outgoing request (query or mutation plus
//! variables) together with its per-operation context. Responses are decoded
//! into [`GraphQlResponse`] and inspected for the token-expiry signal by the
//! refresh coordinator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, InvalidInputError};

/// The machine-readable error code that signals an expired access token.
///
/// Matching is done on this code inside `extensions.code`, never on
/// human-readable message text.
pub const TOKEN_EXPIRED_CODE: &str = "TOKEN_EXPIRED";

/// The refresh-exchange mutation document.
///
/// The response shape is `{ success, token, refreshToken, errors }` under
/// the `refreshToken` field; see [`RefreshPayload`].
pub(crate) const REFRESH_TOKEN_MUTATION: &str = "\
mutation RefreshToken($refreshToken: String!) {
  refreshToken(input: { refreshToken: $refreshToken }) {
    success
    token
    refreshToken
    errors
  }
}";

/// One outgoing GraphQL request.
///
/// Operations flow through the pipeline exactly once unless replayed by the
/// refresh coordinator (at most one replay per original dispatch).
///
/// # Example
///
/// ```
/// use tokenlink::Operation;
/// use serde_json::json;
///
/// let op = Operation::new("mutation CreateTag($name: String!) { createTag(name: $name) { id } }")
///     .operation_name("CreateTag")
///     .variable("name", json!("walkies"));
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<String>,
    variables: Map<String, Value>,
    #[serde(skip)]
    unauthenticated: bool,
}

impl Operation {
    /// Create a new operation from a query or mutation document.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Map::new(),
            unauthenticated: false,
        }
    }

    /// Set the operation name sent alongside the document.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Add a variable to the operation.
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Add a variable from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn try_variable<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> Result<Self, Error> {
        let name = name.into();
        let value = serde_json::to_value(value).map_err(|e| InvalidInputError::Variable {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        self.variables.insert(name, value);
        Ok(self)
    }

    /// Mark the operation as unauthenticated.
    ///
    /// Unauthenticated operations (login, the refresh exchange) carry no
    /// bearer header, are routed to the auth endpoint, and never trigger a
    /// token refresh when they fail with the expiry code.
    pub fn unauthenticated(mut self) -> Self {
        self.unauthenticated = true;
        self
    }

    /// Whether a bearer header should be attached to this operation.
    pub fn requires_auth(&self) -> bool {
        !self.unauthenticated
    }

    /// Returns the operation name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }
}

/// A decoded GraphQL response.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    /// The response data, if the operation produced any.
    pub data: Option<T>,
    /// The structured error list, if the operation failed.
    #[serde(default = "Vec::new")]
    pub errors: Vec<GraphQlError>,
}

impl<T> GraphQlResponse<T> {
    /// Whether the error list carries the token-expiry code.
    pub(crate) fn is_token_expired(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.code() == Some(TOKEN_EXPIRED_CODE))
    }
}

/// One entry in a GraphQL response's error list.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable extensions.
    #[serde(default)]
    pub extensions: ErrorExtensions,
}

impl GraphQlError {
    /// Returns the machine-readable error code, if present.
    pub fn code(&self) -> Option<&str> {
        self.extensions.code.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: ErrorExtensions::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: ErrorExtensions {
                code: Some(code.into()),
            },
        }
    }
}

/// Machine-readable extensions attached to a GraphQL error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorExtensions {
    /// The error code, e.g. `TOKEN_EXPIRED`.
    pub code: Option<String>,
}

/// The `refreshToken` field of the refresh-exchange response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshPayload {
    pub success: bool,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

/// The `data` object of the refresh-exchange response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshData {
    pub refresh_token: RefreshPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_serializes_wire_shape() {
        let op = Operation::new("query Tasks { tasks { id } }")
            .operation_name("Tasks")
            .variable("projectId", json!("p1"));

        let wire = serde_json::to_value(&op).unwrap();
        assert_eq!(wire["query"], "query Tasks { tasks { id } }");
        assert_eq!(wire["operationName"], "Tasks");
        assert_eq!(wire["variables"]["projectId"], "p1");
        // The unauthenticated marker is local context, never sent on the wire
        assert!(wire.get("unauthenticated").is_none());
    }

    #[test]
    fn try_variable_serializes_typed_values() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct TaskFilter {
            project_id: String,
            done: bool,
        }

        let op = Operation::new("query Tasks($filter: TaskFilter) { tasks(filter: $filter) { id } }")
            .try_variable(
                "filter",
                &TaskFilter {
                    project_id: "p1".into(),
                    done: false,
                },
            )
            .unwrap();

        let wire = serde_json::to_value(&op).unwrap();
        assert_eq!(wire["variables"]["filter"]["projectId"], "p1");
        assert_eq!(wire["variables"]["filter"]["done"], false);
    }

    #[test]
    fn expiry_matches_code_not_message() {
        let expired: GraphQlResponse<Value> = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "nope", "extensions": { "code": "TOKEN_EXPIRED" } }]
        }))
        .unwrap();
        assert!(expired.is_token_expired());

        // A message that merely mentions expiry does not count
        let mentioned: GraphQlResponse<Value> = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "TOKEN_EXPIRED" }]
        }))
        .unwrap();
        assert!(!mentioned.is_token_expired());
    }

    #[test]
    fn response_without_errors_field_decodes() {
        let response: GraphQlResponse<Value> =
            serde_json::from_value(json!({ "data": { "tasks": [] } })).unwrap();
        assert!(response.errors.is_empty());
        assert!(!response.is_token_expired());
    }

    #[test]
    fn refresh_payload_decodes_camel_case() {
        let data: RefreshData = serde_json::from_value(json!({
            "refreshToken": {
                "success": true,
                "token": "T2",
                "refreshToken": "R2",
                "errors": null
            }
        }))
        .unwrap();
        assert!(data.refresh_token.success);
        assert_eq!(data.refresh_token.refresh_token.as_deref(), Some("R2"));
    }
}
