//! HTTP transport for GraphQL operations.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::endpoint::EndpointUrl;
use crate::error::{Error, InvalidInputError, TransportError};
use crate::graphql::{GraphQlResponse, Operation};

/// HTTP transport primitive: sends one GraphQL operation and decodes the
/// response envelope.
///
/// `Clone` shares the underlying connection pool, so the composition root
/// can build one transport and hand it to every stage of the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new transport with a dedicated connection pool.
    pub(crate) fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tokenlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Http {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Send one operation, optionally with a bearer token, and decode the
    /// GraphQL response envelope.
    ///
    /// GraphQL servers report operation failures inside the envelope; this
    /// method surfaces those as an `Ok` response carrying errors, so the
    /// dispatcher can inspect them for the expiry code. Only undecodable
    /// responses and network failures become `Err`.
    #[instrument(skip(self, operation, bearer), fields(endpoint = %endpoint, operation = operation.name().unwrap_or("<anonymous>")))]
    pub(crate) async fn send(
        &self,
        endpoint: &EndpointUrl,
        operation: &Operation,
        bearer: Option<&str>,
    ) -> Result<GraphQlResponse<Value>, Error> {
        debug!(authenticated = bearer.is_some(), "dispatching operation");
        trace!(?operation, "operation payload");

        let response = self
            .client
            .post(endpoint.as_str())
            .headers(self.headers(bearer)?)
            .json(operation)
            .send()
            .await?;

        let status = response.status();
        trace!(status = %status, "response received");

        if status.is_success() {
            let body = response.json::<GraphQlResponse<Value>>().await?;
            return Ok(body);
        }

        // Some servers put the GraphQL error envelope on a 4xx status.
        // Surface it if it decodes, otherwise report the status.
        let bytes = response.bytes().await?;
        match serde_json::from_slice::<GraphQlResponse<Value>>(&bytes) {
            Ok(body) if !body.errors.is_empty() => Ok(body),
            _ => Err(TransportError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            }
            .into()),
        }
    }

    fn headers(&self, bearer: Option<&str>) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = bearer {
            let value = format!("Bearer {}", token);
            let value = HeaderValue::from_str(&value).map_err(|_| InvalidInputError::Token {
                reason: "token contains characters not valid in a header".to_string(),
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }
}
