//! The public operation dispatcher.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth::{AuthStateSignal, TokenStore};
use crate::endpoint::EndpointUrl;
use crate::error::{AuthError, Error, ServerErrors, TransportError};
use crate::graphql::{GraphQlResponse, Operation};
use crate::refresh::RefreshCoordinator;
use crate::transport::HttpTransport;

/// Configuration for a [`GraphQlClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    endpoint: EndpointUrl,
    auth_endpoint: Option<EndpointUrl>,
    refresh_timeout: Duration,
}

impl ClientConfig {
    /// Default bound on the refresh exchange.
    pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a configuration for the given GraphQL endpoint.
    pub fn new(endpoint: EndpointUrl) -> Self {
        Self {
            endpoint,
            auth_endpoint: None,
            refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Route unauthenticated operations (login, the refresh exchange) to a
    /// separate endpoint. Defaults to the main endpoint.
    pub fn auth_endpoint(mut self, endpoint: EndpointUrl) -> Self {
        self.auth_endpoint = Some(endpoint);
        self
    }

    /// Bound the refresh exchange; on timeout the refresh fails terminally.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

/// The authenticated GraphQL client.
///
/// This is the single public entry point for dispatching operations. It
/// attaches the stored bearer token to each authenticated operation,
/// intercepts the token-expiry error code, performs a single coordinated
/// refresh exchange, and transparently replays the failed operation —
/// callers never retry manually.
///
/// # Construction
///
/// Build exactly one client at application start and pass it down; it is
/// cheap to clone (internal `Arc`) and safe to share across tasks. Cloning
/// shares the HTTP connection pool and the refresh state, which is what
/// keeps the refresh exchange single-flight across all call sites.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tokenlink::{ClientConfig, EndpointUrl, GraphQlClient, MemoryTokenStore, Operation};
///
/// # async fn example() -> Result<(), tokenlink::Error> {
/// let endpoint = EndpointUrl::new("https://blobfishapp.duckdns.org/v1/graphql")?;
/// let store = Arc::new(MemoryTokenStore::new());
/// let client = GraphQlClient::new(ClientConfig::new(endpoint), store)?;
///
/// let op = Operation::new("query Tasks { tasks { id title } }").operation_name("Tasks");
/// let tasks: serde_json::Value = client.execute(op).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GraphQlClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: HttpTransport,
    store: Arc<dyn TokenStore>,
    coordinator: RefreshCoordinator,
    endpoint: EndpointUrl,
    auth_endpoint: EndpointUrl,
    signal: AuthStateSignal,
}

impl GraphQlClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self, Error> {
        let transport = HttpTransport::new()?;
        let auth_endpoint = config.auth_endpoint.unwrap_or_else(|| config.endpoint.clone());
        let signal = AuthStateSignal::new();

        let coordinator = RefreshCoordinator::new(
            transport.clone(),
            Arc::clone(&store),
            auth_endpoint.clone(),
            config.refresh_timeout,
            signal.clone(),
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                store,
                coordinator,
                endpoint: config.endpoint,
                auth_endpoint,
                signal,
            }),
        })
    }

    /// Dispatch an operation and decode its `data` field.
    ///
    /// On a token-expiry error the client refreshes the credentials (joining
    /// an exchange already in flight, if any) and replays the operation
    /// exactly once with the new token. A second expiry on the replay fails
    /// with [`AuthError::SessionExpired`] rather than looping.
    ///
    /// # Errors
    ///
    /// - [`Error::Server`] for GraphQL errors other than the expiry code,
    ///   forwarded unchanged.
    /// - [`Error::Auth`] when a refresh was required but failed terminally;
    ///   the token store has been cleared.
    /// - [`Error::Transport`] for network-level failures.
    #[instrument(skip(self, operation), fields(operation = operation.name().unwrap_or("<anonymous>")))]
    pub async fn execute<T: DeserializeOwned>(&self, operation: Operation) -> Result<T, Error> {
        let response = self.dispatch(&operation).await?;

        if operation.requires_auth() && response.is_token_expired() {
            debug!("operation failed with expiry code, refreshing");
            self.inner.coordinator.ensure_fresh().await?;

            let replayed = self.dispatch(&operation).await?;
            if replayed.is_token_expired() {
                // A just-refreshed token that is still rejected means a
                // server-side credential problem; surface it instead of
                // entering another refresh cycle.
                return Err(AuthError::SessionExpired.into());
            }
            return Self::finish(replayed);
        }

        Self::finish(response)
    }

    /// Clear the stored credentials.
    ///
    /// The next authenticated operation will be sent without a bearer token
    /// and surface whatever error the server returns for it.
    pub async fn logout(&self) -> Result<(), Error> {
        self.inner.store.clear().await?;
        Ok(())
    }

    /// Handle to the re-authentication signal consumed by the UI shell.
    pub fn auth_state(&self) -> AuthStateSignal {
        self.inner.signal.clone()
    }

    /// Returns the main GraphQL endpoint.
    pub fn endpoint(&self) -> &EndpointUrl {
        &self.inner.endpoint
    }

    /// Auth header stage plus transport: one trip through the pipeline.
    async fn dispatch(&self, operation: &Operation) -> Result<GraphQlResponse<Value>, Error> {
        let (endpoint, bearer) = if operation.requires_auth() {
            (&self.inner.endpoint, self.read_access_token().await)
        } else {
            (&self.inner.auth_endpoint, None)
        };

        self.inner
            .transport
            .send(endpoint, operation, bearer.as_deref())
            .await
    }

    /// Read the bearer token for the header stage.
    ///
    /// A store read failure is treated as an absent token; the operation is
    /// sent unauthenticated and the server decides.
    async fn read_access_token(&self) -> Option<String> {
        match self.inner.store.tokens().await {
            Ok(tokens) => tokens.access.map(|t| t.as_str().to_string()),
            Err(e) => {
                warn!(error = %e, "token store read failed, sending without bearer token");
                None
            }
        }
    }

    fn finish<T: DeserializeOwned>(response: GraphQlResponse<Value>) -> Result<T, Error> {
        if !response.errors.is_empty() {
            return Err(ServerErrors {
                errors: response.errors,
            }
            .into());
        }

        let data = response.data.ok_or_else(|| TransportError::MalformedBody {
            message: "response carried neither data nor errors".to_string(),
        })?;

        serde_json::from_value(data).map_err(|e| {
            TransportError::MalformedBody {
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for GraphQlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlClient")
            .field("endpoint", &self.inner.endpoint)
            .field("auth_endpoint", &self.inner.auth_endpoint)
            .field("refreshing", &self.inner.signal.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::GraphQlError;
    use serde_json::json;

    fn response(value: Value) -> GraphQlResponse<Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn finish_decodes_data() {
        let tasks: Value =
            GraphQlClient::finish(response(json!({ "data": { "tasks": [] } }))).unwrap();
        assert_eq!(tasks, json!({ "tasks": [] }));
    }

    #[test]
    fn finish_forwards_server_errors() {
        let result: Result<Value, Error> = GraphQlClient::finish(GraphQlResponse {
            data: None,
            errors: vec![GraphQlError::with_code("no such tag", "NOT_FOUND")],
        });
        match result {
            Err(Error::Server(errors)) => {
                assert_eq!(errors.errors[0].code(), Some("NOT_FOUND"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn finish_rejects_empty_envelope() {
        let result: Result<Value, Error> =
            GraphQlClient::finish(response(json!({ "data": null })));
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn default_refresh_timeout_is_bounded() {
        let endpoint = EndpointUrl::new("https://example.com/v1/graphql").unwrap();
        let config = ClientConfig::new(endpoint);
        assert_eq!(config.refresh_timeout, ClientConfig::DEFAULT_REFRESH_TIMEOUT);
    }
}
