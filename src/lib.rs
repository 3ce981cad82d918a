//! tokenlink - Authenticated GraphQL Transport
//!
//! This library provides a GraphQL request pipeline with transparent,
//! single-flight token refresh. Outgoing operations are decorated with the
//! stored bearer token; when the server answers with the token-expiry code,
//! the client performs at most one refresh exchange (concurrent failures
//! queue behind it), persists the new credential pair, and replays the
//! failed operations — callers never retry manually.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenlink::{ClientConfig, EndpointUrl, GraphQlClient, FileTokenStore, Operation};
//!
//! # async fn example() -> Result<(), tokenlink::Error> {
//! let endpoint = EndpointUrl::new("https://blobfishapp.duckdns.org/v1/graphql")?;
//! let store = Arc::new(FileTokenStore::new("/home/alice/.config/app/tokens.json"));
//! let client = GraphQlClient::new(ClientConfig::new(endpoint), store)?;
//!
//! // The UI shell can watch for in-flight re-authentication.
//! let _watch = client.auth_state().subscribe(|refreshing| {
//!     eprintln!("re-authenticating: {refreshing}");
//! });
//!
//! let op = Operation::new("query Tasks { tasks { id title } }").operation_name("Tasks");
//! let tasks: serde_json::Value = client.execute(op).await?;
//! println!("{tasks}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod graphql;

mod refresh;
mod transport;

// Re-export primary types at crate root for convenience
pub use auth::{
    AccessToken, AuthStateSignal, FileTokenStore, MemoryTokenStore, RefreshToken, Subscription,
    TokenPair, TokenStore,
};
pub use client::{ClientConfig, GraphQlClient};
pub use endpoint::EndpointUrl;
pub use error::{AuthError, Error, ServerErrors, StoreError, TransportError};
pub use graphql::{GraphQlError, GraphQlResponse, Operation, TOKEN_EXPIRED_CODE};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
