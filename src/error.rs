//! Error types for the tokenlink library.
//!
//! This module provides a unified error type with explicit variants for
//! transport, authentication, server-side GraphQL, storage, and input
//! validation errors.

use std::fmt;
use thiserror::Error;

use crate::graphql::GraphQlError;

/// The unified error type for tokenlink operations.
///
/// This error type covers all possible failure modes in the library,
/// with explicit variants to allow callers to handle specific cases.
#[derive(Debug, Error)]
pub enum Error {
    /// Network transport errors (DNS, TLS, connection, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Terminal authentication errors (missing refresh token, failed refresh).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// GraphQL errors returned by the server that are not the expiry signal.
    ///
    /// These are forwarded to the caller unchanged; the transport layer only
    /// intercepts the token-expiry code.
    #[error("server error: {0}")]
    Server(#[from] ServerErrors),

    /// Token store I/O errors.
    #[error("token store error: {0}")]
    Store(#[from] StoreError),

    /// Input validation errors (invalid endpoint URL, malformed variables).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The server replied with a non-success status and no parseable
    /// GraphQL body.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// The response body could not be decoded as a GraphQL response.
    #[error("malformed response body: {message}")]
    MalformedBody { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout { duration_ms: 0 }
        } else if err.is_connect() {
            TransportError::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            TransportError::MalformedBody {
                message: err.to_string(),
            }
        } else {
            TransportError::Http {
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::from(err))
    }
}

/// Terminal authentication failures.
///
/// `Clone` is derived so that the outcome of a single refresh exchange can
/// be fanned out to every operation queued behind it.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No refresh token was available when a refresh was required.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The refresh exchange failed (rejected, errored, or timed out).
    #[error("token refresh rejected: {reason}")]
    RefreshRejected { reason: String },

    /// A freshly refreshed token was still rejected by the server.
    #[error("session expired")]
    SessionExpired,
}

/// The structured error list from a GraphQL response.
#[derive(Debug, Clone)]
pub struct ServerErrors {
    /// Errors as returned by the server, in order.
    pub errors: Vec<GraphQlError>,
}

impl fmt::Display for ServerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            if let Some(code) = error.code() {
                write!(f, "[{}] ", code)?;
            }
            write!(f, "{}", error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerErrors {}

/// Token store I/O errors.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    /// Create a new store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid endpoint URL.
    #[error("invalid endpoint URL '{value}': {reason}")]
    EndpointUrl { value: String, reason: String },

    /// A variable value could not be serialized to JSON.
    #[error("invalid variable '{name}': {reason}")]
    Variable { name: String, reason: String },

    /// A stored token cannot be used in an HTTP header.
    #[error("invalid token: {reason}")]
    Token { reason: String },
}
