//! Token types for authenticated GraphQL transport.

use std::fmt;

/// A bearer access token attached to authenticated operations.
///
/// Access tokens are short-lived and treated as opaque.
///
/// # Security
///
/// - Never logged or displayed in Debug output
/// - Treat as opaque; do not parse or inspect
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Create a new access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value for use in authorization headers.
    ///
    /// # Security
    ///
    /// Use only when constructing HTTP authorization headers.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Hide token value in Debug output
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// A refresh token used solely to obtain a new access token.
///
/// Refresh tokens are longer-lived; they outlive the access token across
/// refresh cycles until logout or a failed refresh exchange.
///
/// # Security
///
/// - Never logged or displayed in Debug output
/// - Treat as opaque; do not parse or inspect
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Create a new refresh token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value for use in refresh-exchange requests.
    ///
    /// # Security
    ///
    /// Use only when constructing token refresh requests.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Hide token value in Debug output
impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefreshToken").field(&"[REDACTED]").finish()
    }
}

/// The credential pair held by a token store.
///
/// The access token is present only while a session is considered active.
/// Both fields are written together by the refresh coordinator's success
/// path and cleared together on logout or refresh failure.
#[derive(Debug, Clone, Default)]
pub struct TokenPair {
    /// The current bearer token, if any.
    pub access: Option<AccessToken>,
    /// The current refresh token, if any.
    pub refresh: Option<RefreshToken>,
}

impl TokenPair {
    /// Create a credential pair from both token values.
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(AccessToken::new(access)),
            refresh: Some(RefreshToken::new(refresh)),
        }
    }

    /// An empty pair, representing a logged-out state.
    pub fn empty() -> Self {
        Self::default()
    }
}
