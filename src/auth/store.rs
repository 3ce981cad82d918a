//! Token store seam and the bundled implementations.
//!
//! The token store is the only shared mutable resource in the pipeline: it
//! is read by the header stage and the refresh coordinator, and written only
//! by the coordinator's success path and the logout path.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

use super::tokens::{AccessToken, RefreshToken, TokenPair};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Durable storage for the credential pair.
///
/// Implement this to plug in platform storage (keychain, encrypted
/// preferences, a browser storage bridge). The bundled
/// [`MemoryTokenStore`] and [`FileTokenStore`] cover tests and simple
/// embeddings.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the current credential pair.
    async fn tokens(&self) -> Result<TokenPair, StoreError>;

    /// Persist a new credential pair, replacing any previous one.
    async fn save(&self, tokens: TokenPair) -> Result<(), StoreError>;

    /// Remove all stored credentials (logout).
    async fn clear(&self) -> Result<(), StoreError>;
}

/// An in-memory token store.
///
/// Suitable for tests and for processes that do not persist sessions
/// across restarts.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<TokenPair>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a credential pair.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(tokens),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenPair> {
        // A poisoned lock means a panic mid-assignment of a plain struct;
        // the value is still coherent, so keep serving it.
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn tokens(&self) -> Result<TokenPair, StoreError> {
        Ok(self.lock().clone())
    }

    async fn save(&self, tokens: TokenPair) -> Result<(), StoreError> {
        *self.lock() = tokens;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.lock() = TokenPair::empty();
        Ok(())
    }
}

/// On-disk JSON layout. Field names match the storage keys used by the
/// app front-ends (`token` / `refreshToken`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    token: Option<String>,
    refresh_token: Option<String>,
}

/// A file-backed token store.
///
/// Stores the credential pair as a small JSON file with restrictive
/// permissions on Unix. Missing file reads as an empty pair.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn tokens(&self) -> Result<TokenPair, StoreError> {
        if !self.path.exists() {
            return Ok(TokenPair::empty());
        }

        let json = fs::read_to_string(&self.path)?;
        let stored: StoredTokens = serde_json::from_str(&json)?;

        Ok(TokenPair {
            access: stored.token.map(AccessToken::new),
            refresh: stored.refresh_token.map(RefreshToken::new),
        })
    }

    async fn save(&self, tokens: TokenPair) -> Result<(), StoreError> {
        let stored = StoredTokens {
            token: tokens.access.map(|t| t.as_str().to_string()),
            refresh_token: tokens.refresh.map(|t| t.as_str().to_string()),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, &json)?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
