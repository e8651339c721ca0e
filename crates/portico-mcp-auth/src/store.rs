//! Pluggable token storage.
//!
//! The store is content-addressed by token string. Authorization codes
//! are single-use: `consume_auth_code` verifies the PKCE verifier
//! against the stored challenge and removes the code whether or not
//! verification succeeds.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AuthError;
use crate::pkce::verify_challenge;
use crate::types::{AuthorizationCode, TokenInfo};

/// Storage contract for access tokens and authorization codes.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up a token. Expired tokens resolve to `None`.
    async fn get(&self, token: &str) -> Result<Option<TokenInfo>, AuthError>;

    /// Store a token for `ttl`.
    async fn put(&self, info: TokenInfo, ttl: Duration) -> Result<(), AuthError>;

    /// Remove a token. Removing an absent token is not an error.
    async fn delete(&self, token: &str) -> Result<(), AuthError>;

    /// Store a pending authorization code with its PKCE challenge.
    async fn put_auth_code(&self, code: AuthorizationCode) -> Result<(), AuthError>;

    /// Consume an authorization code, verifying the PKCE verifier.
    /// The code is removed on every call; a second consume fails.
    async fn consume_auth_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<AuthorizationCode, AuthError>;
}

fn apply_ttl(mut info: TokenInfo, ttl: Duration) -> TokenInfo {
    info.expires_at = Utc::now() + ttl;
    info
}

/// In-memory token store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, TokenInfo>>>,
    auth_codes: Arc<RwLock<HashMap<String, AuthorizationCode>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, token: &str) -> Result<Option<TokenInfo>, AuthError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(token).filter(|t| !t.is_expired()).cloned())
    }

    async fn put(&self, info: TokenInfo, ttl: Duration) -> Result<(), AuthError> {
        let info = apply_ttl(info, ttl);
        let mut tokens = self.tokens.write().await;
        tokens.insert(info.token.clone(), info);
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        tokens.remove(token);
        Ok(())
    }

    async fn put_auth_code(&self, code: AuthorizationCode) -> Result<(), AuthError> {
        let mut codes = self.auth_codes.write().await;
        codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn consume_auth_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let mut codes = self.auth_codes.write().await;
        let stored = codes
            .remove(code)
            .ok_or_else(|| AuthError::InvalidGrant("unknown authorization code".to_string()))?;
        if stored.is_expired() {
            return Err(AuthError::InvalidGrant(
                "authorization code expired".to_string(),
            ));
        }
        verify_challenge(verifier, &stored.pkce_challenge)?;
        Ok(stored)
    }
}

/// File-backed token store: one JSON document per token under a
/// directory. Suited to single-host deployments; a database-backed
/// implementation plugs in through the same trait.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    directory: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<TokenInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_code: Option<AuthorizationCode>,
}

impl FileTokenStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, kind: &str, key: &str) -> PathBuf {
        // Keys are opaque strings; hex-encode so they are path safe.
        let encoded: String = key.bytes().map(|b| format!("{b:02x}")).collect();
        self.directory.join(format!("{kind}-{encoded}.json"))
    }

    async fn read_entry(&self, path: &PathBuf) -> Result<Option<StoredEntry>, AuthError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entry(&self, path: &PathBuf, entry: &StoredEntry) -> Result<(), AuthError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        tokio::fs::write(path, serde_json::to_vec_pretty(entry)?).await?;
        Ok(())
    }

    async fn remove(&self, path: &PathBuf) -> Result<(), AuthError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, token: &str) -> Result<Option<TokenInfo>, AuthError> {
        let path = self.path_for("token", token);
        let entry = self.read_entry(&path).await?;
        let info = entry.and_then(|e| e.token);
        match info {
            Some(info) if info.is_expired() => {
                self.remove(&path).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, info: TokenInfo, ttl: Duration) -> Result<(), AuthError> {
        let info = apply_ttl(info, ttl);
        let path = self.path_for("token", &info.token);
        debug!(path = %path.display(), "persisting token");
        self.write_entry(
            &path,
            &StoredEntry {
                token: Some(info),
                auth_code: None,
            },
        )
        .await
    }

    async fn delete(&self, token: &str) -> Result<(), AuthError> {
        self.remove(&self.path_for("token", token)).await
    }

    async fn put_auth_code(&self, code: AuthorizationCode) -> Result<(), AuthError> {
        let path = self.path_for("code", &code.code);
        self.write_entry(
            &path,
            &StoredEntry {
                token: None,
                auth_code: Some(code),
            },
        )
        .await
    }

    async fn consume_auth_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let path = self.path_for("code", code);
        let entry = self.read_entry(&path).await?;
        self.remove(&path).await?;
        let stored = entry
            .and_then(|e| e.auth_code)
            .ok_or_else(|| AuthError::InvalidGrant("unknown authorization code".to_string()))?;
        if stored.is_expired() {
            return Err(AuthError::InvalidGrant(
                "authorization code expired".to_string(),
            ));
        }
        verify_challenge(verifier, &stored.pkce_challenge)?;
        Ok(stored)
    }
}

/// Helper to mint an [`AuthorizationCode`] for a client.
pub fn issue_auth_code(
    client_id: impl Into<String>,
    redirect_uri: impl Into<String>,
    pkce_challenge: impl Into<String>,
    scopes: std::collections::HashSet<String>,
    lifetime: Duration,
) -> AuthorizationCode {
    AuthorizationCode {
        code: portico_mcp_core::ids::generate_secure_random(48),
        client_id: client_id.into(),
        redirect_uri: redirect_uri.into(),
        pkce_challenge: pkce_challenge.into(),
        scopes,
        expires_at: Utc::now() + lifetime,
    }
}
