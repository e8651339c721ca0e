//! Resource-server side bearer authentication.
//!
//! Sits in front of the HTTP transport: extracts the bearer token,
//! resolves it through the token store (or a JWT validator), and binds
//! the resulting principal to the session. Rejections carry the HTTP
//! status and a `WWW-Authenticate` header pointing at the protected
//! resource metadata (RFC 9728).

use std::sync::Arc;
use tracing::debug;

use crate::error::AuthError;
use crate::store::TokenStore;
use crate::types::{scope_for_method, AuthPrincipal};
use crate::validation::{extract_bearer_token, TokenValidator};

/// How bearer tokens are resolved.
pub enum TokenResolver {
    /// Look tokens up in the pluggable store.
    Store(Arc<dyn TokenStore>),
    /// Validate tokens as JWTs.
    Jwt(TokenValidator),
}

/// A rejected request, ready to render as an HTTP response.
#[derive(Debug)]
pub struct AuthRejection {
    pub status: u16,
    pub www_authenticate: String,
    pub error: AuthError,
}

/// Bearer middleware configuration and validation entry point.
pub struct BearerAuth {
    resolver: TokenResolver,
    /// Absolute URL of the RFC 9728 metadata document, advertised in
    /// `WWW-Authenticate` on 401.
    resource_metadata_url: String,
}

impl BearerAuth {
    pub fn new(resolver: TokenResolver, resource_metadata_url: impl Into<String>) -> Self {
        Self {
            resolver,
            resource_metadata_url: resource_metadata_url.into(),
        }
    }

    pub fn with_store(store: Arc<dyn TokenStore>, resource_metadata_url: impl Into<String>) -> Self {
        Self::new(TokenResolver::Store(store), resource_metadata_url)
    }

    pub fn with_jwt(validator: TokenValidator, resource_metadata_url: impl Into<String>) -> Self {
        Self::new(TokenResolver::Jwt(validator), resource_metadata_url)
    }

    fn reject(&self, error: AuthError) -> AuthRejection {
        let status = error.http_status();
        let www_authenticate = match &error {
            AuthError::MissingScope { scope } => format!(
                "Bearer resource_metadata=\"{}\", error=\"insufficient_scope\", scope=\"{}\"",
                self.resource_metadata_url, scope
            ),
            _ => format!(
                "Bearer resource_metadata=\"{}\", error=\"invalid_token\"",
                self.resource_metadata_url
            ),
        };
        AuthRejection {
            status,
            www_authenticate,
            error,
        }
    }

    /// Resolve the Authorization header into a principal.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<AuthPrincipal, AuthRejection> {
        let header = authorization
            .ok_or_else(|| self.reject(AuthError::InvalidToken("missing token".to_string())))?;
        let token = extract_bearer_token(header).map_err(|e| self.reject(e))?;

        match &self.resolver {
            TokenResolver::Store(store) => {
                let info = store
                    .get(token)
                    .await
                    .map_err(|e| self.reject(e))?
                    .ok_or_else(|| self.reject(AuthError::TokenExpired))?;
                debug!(client_id = %info.client_id, "bearer token accepted");
                Ok(AuthPrincipal {
                    client_id: info.client_id,
                    subject: info.subject,
                    scopes: info.scopes,
                })
            }
            TokenResolver::Jwt(validator) => {
                let claims = validator.validate_token(token).map_err(|e| self.reject(e))?;
                let scopes = claims
                    .scope
                    .as_deref()
                    .map(|s| s.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                debug!(subject = %claims.sub, "JWT bearer accepted");
                Ok(AuthPrincipal {
                    client_id: claims.iss,
                    subject: Some(claims.sub),
                    scopes,
                })
            }
        }
    }

    /// Check that the principal may invoke `method`.
    pub fn authorize_method(
        &self,
        principal: &AuthPrincipal,
        method: &str,
    ) -> Result<(), AuthRejection> {
        let scope = scope_for_method(method);
        if principal.has_scope(&scope) {
            Ok(())
        } else {
            Err(self.reject(AuthError::MissingScope { scope }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenStore;
    use crate::types::TokenInfo;
    use chrono::{Duration, Utc};

    async fn auth_with_token(scopes: &[&str]) -> (BearerAuth, String) {
        let store = Arc::new(InMemoryTokenStore::new());
        let token = "tok-abc".to_string();
        store
            .put(
                TokenInfo {
                    token: token.clone(),
                    client_id: "client-1".to_string(),
                    subject: Some("alice".to_string()),
                    scopes: scopes.iter().map(|s| s.to_string()).collect(),
                    expires_at: Utc::now(),
                },
                Duration::minutes(5),
            )
            .await
            .unwrap();
        let auth = BearerAuth::with_store(
            store,
            "https://mcp.example.com/.well-known/oauth-protected-resource",
        );
        (auth, token)
    }

    #[tokio::test]
    async fn missing_token_is_401_with_metadata_pointer() {
        let (auth, _) = auth_with_token(&[]).await;
        let rejection = auth.authenticate(None).await.unwrap_err();
        assert_eq!(rejection.status, 401);
        assert!(rejection
            .www_authenticate
            .contains(".well-known/oauth-protected-resource"));
    }

    #[tokio::test]
    async fn valid_token_binds_principal() {
        let (auth, token) = auth_with_token(&["mcp:tools/call"]).await;
        let principal = auth
            .authenticate(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(principal.client_id, "client-1");
        assert_eq!(principal.subject.as_deref(), Some("alice"));
        assert!(principal.has_scope("mcp:tools/call"));
    }

    #[tokio::test]
    async fn unknown_token_is_401() {
        let (auth, _) = auth_with_token(&[]).await;
        let rejection = auth
            .authenticate(Some("Bearer nope"))
            .await
            .unwrap_err();
        assert_eq!(rejection.status, 401);
    }

    #[tokio::test]
    async fn insufficient_scope_is_403() {
        let (auth, token) = auth_with_token(&["mcp:resources/read"]).await;
        let principal = auth
            .authenticate(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        let rejection = auth
            .authorize_method(&principal, "tools/call")
            .unwrap_err();
        assert_eq!(rejection.status, 403);
        assert!(rejection.www_authenticate.contains("insufficient_scope"));

        assert!(auth.authorize_method(&principal, "resources/read").is_ok());
    }

    #[tokio::test]
    async fn jwt_resolver_path() {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use std::collections::HashMap;

        let now = chrono::Utc::now().timestamp() as u64;
        let claims = crate::types::TokenClaims {
            sub: "bob".to_string(),
            aud: vec![],
            iss: "https://auth.example.com".to_string(),
            exp: now + 300,
            iat: now,
            nbf: None,
            scope: Some("mcp:prompts/get".to_string()),
            additional_claims: HashMap::new(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let auth = BearerAuth::with_jwt(
            TokenValidator::new("secret"),
            "https://mcp.example.com/.well-known/oauth-protected-resource",
        );
        let principal = auth
            .authenticate(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(principal.subject.as_deref(), Some("bob"));
        assert!(auth.authorize_method(&principal, "prompts/get").is_ok());
    }
}
