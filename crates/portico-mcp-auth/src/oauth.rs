//! Client-side OAuth 2.1 authorization-code flow with PKCE.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;

use crate::error::AuthError;
use crate::types::{
    AuthorizationServerMetadata, ClientRegistrationRequest, ClientRegistrationResponse,
    OAuthConfig, PkceParams, ProtectedResourceMetadata, TokenResponse,
};
use crate::validation::validate_safe_url;

/// Refresh this long before the access token actually expires.
const REFRESH_SKEW_SECONDS: i64 = 60;

/// OAuth 2.1 client: discovery, registration, authorization URL
/// construction, code exchange, and refresh.
pub struct OAuthClient {
    http_client: Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            http_client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Discover protected resource metadata (RFC 9728).
    pub async fn discover_resource_metadata(
        &self,
        resource: &str,
    ) -> Result<ProtectedResourceMetadata, AuthError> {
        let base = validate_safe_url(resource)?;
        let discovery_url = format!(
            "{}/.well-known/oauth-protected-resource",
            base.as_str().trim_end_matches('/')
        );
        let response = self
            .http_client
            .get(&discovery_url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::AuthorizationServerError {
                error: format!("resource metadata discovery failed: {}", response.status()),
            });
        }
        Ok(response.json().await?)
    }

    /// Discover authorization server metadata (RFC 8414).
    pub async fn discover_server_metadata(
        &self,
        issuer: &str,
    ) -> Result<AuthorizationServerMetadata, AuthError> {
        let base = validate_safe_url(issuer)?;
        let discovery_url = format!(
            "{}/.well-known/oauth-authorization-server",
            base.as_str().trim_end_matches('/')
        );
        let response = self
            .http_client
            .get(&discovery_url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::AuthorizationServerError {
                error: format!("metadata discovery failed: {}", response.status()),
            });
        }
        Ok(response.json().await?)
    }

    /// Register a client dynamically (RFC 7591).
    pub async fn register_client(
        &self,
        registration_endpoint: &str,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, AuthError> {
        validate_safe_url(registration_endpoint)?;
        let response = self
            .http_client
            .post(registration_endpoint)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthorizationServerError {
                error: format!("client registration failed: {body}"),
            });
        }
        Ok(response.json().await?)
    }

    /// Build the authorization URL carrying the PKCE challenge.
    pub fn build_authorization_url(
        &self,
        state: &str,
        pkce: &PkceParams,
    ) -> Result<String, AuthError> {
        let mut url = validate_safe_url(&self.config.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", &pkce.code_challenge_method);
        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        authorization_code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("redirect_uri", self.config.redirect_uri.as_str());
        params.insert("code", authorization_code);
        params.insert("code_verifier", code_verifier);
        self.post_token_request(params).await
    }

    /// Refresh an access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("refresh_token", refresh_token);
        self.post_token_request(params).await
    }

    async fn post_token_request(
        &self,
        params: HashMap<&str, &str>,
    ) -> Result<TokenResponse, AuthError> {
        validate_safe_url(&self.config.token_endpoint)?;
        let mut request = self
            .http_client
            .post(&self.config.token_endpoint)
            .header("Accept", "application/json");
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }
        let response = request.form(&params).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeError {
                error: format!("token request failed: {body}"),
            });
        }
        Ok(response.json().await?)
    }
}

/// Tracks an issued token pair and refreshes before expiry.
pub struct TokenManager {
    client: OAuthClient,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenManager {
    pub fn new(client: OAuthClient, response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs as i64));
        Self {
            client,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
        }
    }

    fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + Duration::seconds(REFRESH_SKEW_SECONDS) >= at,
            None => false,
        }
    }

    /// Current access token, refreshed proactively when close to
    /// expiry and a refresh token is available.
    pub async fn access_token(&mut self) -> Result<&str, AuthError> {
        if self.needs_refresh() {
            if let Some(refresh) = self.refresh_token.clone() {
                debug!("access token near expiry, refreshing");
                let response = self.client.refresh_token(&refresh).await?;
                self.expires_at = response
                    .expires_in
                    .map(|secs| Utc::now() + Duration::seconds(secs as i64));
                self.access_token = response.access_token;
                if response.refresh_token.is_some() {
                    self.refresh_token = response.refresh_token;
                }
            }
        }
        Ok(&self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::generate_pkce_params;

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "client-1".to_string(),
            client_secret: None,
            authorization_endpoint: "https://auth.example.com/authorize".to_string(),
            token_endpoint: "https://auth.example.com/token".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            scopes: vec!["mcp:tools/call".to_string(), "mcp:resources/read".to_string()],
        }
    }

    #[test]
    fn authorization_url_carries_pkce() {
        let client = OAuthClient::new(config());
        let pkce = generate_pkce_params();
        let url = client.build_authorization_url("state-1", &pkce).unwrap();
        assert!(url.starts_with("https://auth.example.com/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains(&format!("code_challenge={}", pkce.code_challenge)));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=mcp%3Atools%2Fcall+mcp%3Aresources%2Fread"));
    }

    #[test]
    fn dangerous_authorization_endpoint_rejected() {
        let mut bad = config();
        bad.authorization_endpoint = "javascript:alert(1)".to_string();
        let client = OAuthClient::new(bad);
        let pkce = generate_pkce_params();
        assert!(client.build_authorization_url("s", &pkce).is_err());
    }

    #[tokio::test]
    async fn token_manager_skips_refresh_when_fresh() {
        let response = TokenResponse {
            access_token: "fresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: Some("refresh".to_string()),
            scope: None,
        };
        let mut manager = TokenManager::new(OAuthClient::new(config()), response);
        assert_eq!(manager.access_token().await.unwrap(), "fresh");
    }
}
