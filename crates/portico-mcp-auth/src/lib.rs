//! # Portico MCP Auth
//!
//! OAuth 2.1 authorization for MCP deployments: the resource-server
//! side (bearer token validation against a pluggable token store or a
//! JWT validator, scope enforcement, `WWW-Authenticate` challenges)
//! and the client side (PKCE authorization-code flow with proactive
//! refresh), plus the RFC 9728 / RFC 8414 / RFC 7591 metadata
//! documents.

pub mod error;
pub mod middleware;
pub mod oauth;
pub mod pkce;
pub mod store;
pub mod types;
pub mod validation;

pub use error::{AuthError, OAuthErrorResponse};
pub use middleware::{AuthRejection, BearerAuth, TokenResolver};
pub use oauth::{OAuthClient, TokenManager};
pub use pkce::{derive_challenge, generate_pkce_params, verify_challenge};
pub use store::{issue_auth_code, FileTokenStore, InMemoryTokenStore, TokenStore};
pub use types::{
    scope_for_method, AuthPrincipal, AuthorizationCode, AuthorizationServerMetadata,
    ClientRegistrationRequest, ClientRegistrationResponse, OAuthConfig, PkceParams,
    ProtectedResourceMetadata, TokenClaims, TokenInfo, TokenResponse,
};
pub use validation::{extract_bearer_token, validate_safe_url, TokenValidator};

/// Result type for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;
