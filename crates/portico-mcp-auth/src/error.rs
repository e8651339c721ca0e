use thiserror::Error;

/// Authentication and authorization errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("missing required scope: {scope}")]
    MissingScope { scope: String },

    #[error("invalid token audience: expected {expected}, got {actual}")]
    InvalidAudience { expected: String, actual: String },

    #[error("invalid client credentials")]
    InvalidCredentials,

    #[error("PKCE challenge verification failed")]
    PkceChallengeFailed,

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("unsafe URL: {0}")]
    UnsafeUrl(String),

    #[error("authorization server error: {error}")]
    AuthorizationServerError { error: String },

    #[error("token exchange error: {error}")]
    TokenExchangeError { error: String },

    #[error("token store error: {0}")]
    StoreError(String),

    #[error("network error during authentication: {source}")]
    ReqwestError {
        #[from]
        source: reqwest::Error,
    },

    #[error("JWT error: {source}")]
    JwtError {
        #[from]
        source: jsonwebtoken::errors::Error,
    },

    #[error("serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid URL: {source}")]
    UrlError {
        #[from]
        source: url::ParseError,
    },

    #[error("io error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl AuthError {
    /// HTTP status this rejection maps to: 401 for identity problems,
    /// 403 for scope problems.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::MissingScope { .. } => 403,
            _ => 401,
        }
    }
}

/// RFC 6749 error object returned by authorization endpoints.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthErrorResponse {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: Some(description.into()),
            error_uri: None,
        }
    }
}

impl From<&AuthError> for OAuthErrorResponse {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::InvalidToken(_) | AuthError::TokenExpired => "invalid_token",
            AuthError::MissingScope { .. } => "insufficient_scope",
            AuthError::InvalidCredentials => "invalid_client",
            AuthError::InvalidGrant(_) | AuthError::PkceChallengeFailed => "invalid_grant",
            AuthError::InvalidRedirectUri(_) | AuthError::UnsafeUrl(_) => "invalid_request",
            _ => "server_error",
        };
        Self::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AuthError::TokenExpired.http_status(), 401);
        assert_eq!(
            AuthError::MissingScope {
                scope: "mcp:tools/call".to_string()
            }
            .http_status(),
            403
        );
    }

    #[test]
    fn oauth_error_codes() {
        let err = AuthError::PkceChallengeFailed;
        let body = OAuthErrorResponse::from(&err);
        assert_eq!(body.error, "invalid_grant");
    }
}
