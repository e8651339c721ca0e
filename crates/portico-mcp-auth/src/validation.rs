//! Bearer-token extraction, JWT validation, and URL safety checks.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::AuthError;
use crate::types::TokenClaims;

const MAX_TOKEN_LENGTH: usize = 4096;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(auth_header: &str) -> Result<&str, AuthError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidToken("not a Bearer token".to_string()))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("empty token".to_string()));
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(AuthError::InvalidToken(format!(
            "token too long: {} bytes (max {MAX_TOKEN_LENGTH})",
            token.len()
        )));
    }
    Ok(token)
}

/// Reject URLs with schemes that can execute in a browser context.
pub fn validate_safe_url(raw: &str) -> Result<url::Url, AuthError> {
    let lowered = raw.trim().to_ascii_lowercase();
    for scheme in ["javascript:", "data:", "vbscript:"] {
        if lowered.starts_with(scheme) {
            return Err(AuthError::UnsafeUrl(raw.to_string()));
        }
    }
    let parsed = url::Url::parse(raw)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(AuthError::UnsafeUrl(format!("scheme '{other}' not allowed"))),
    }
}

/// Validates JWT access tokens (HS256 by default).
#[derive(Clone)]
pub struct TokenValidator {
    validation: Validation,
    decoding_key: DecodingKey,
}

impl TokenValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience is checked explicitly via validate_audience.
        validation.validate_aud = false;
        Self {
            validation,
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn with_decoding_key(mut self, key: DecodingKey) -> Self {
        self.decoding_key = key;
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }

    /// RFC 8707 audience restriction.
    pub fn validate_audience(
        &self,
        claims: &TokenClaims,
        expected: &str,
    ) -> Result<(), AuthError> {
        if !claims.aud.iter().any(|a| a == expected) {
            return Err(AuthError::InvalidAudience {
                expected: expected.to_string(),
                actual: claims.aud.join(", "),
            });
        }
        Ok(())
    }

    pub fn validate_scopes(
        &self,
        claims: &TokenClaims,
        required: &[String],
    ) -> Result<(), AuthError> {
        let granted: Vec<&str> = claims
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default();
        for scope in required {
            if !granted.contains(&scope.as_str()) {
                return Err(AuthError::MissingScope {
                    scope: scope.clone(),
                });
            }
        }
        Ok(())
    }
}
