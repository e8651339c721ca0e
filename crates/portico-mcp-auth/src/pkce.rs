//! PKCE (RFC 7636) verifier and challenge handling.

use crate::error::AuthError;
use crate::types::PkceParams;
use base64::Engine;
use portico_mcp_core::ids::generate_secure_random;
use sha2::Digest;

/// Verifier length bounds from RFC 7636 §4.1.
pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Generate a fresh verifier and its S256 challenge.
pub fn generate_pkce_params() -> PkceParams {
    let code_verifier = generate_secure_random(MAX_VERIFIER_LENGTH);
    let code_challenge = derive_challenge(&code_verifier);
    PkceParams {
        code_verifier,
        code_challenge,
        code_challenge_method: "S256".to_string(),
    }
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn derive_challenge(verifier: &str) -> String {
    let digest = sha2::Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Verify a presented verifier against the stored challenge.
pub fn verify_challenge(verifier: &str, challenge: &str) -> Result<(), AuthError> {
    if verifier.len() < MIN_VERIFIER_LENGTH || verifier.len() > MAX_VERIFIER_LENGTH {
        return Err(AuthError::PkceChallengeFailed);
    }
    if !verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
        return Err(AuthError::PkceChallengeFailed);
    }
    if derive_challenge(verifier) != challenge {
        return Err(AuthError::PkceChallengeFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_params_verify() {
        let params = generate_pkce_params();
        assert_eq!(params.code_challenge_method, "S256");
        assert_eq!(params.code_verifier.len(), MAX_VERIFIER_LENGTH);
        assert!(verify_challenge(&params.code_verifier, &params.code_challenge).is_ok());
    }

    #[test]
    fn wrong_verifier_rejected() {
        let params = generate_pkce_params();
        let other = generate_pkce_params();
        assert!(verify_challenge(&other.code_verifier, &params.code_challenge).is_err());
    }

    #[test]
    fn short_verifier_rejected() {
        let challenge = derive_challenge("short");
        assert!(verify_challenge("short", &challenge).is_err());
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        // Test vector from RFC 7636 Appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            derive_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(verify_challenge(verifier, &derive_challenge(verifier)).is_ok());
    }

    #[test]
    fn params_are_unique() {
        let a = generate_pkce_params();
        let b = generate_pkce_params();
        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.code_challenge, b.code_challenge);
    }
}
