//! Signed, time-bounded tokens.
//!
//! Access tokens, refresh tokens and the short-lived OTP/reset correlation
//! tokens all share this shape; callers pick the secret and lifetime. Every
//! verification failure collapses into a single `Invalid` error so nothing
//! leaks about which check rejected the token.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,
    #[error("Failed to sign token")]
    Signing,
}

/// Issue a token for `user_id` with the given secret and lifetime.
pub fn issue(
    user_id: &str,
    role: Option<&str>,
    email: Option<&str>,
    secret: &str,
    ttl: Duration,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.map(str::to_string),
        email: email.map(str::to_string),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|_| TokenError::Signing)
}

/// Verify signature and expiry, returning the claims.
pub fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let token = issue("u-1", Some("user"), None, "secret", Duration::hours(1)).unwrap();
        let claims = verify(&token, "secret").unwrap();

        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role.as_deref(), Some("user"));
        assert!(claims.email.is_none());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = issue("u-1", Some("user"), None, "secret-a", Duration::hours(1)).unwrap();
        assert!(matches!(
            verify(&token, "secret-b"),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_expired_token_fails() {
        let token = issue("u-1", None, None, "secret", Duration::minutes(-2)).unwrap();
        assert!(matches!(verify(&token, "secret"), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_malformed_token_fails() {
        assert!(matches!(
            verify("not.a.token", "secret"),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_email_claims_for_correlation_tokens() {
        let token = issue(
            "u-2",
            None,
            Some("anna@example.com"),
            "secret",
            Duration::minutes(3),
        )
        .unwrap();
        let claims = verify(&token, "secret").unwrap();
        assert_eq!(claims.email.as_deref(), Some("anna@example.com"));
        assert!(claims.role.is_none());
    }
}
