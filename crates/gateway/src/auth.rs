//! JWT validation for the connection handshake.
//!
//! Tokens are issued elsewhere (the identity provider); the gateway only
//! validates signature and expiry, then resolves the subject to an internal
//! user id through the archive. Validation is CPU-only and never suspends.

use std::str::FromStr;

use {
    jsonwebtoken::{Algorithm, DecodingKey, Validation, decode},
    serde::Deserialize,
    tracing::warn,
};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    secret: String,
    algorithm: Algorithm,
}

impl AuthConfig {
    /// Build from the configured secret and algorithm name (e.g. "HS256").
    pub fn new(secret: impl Into<String>, algorithm: &str) -> Result<Self, String> {
        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|_| format!("unsupported JWT algorithm: {algorithm}"))?;
        Ok(Self {
            secret: secret.into(),
            algorithm,
        })
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Identity-provider subject, resolved to an internal user id later.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

/// Validate a token and return its claims, or `None` if it is invalid or
/// expired.
pub fn decode_token(token: &str, auth: &AuthConfig) -> Option<TokenClaims> {
    let validation = Validation::new(auth.algorithm);
    match decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(auth.secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            warn!(error = %e, "token rejected");
            None
        },
    }
}

/// Validate a token and return the identity-provider subject.
pub fn validate_token(token: &str, auth: &AuthConfig) -> Option<String> {
    decode_token(token, auth).map(|claims| claims.sub)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::{Duration, Utc},
        jsonwebtoken::{EncodingKey, Header, encode},
        serde::Serialize,
    };

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        iat: i64,
        exp: i64,
        jti: String,
    }

    fn make_token(sub: &str, secret: &str, expires_in: Duration) -> String {
        let now = Utc::now();
        let claims = TestClaims {
            sub: sub.into(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            jti: "t1".into(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn test_auth() -> AuthConfig {
        AuthConfig::new("test_secret", "HS256").unwrap()
    }

    #[test]
    fn valid_token_yields_subject() {
        let token = make_token("kc-user-1", "test_secret", Duration::hours(1));
        assert_eq!(
            validate_token(&token, &test_auth()).as_deref(),
            Some("kc-user-1")
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = make_token("kc-user-1", "test_secret", Duration::hours(-1));
        assert!(validate_token(&token, &test_auth()).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token("kc-user-1", "wrong_secret", Duration::hours(1));
        assert!(validate_token(&token, &test_auth()).is_none());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(validate_token("invalid.token.here", &test_auth()).is_none());
    }

    #[test]
    fn unknown_algorithm_is_a_config_error() {
        assert!(AuthConfig::new("s", "ROT13").is_err());
    }
}
