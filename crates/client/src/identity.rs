//! Identity token verification.
//!
//! Submissions carry an ID token; verifying it yields the [`User`] recorded as
//! the owner of the record.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use pwadir_core::{AppConfig, Error, User};

/// Exchanges a bearer token for the identity it asserts.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<User, Error>;
}

/// Claims read from an identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<IdentityClaims> for User {
    fn from(claims: IdentityClaims) -> Self {
        User { id: claims.sub, name: claims.name, email: claims.email }
    }
}

/// HS256 JWT verifier with fixed audience and issuer.
///
/// Without a secret every token is rejected.
pub struct JwtVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: Option<&str>, audience: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&[issuer]);

        Self { key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())), validation }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.auth_secret.as_deref(), &config.auth_audience, &config.auth_issuer)
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<User, Error> {
        let Some(key) = &self.key else {
            return Err(Error::NotLoggedIn("identity verification is not configured".into()));
        };

        let data = decode::<IdentityClaims>(token.trim(), key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "identity token rejected");
            Error::NotLoggedIn(e.to_string())
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(Error::NotLoggedIn("token has an empty subject".into()));
        }

        Ok(data.claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "test-secret";

    fn token(secret: &str, sub: &str, aud: &str, exp_offset: i64) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let claims = serde_json::json!({
            "sub": sub,
            "email": "dev@example.com",
            "name": "Dev",
            "aud": aud,
            "iss": "pwa-directory",
            "iat": now,
            "exp": now + exp_offset,
        });
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(Some(SECRET), "pwa-directory", "pwa-directory")
    }

    #[tokio::test]
    async fn test_valid_token() {
        let user = verifier().verify(&token(SECRET, "user-1", "pwa-directory", 600)).await.unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.email.as_deref(), Some("dev@example.com"));
        assert_eq!(user.name.as_deref(), Some("Dev"));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let result = verifier().verify(&token("other", "user-1", "pwa-directory", 600)).await;
        assert!(matches!(result, Err(Error::NotLoggedIn(_))));
    }

    #[tokio::test]
    async fn test_wrong_audience() {
        let result = verifier().verify(&token(SECRET, "user-1", "someone-else", 600)).await;
        assert!(matches!(result, Err(Error::NotLoggedIn(_))));
    }

    #[tokio::test]
    async fn test_expired() {
        let result = verifier().verify(&token(SECRET, "user-1", "pwa-directory", -3600)).await;
        assert!(matches!(result, Err(Error::NotLoggedIn(_))));
    }

    #[tokio::test]
    async fn test_empty_subject() {
        let result = verifier().verify(&token(SECRET, " ", "pwa-directory", 600)).await;
        assert!(matches!(result, Err(Error::NotLoggedIn(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_rejects_everything() {
        let verifier = JwtVerifier::from_config(&AppConfig::default());
        let result = verifier.verify(&token(SECRET, "user-1", "pwa-directory", 600)).await;
        assert!(matches!(result, Err(Error::NotLoggedIn(_))));
        assert!(verifier.verify("garbage").await.is_err());
    }
}
