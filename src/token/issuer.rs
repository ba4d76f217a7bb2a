use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use uuid::Uuid;

use super::{ClientContext, TokenClaims};
use crate::clock::Clock;
use crate::utils::SecureString;

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints submission tokens. Holds no state besides the signing key; nothing
/// is recorded about issued tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    issuer: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(
        secret: &SecureString,
        issuer: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if secret.as_str().trim().is_empty() {
            anyhow::bail!("Cannot issue tokens: JWT secret is empty");
        }
        if ttl <= Duration::zero() {
            anyhow::bail!("Token lifetime must be positive");
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_str().as_bytes()),
            issuer: issuer.into(),
            ttl,
            clock,
        })
    }

    pub fn issue(&self, client: &ClientContext) -> Result<IssuedToken> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let claims = TokenClaims {
            jti: Uuid::new_v4().to_string(),
            timestamp: now.timestamp_millis(),
            fingerprint: client.fingerprint(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to encode submission token")?;

        Ok(IssuedToken { token, expires_at })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
