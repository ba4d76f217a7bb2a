use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::{ClientContext, TokenClaims, TokenError, UsedTokenStore};
use crate::clock::Clock;
use crate::utils::SecureString;

/// Whether a protected action requires the token to be unspent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUse {
    /// Message submission: the token must not be in the used-token registry
    SingleUse,
    /// Message deletion: proof of a fresh, client-bound token is enough
    Reusable,
}

/// Verifies presented tokens. Never mutates the used-token registry;
/// consumption is the caller's last step.
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    used_tokens: Arc<dyn UsedTokenStore>,
}

impl TokenValidator {
    pub fn new(
        secret: &SecureString,
        issuer: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
        used_tokens: Arc<dyn UsedTokenStore>,
    ) -> Result<Self> {
        if secret.as_str().trim().is_empty() {
            anyhow::bail!("Cannot verify tokens: JWT secret is empty");
        }

        let issuer: String = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = 0;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_str().as_bytes()),
            validation,
            ttl,
            clock,
            used_tokens,
        })
    }

    /// Full check for a single-use action.
    pub async fn validate(
        &self,
        token: &str,
        client: &ClientContext,
    ) -> Result<TokenClaims, TokenError> {
        self.validate_for(token, client, TokenUse::SingleUse).await
    }

    /// Checks, in order: signature, age, single-use (if required), binding.
    /// The first failing check decides the error.
    pub async fn validate_for(
        &self,
        token: &str,
        client: &ClientContext,
        usage: TokenUse,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.verify_signature(token)?;
        self.check_age(&claims)?;

        if usage == TokenUse::SingleUse
            && self
                .used_tokens
                .contains(token)
                .await
                .map_err(TokenError::Registry)?
        {
            return Err(TokenError::AlreadyUsed);
        }

        let expected = client.fingerprint();
        if !bool::from(claims.fingerprint.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(TokenError::ContextMismatch);
        }

        Ok(claims)
    }

    /// First instant at which the token fails the age check. The `exp` claim
    /// is whole seconds and may run past this, so consumed-token entries are
    /// kept until this point instead.
    pub fn expires_at(&self, claims: &TokenClaims) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(claims.timestamp)
            .and_then(|issued| issued.checked_add_signed(self.ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Signature and structure. The library's own `exp` enforcement runs
    /// here too and reports `Expired`.
    fn verify_signature(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Explicit age check against the embedded issue time. Catches tokens the
    /// `exp` claim lets through (mis-issued, or clock skew between issuer
    /// and verifier).
    fn check_age(&self, claims: &TokenClaims) -> Result<(), TokenError> {
        let age_ms = self.clock.now().timestamp_millis() - claims.timestamp;
        if age_ms >= self.ttl.num_milliseconds() {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::token::{InMemoryUsedTokens, TokenIssuer};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_secret_at_least_32_characters_long";
    const ISSUER: &str = "murmur-server";

    struct Fixture {
        clock: Arc<ManualClock>,
        used: Arc<InMemoryUsedTokens>,
        issuer: TokenIssuer,
        validator: TokenValidator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let used = Arc::new(InMemoryUsedTokens::new());
        let secret = SecureString::from(SECRET);
        let ttl = Duration::seconds(120);

        let issuer = TokenIssuer::new(&secret, ISSUER, ttl, clock.clone()).unwrap();
        let validator =
            TokenValidator::new(&secret, ISSUER, ttl, clock.clone(), used.clone()).unwrap();

        Fixture {
            clock,
            used,
            issuer,
            validator,
        }
    }

    fn client() -> ClientContext {
        ClientContext::new("192.0.2.10", "Mozilla/5.0 (X11; Linux x86_64)")
    }

    #[tokio::test]
    async fn test_fresh_token_validates() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();

        let claims = f.validator.validate(&issued.token, &client()).await.unwrap();
        assert_eq!(claims.fingerprint, client().fingerprint());
        assert_eq!(claims.iss, ISSUER);
    }

    #[tokio::test]
    async fn test_garbage_is_invalid() {
        let f = fixture();
        for token in ["", "not-a-jwt", "a.b.c"] {
            let err = f.validator.validate(token, &client()).await.unwrap_err();
            assert!(matches!(err, TokenError::Invalid), "token {:?}", token);
        }
    }

    #[tokio::test]
    async fn test_foreign_signature_is_invalid() {
        let f = fixture();
        let clock = Arc::new(ManualClock::starting_now());
        let other = TokenIssuer::new(
            &SecureString::from("another_secret_which_is_long_enough_too"),
            ISSUER,
            Duration::seconds(120),
            clock,
        )
        .unwrap();
        let issued = other.issue(&client()).unwrap();

        let err = f.validator.validate(&issued.token, &client()).await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid));
    }

    #[tokio::test]
    async fn test_wrong_issuer_is_invalid() {
        let f = fixture();
        let clock = Arc::new(ManualClock::starting_now());
        let other = TokenIssuer::new(
            &SecureString::from(SECRET),
            "someone-else",
            Duration::seconds(120),
            clock,
        )
        .unwrap();
        let issued = other.issue(&client()).unwrap();

        let err = f.validator.validate(&issued.token, &client()).await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid));
    }

    #[tokio::test]
    async fn test_token_expires_at_window_boundary() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();

        f.clock.advance(Duration::milliseconds(119_999));
        assert!(f.validator.validate(&issued.token, &client()).await.is_ok());

        f.clock.advance(Duration::milliseconds(1));
        let err = f.validator.validate(&issued.token, &client()).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn test_library_exp_check_reports_expired() {
        // Token minted two minutes in the past: `exp` has already passed in
        // wall-clock time even though the validator's clock is fresh.
        let f = fixture();
        let past = Utc::now() - Duration::seconds(300);
        let claims = TokenClaims {
            jti: "jti".to_string(),
            timestamp: Utc::now().timestamp_millis(),
            fingerprint: client().fingerprint(),
            iat: past.timestamp(),
            exp: (past + Duration::seconds(120)).timestamp(),
            iss: ISSUER.to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = f.validator.validate(&token, &client()).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn test_mis_issued_exp_is_caught_by_age_check() {
        // A far-future `exp` does not extend the lifetime past the window.
        let f = fixture();
        let now = f.clock.now();
        let claims = TokenClaims {
            jti: "jti".to_string(),
            timestamp: now.timestamp_millis(),
            fingerprint: client().fingerprint(),
            iat: now.timestamp(),
            exp: (now + Duration::days(30)).timestamp(),
            iss: ISSUER.to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        f.clock.advance(Duration::seconds(121));
        let err = f.validator.validate(&token, &client()).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn test_expires_at_matches_age_check_to_the_millisecond() {
        let f = fixture();
        // 900 ms past a whole second, so `exp` rounds down by 0.9 s
        let issued_at = DateTime::from_timestamp(Utc::now().timestamp(), 900_000_000).unwrap();
        f.clock.set(issued_at);
        let issued = f.issuer.issue(&client()).unwrap();
        let claims = f.validator.validate(&issued.token, &client()).await.unwrap();

        let expires_at = f.validator.expires_at(&claims);
        assert_eq!(expires_at, issued_at + Duration::seconds(120));
        // The whole-second `exp` claim ends earlier than the window
        assert!(expires_at.timestamp() >= claims.exp);

        f.clock.set(expires_at - Duration::milliseconds(1));
        assert!(f.validator.validate(&issued.token, &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_used_token_is_rejected() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();
        f.used.mark_used(&issued.token, issued.expires_at).await.unwrap();

        let err = f.validator.validate(&issued.token, &client()).await.unwrap_err();
        assert!(matches!(err, TokenError::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_reusable_skips_single_use_check() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();
        f.used.mark_used(&issued.token, issued.expires_at).await.unwrap();

        let result = f
            .validator
            .validate_for(&issued.token, &client(), TokenUse::Reusable)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_other_client_is_context_mismatch() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();

        let other_agent = ClientContext::new("192.0.2.10", "curl/8.5.0");
        let err = f.validator.validate(&issued.token, &other_agent).await.unwrap_err();
        assert!(matches!(err, TokenError::ContextMismatch));

        let other_address = ClientContext::new("198.51.100.1", client().identity);
        let err = f
            .validator
            .validate(&issued.token, &other_address)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::ContextMismatch));
    }

    #[tokio::test]
    async fn test_validation_does_not_consume() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();

        f.validator.validate(&issued.token, &client()).await.unwrap();
        f.validator.validate(&issued.token, &client()).await.unwrap();
        assert!(f.used.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_is_reported_before_reuse_and_mismatch() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();
        f.used.mark_used(&issued.token, issued.expires_at).await.unwrap();
        f.clock.advance(Duration::seconds(130));

        let stranger = ClientContext::new("198.51.100.1", "curl/8.5.0");
        let err = f.validator.validate(&issued.token, &stranger).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn test_reuse_is_reported_before_mismatch() {
        let f = fixture();
        let issued = f.issuer.issue(&client()).unwrap();
        f.used.mark_used(&issued.token, issued.expires_at).await.unwrap();

        let stranger = ClientContext::new("198.51.100.1", "curl/8.5.0");
        let err = f.validator.validate(&issued.token, &stranger).await.unwrap_err();
        assert!(matches!(err, TokenError::AlreadyUsed));
    }
}
