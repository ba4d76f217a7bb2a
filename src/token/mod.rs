// ============================================================================
// Submission Tokens
// ============================================================================
//
// Short-lived, single-use, client-bound credentials gating message writes.
//
// Token format: HS256 JWT over TokenClaims
// - timestamp:   issue time in milliseconds, used for the explicit age check
// - fingerprint: hash of (client address, user agent) at issuance
// - jti:         random id, keeps tokens minted in the same instant distinct
//
// Lifecycle:
// 1. TokenIssuer::issue       → GET /api/token
// 2. TokenValidator::validate → read-only: signature, age, single-use, binding
// 3. UsedTokenStore::reserve  → atomic claim just before the write
// 4. commit on success, release on failure
//
// ============================================================================

mod cleanup;
mod fingerprint;
mod issuer;
mod redis_registry;
mod used;
mod validator;

pub use cleanup::UsedTokenPruneTask;
pub use fingerprint::{fingerprint, ClientContext};
pub use issuer::{IssuedToken, TokenIssuer};
pub use redis_registry::RedisUsedTokens;
pub use used::{InMemoryUsedTokens, UsedTokenStore};
pub use validator::{TokenUse, TokenValidator};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub jti: String,
    /// Issue time, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub fingerprint: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Why a presented token was refused. Variants are listed in the order the
/// validator checks them.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature or structure is invalid")]
    Invalid,

    #[error("token expired")]
    Expired,

    #[error("token already used")]
    AlreadyUsed,

    #[error("token was issued to a different client")]
    ContextMismatch,

    #[error("used-token registry unavailable: {0}")]
    Registry(#[source] anyhow::Error),
}
