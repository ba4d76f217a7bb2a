// ============================================================================
// Security Configuration
// ============================================================================

/// Default cap on request bodies. A submission is a short base64 blob plus a
/// token, so anything larger is not a real client.
pub const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 10 * 1024;

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Origins allowed by CORS (comma-separated in CORS_ALLOWED_ORIGINS).
    /// Empty means no CORS headers are emitted.
    pub cors_allowed_origins: Vec<String>,
    /// Take the client address from X-Forwarded-For / X-Real-IP.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
    pub max_request_body_bytes: usize,
}

impl SecurityConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            trust_proxy_headers: std::env::var("TRUST_PROXY_HEADERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            max_request_body_bytes: std::env::var("MAX_REQUEST_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_REQUEST_BODY_BYTES),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: Vec::new(),
            trust_proxy_headers: false,
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
        }
    }
}
