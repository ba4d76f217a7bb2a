use axum::http::{HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

/// A wrapper for secrets (signing keys, bot tokens) that never shows its
/// contents through Debug or Display.
#[derive(Clone)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(s: String) -> Self {
        Self { inner: s }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Creates a truncated, salted hash of an identifier for safe logging.
///
/// Tokens and client fingerprints go through this before they reach a log
/// line, so a leaked log cannot be used to replay or correlate requests.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hash[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Validates secret key strength by checking length and patterns.
///
/// Rejects secrets that are too short, a single repeated character, a short
/// repeating pattern, or (for 32+ characters) fewer than 8 distinct characters.
pub fn validate_secret_strength(secret: &str, min_length: usize) -> Result<(), String> {
    if secret.len() < min_length {
        return Err(format!(
            "Secret must be at least {} characters long",
            min_length
        ));
    }

    if let Some(first) = secret.chars().next() {
        if secret.chars().all(|c| c == first) {
            return Err("Secret must not consist of a single repeated character".to_string());
        }
    }

    if secret.len() >= 4 && secret.is_ascii() {
        for pattern_len in 2..=(secret.len() / 2).min(8) {
            let pattern = &secret[..pattern_len];
            let repetitions = secret.len() / pattern_len;
            let repeated = pattern.repeat(repetitions);
            if secret.starts_with(&repeated) {
                return Err("Secret must not contain simple repeating patterns".to_string());
            }
        }
    }

    if secret.len() >= 32 {
        let unique_chars: HashSet<char> = secret.chars().collect();
        if unique_chars.len() < 8 {
            return Err("Secret must contain at least 8 different characters".to_string());
        }
    }

    Ok(())
}

/// Adds security and no-store cache headers to a response.
///
/// Responses carry one-time tokens, so nothing is allowed into a shared or
/// browser cache. HSTS is only sent when the request came in over HTTPS.
pub fn add_security_headers(headers: &mut HeaderMap, is_https: bool) {
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; object-src 'none'; frame-ancestors 'none';",
        ),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=(), payment=(), usb=()"),
    );

    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers.insert("Expires", HeaderValue::from_static("0"));
    headers.insert("Surrogate-Control", HeaderValue::from_static("no-store"));

    if is_https {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
}

/// Extracts the client IP address.
///
/// With `trust_proxy_headers` the first X-Forwarded-For entry wins, then
/// X-Real-IP. Otherwise (and as a fallback) the socket address is used.
/// Forwarding headers are trivially spoofable, so they must only be trusted
/// behind a proxy that overwrites them.
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(forwarded_str) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            let first_ip = forwarded_str.split(',').next().unwrap_or("").trim();
            if let Ok(ip) = first_ip.parse::<IpAddr>() {
                return normalize_ip(ip);
            }
        }

        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
        {
            return normalize_ip(ip);
        }
    }

    match direct_ip {
        Some(ip) => normalize_ip(ip),
        None => "unknown".to_string(),
    }
}

/// IPv4-mapped IPv6 addresses are folded to plain IPv4 so a dual-stack
/// listener yields the same fingerprint for the same client.
fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_safe_id_is_stable_and_short() {
        let a = log_safe_id("token-abc", "salt");
        let b = log_safe_id("token-abc", "salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, log_safe_id("token-abc", "other-salt"));
    }

    #[test]
    fn test_secret_too_short() {
        assert!(validate_secret_strength("short", 32).is_err());
    }

    #[test]
    fn test_secret_repeated_character() {
        assert!(validate_secret_strength(&"a".repeat(40), 32).is_err());
    }

    #[test]
    fn test_secret_repeating_pattern() {
        assert!(validate_secret_strength(&"ab".repeat(20), 32).is_err());
    }

    #[test]
    fn test_secret_valid() {
        assert!(validate_secret_strength("k3J9-vQ2x_Lm8ZpR4tYw7NbE1cHs6GdF", 32).is_ok());
    }

    #[test]
    fn test_secure_string_redacts() {
        let secret = SecureString::from("hunter2");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.as_str(), "hunter2");
    }

    #[test]
    fn test_extract_client_ip_ignores_forwarded_headers_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let direct = Some("192.0.2.1".parse().unwrap());

        assert_eq!(extract_client_ip(&headers, direct, false), "192.0.2.1");
    }

    #[test]
    fn test_extract_client_ip_trusts_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let direct = Some("192.0.2.1".parse().unwrap());

        assert_eq!(extract_client_ip(&headers, direct, true), "203.0.113.7");
    }

    #[test]
    fn test_extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));

        assert_eq!(extract_client_ip(&headers, None, true), "198.51.100.4");
    }

    #[test]
    fn test_extract_client_ip_unknown_without_any_source() {
        assert_eq!(extract_client_ip(&HeaderMap::new(), None, false), "unknown");
    }

    #[test]
    fn test_ipv4_mapped_addresses_are_folded() {
        let mapped: IpAddr = "::ffff:192.0.2.9".parse().unwrap();
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(mapped), false), "192.0.2.9");
    }

    #[test]
    fn test_security_headers_include_no_store() {
        let mut headers = HeaderMap::new();
        add_security_headers(&mut headers, false);
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert!(headers
            .get("Cache-Control")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("no-store"));
        assert!(headers.get("Strict-Transport-Security").is_none());

        add_security_headers(&mut headers, true);
        assert!(headers.get("Strict-Transport-Security").is_some());
    }
}
