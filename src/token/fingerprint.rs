use sha2::{Digest, Sha256};

/// Connection-level attributes of the requesting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    /// Source address as seen by the server
    pub address: String,
    /// Declared client identity, the User-Agent header
    pub identity: String,
}

impl ClientContext {
    pub fn new(address: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            identity: identity.into(),
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.address, &self.identity)
    }
}

/// Derives the value bound into a token.
///
/// Pure function of its inputs. The NUL separator keeps
/// ("1.2.3.4", "5x") and ("1.2.3.45", "x") apart; hashing keeps the raw
/// address and user agent out of the (readable) token payload.
pub fn fingerprint(address: &str, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update([0u8]);
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let ctx = ClientContext::new("192.0.2.1", "Mozilla/5.0");
        assert_eq!(ctx.fingerprint(), ctx.clone().fingerprint());
        assert_eq!(ctx.fingerprint(), fingerprint("192.0.2.1", "Mozilla/5.0"));
    }

    #[test]
    fn test_fingerprint_differs_per_field() {
        let base = fingerprint("192.0.2.1", "Mozilla/5.0");
        assert_ne!(base, fingerprint("192.0.2.2", "Mozilla/5.0"));
        assert_ne!(base, fingerprint("192.0.2.1", "curl/8.0"));
    }

    #[test]
    fn test_fingerprint_field_boundary_is_unambiguous() {
        assert_ne!(fingerprint("1.2.3.4", "5x"), fingerprint("1.2.3.45", "x"));
    }
}
