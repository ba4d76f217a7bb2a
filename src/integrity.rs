// ============================================================================
// Payload Integrity
// ============================================================================
//
// The client hashes `message || token` and sends the hex digest alongside the
// message. A digest over a different message, or computed against another
// token, does not match. This is a plain digest, not a MAC: browsers compute
// it with WebCrypto and hold no secret, so it proves binding to the token,
// not authorship.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Payload as decoded from the `encodedData` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedPayload {
    pub message: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl FromStr for ChecksumAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => anyhow::bail!(
                "Unsupported CHECKSUM_ALGORITHM '{}', expected sha1 or sha256",
                other
            ),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "sha1"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TamperDetected;

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityChecker {
    algorithm: ChecksumAlgorithm,
}

impl IntegrityChecker {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Lowercase hex digest of `message || token`
    pub fn checksum(&self, message: &str, token: &str) -> String {
        match self.algorithm {
            ChecksumAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(message.as_bytes());
                hasher.update(token.as_bytes());
                hex::encode(hasher.finalize())
            }
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(message.as_bytes());
                hasher.update(token.as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }

    /// Compares in constant time. Hex case from the client is not significant.
    pub fn verify(&self, payload: &SubmittedPayload, token: &str) -> Result<(), TamperDetected> {
        let expected = self.checksum(&payload.message, token);
        let presented = payload.checksum.trim().to_ascii_lowercase();

        if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(TamperDetected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(message: &str, checksum: String) -> SubmittedPayload {
        SubmittedPayload {
            message: message.to_string(),
            checksum,
        }
    }

    #[test]
    fn test_known_sha1_vector() {
        // sha1("abc")
        let checker = IntegrityChecker::new(ChecksumAlgorithm::Sha1);
        assert_eq!(
            checker.checksum("a", "bc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_known_sha256_vector() {
        let checker = IntegrityChecker::new(ChecksumAlgorithm::Sha256);
        assert_eq!(
            checker.checksum("ab", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_matching_checksum_verifies() {
        let checker = IntegrityChecker::default();
        let sum = checker.checksum("hello", "token-a");
        assert!(checker.verify(&payload("hello", sum), "token-a").is_ok());
    }

    #[test]
    fn test_uppercase_hex_is_accepted() {
        let checker = IntegrityChecker::default();
        let sum = checker.checksum("hello", "token-a").to_uppercase();
        assert!(checker.verify(&payload("hello", sum), "token-a").is_ok());
    }

    #[test]
    fn test_single_character_change_is_detected() {
        let checker = IntegrityChecker::default();
        let sum = checker.checksum("hello", "token-a");

        assert!(checker.verify(&payload("hellp", sum.clone()), "token-a").is_err());
        assert!(checker.verify(&payload("hello", sum), "token-b").is_err());
    }

    #[test]
    fn test_checksum_for_other_algorithm_is_rejected() {
        let sha1 = IntegrityChecker::new(ChecksumAlgorithm::Sha1);
        let sha256 = IntegrityChecker::new(ChecksumAlgorithm::Sha256);
        let sum = sha256.checksum("hello", "token-a");
        assert!(sha1.verify(&payload("hello", sum), "token-a").is_err());
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha1".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha1);
        assert_eq!("SHA-256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert!("md5".parse::<ChecksumAlgorithm>().is_err());
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Sha1);
    }
}
