//! # Protocol Configuration & Constants
//!
//! Every magic number in SHROUD lives here, next to the one runtime knob
//! struct the Authority takes ([`AuthorityConfig`]). If you're hardcoding a
//! constant somewhere else, you're doing it wrong.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Full protocol version string, reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Message schema version. Every payload carries it and the Authority
/// rejects anything else before looking at a signature.
pub const MESSAGE_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 for signatures, salted per signature (see `crypto::keys`).
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// X25519 for the recipient side of sealed payloads.
pub const KEY_EXCHANGE_ALGORITHM: &str = "X25519";

/// AES-256-GCM for the symmetric half of sealed payloads.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// Ed25519 verifying key / X25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Raw Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Random salt drawn for every signature. 128 bits is plenty to make two
/// signatures over the same payload collide with negligible probability.
pub const SIGNATURE_SALT_LENGTH: usize = 16;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not sixteen.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Per-key capacity of a sealed payload.
///
/// Matches RSA-2048 with OAEP/SHA-256 (`256 - 2*32 - 2`). The hybrid scheme
/// could carry more, but callers are expected to seal short fixed-length
/// tokens, never arbitrary content, and the cap keeps that honest.
pub const MAX_SEALED_PAYLOAD: usize = 190;

/// Textual prefix of the public key interchange encoding.
pub const PUBLIC_KEY_PREFIX: &str = "shroud-pk1:";

/// BLAKE3 `derive_key` context for sealed payload keys.
pub const SEAL_KDF_CONTEXT: &str = "shroud 2026 sealed-payload v1";

/// Domain separation prefix mixed into every signature.
pub const SIGNATURE_DOMAIN: &[u8] = b"shroud/sig/v1";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Pseudonym entropy in bytes (128 bits).
pub const PSEUDONYM_BYTES: usize = 16;

/// Pseudonym length once hex-encoded.
pub const PSEUDONYM_HEX_LENGTH: usize = PSEUDONYM_BYTES * 2;

/// Upper bound on a real identifier. Student numbers are short; anything
/// longer than this is a malformed request, not a student.
pub const MAX_REAL_ID_LENGTH: usize = 64;

/// Upper bound on submission content carried in a single message.
pub const MAX_SUBMISSION_CONTENT: usize = 1024 * 1024;

/// The `action` literal a pseudonym request must carry.
pub const REQUEST_PSEUDONYM_ACTION: &str = "request_pseudonym";

// ---------------------------------------------------------------------------
// Authority runtime configuration
// ---------------------------------------------------------------------------

/// Runtime policy for an [`Authority`](crate::authority::Authority).
///
/// Defaults reproduce the reference protocol exactly. Hardened deployments
/// should turn `trust_on_first_use` off and register principals out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Register an unseen real id with the key that signed its first
    /// pseudonym request. When `false`, such requests fail with `NotFound`.
    pub trust_on_first_use: bool,

    /// Let a later submission under the same pseudonym replace the earlier
    /// record. When `false`, the second one fails with `DuplicateSubmission`.
    pub allow_resubmission: bool,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            trust_on_first_use: true,
            allow_resubmission: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudonym_space_is_128_bits() {
        assert_eq!(PSEUDONYM_BYTES * 8, 128);
        assert_eq!(PSEUDONYM_HEX_LENGTH, 32);
    }

    #[test]
    fn sealed_capacity_fits_a_pseudonym() {
        assert!(PSEUDONYM_HEX_LENGTH < MAX_SEALED_PAYLOAD);
    }

    #[test]
    fn default_config_matches_reference_protocol() {
        let cfg = AuthorityConfig::default();
        assert!(cfg.trust_on_first_use);
        assert!(cfg.allow_resubmission);
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let cfg: AuthorityConfig =
            serde_json::from_str(r#"{"trust_on_first_use": false}"#).unwrap();
        assert!(!cfg.trust_on_first_use);
        assert!(cfg.allow_resubmission);
    }
}
