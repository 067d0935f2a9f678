//! Error types for the SHROUD submission protocol.
//!
//! Every protocol step that can fail returns a [`ProtocolError`]. The first
//! six variants are the protocol's failure taxonomy; the rest are structural
//! problems caught before any cryptography runs, or local agent misuse.
//!
//! None of these carry key material, and none of them distinguish *why* a
//! cryptographic check failed beyond the variant itself.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors that can occur while running the anonymous submission protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The signature does not verify against the declared public key.
    #[error("invalid signature")]
    InvalidSignature,

    /// The declared public key is not the one registered for the principal.
    ///
    /// Deliberately carries no identifier: on the submission path, naming
    /// the real id would link it to the pseudonym.
    #[error("public key does not match the registered key")]
    KeyMismatch,

    /// The pseudonym was never issued, or has no submission on record.
    #[error("unknown pseudonym")]
    UnknownPseudonym,

    /// A sealed payload could not be opened.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The payload exceeds what a single sealed payload may carry.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        len: usize,
        /// Per-key capacity.
        max: usize,
    },

    /// A lookup found nothing (e.g. an unregistered real id).
    #[error("not found: {0}")]
    NotFound(String),

    /// The payload failed structural validation.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The payload declares a schema version this build does not speak.
    #[error("unsupported message version: {0}")]
    UnsupportedVersion(u16),

    /// The envelope carries a different message kind than the operation expects.
    #[error("unexpected message kind: expected {expected}, got {got}")]
    UnexpectedKind {
        /// The kind the operation accepts.
        expected: String,
        /// The kind the envelope declared.
        got: String,
    },

    /// Canonical encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A submission already exists and resubmission is disabled.
    #[error("a submission already exists for this pseudonym")]
    DuplicateSubmission,

    /// The participant tried to submit before obtaining a pseudonym.
    #[error("no pseudonym has been issued to this participant")]
    PseudonymNotIssued,
}

impl From<CryptoError> for ProtocolError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::PayloadTooLarge { len, max } => {
                ProtocolError::PayloadTooLarge { len, max }
            }
            CryptoError::DecryptionFailed => ProtocolError::DecryptionFailed,
            CryptoError::EncryptionFailed => {
                ProtocolError::Malformed("payload could not be sealed to the recipient".to_string())
            }
            CryptoError::InvalidPublicKey => {
                ProtocolError::Malformed("invalid public key".to_string())
            }
            CryptoError::InvalidSignatureEncoding => {
                ProtocolError::Malformed("invalid signature encoding".to_string())
            }
            CryptoError::InvalidSecretKey => {
                ProtocolError::Malformed("invalid secret key encoding".to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}
