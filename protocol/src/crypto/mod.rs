//! # Cryptographic Primitives for SHROUD
//!
//! Everything security-related in the protocol flows through here: every
//! signature over a canonical payload, every sealed pseudonym.
//!
//! Two constructions, both built from audited crates:
//!
//! - **Ed25519** signatures over `domain || salt || message`. The 16-byte
//!   salt is fresh per signature, so signing one payload twice yields two
//!   different signatures, and it travels with the signature.
//! - **Sealing** short payloads to a recipient's public key: ephemeral
//!   X25519, a BLAKE3-derived key, AES-256-GCM.
//!
//! Nothing in here invents a primitive. The composition is the whole of it.

pub mod encryption;
pub mod keys;

use thiserror::Error;

pub use encryption::{open, seal, Ciphertext};
pub use keys::{PublicKey, ShroudKeypair, Signature};

/// Errors from the primitive layer.
///
/// Intentionally vague. The difference between "wrong key" and "corrupted
/// ciphertext" is none of an attacker's business.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignatureEncoding,

    #[error("invalid secret key")]
    InvalidSecretKey,
}
