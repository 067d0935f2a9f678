//! # Key Management
//!
//! Key material for SHROUD principals and the Authority.
//!
//! A [`ShroudKeypair`] bundles two secrets:
//!
//! - an Ed25519 signing key, used for every signature in the protocol;
//! - an X25519 static secret, used to open payloads sealed to us.
//!
//! The matching [`PublicKey`] carries both public halves and travels in a
//! single text form (`shroud-pk1:<128 hex chars>`), so one string is enough
//! to both verify a principal and seal something to them.
//!
//! ## Salted signatures
//!
//! Plain Ed25519 is deterministic. The protocol wants two signatures over
//! the same payload to differ, so every signature draws a 128-bit salt from
//! `OsRng` and signs `DOMAIN || salt || message`. The salt is shipped in
//! front of the Ed25519 signature (80 bytes total).
//!
//! ## Security considerations
//!
//! - Secrets are never printed by `Debug` and never serialized implicitly.
//! - Key bytes are never logged. Log [`PublicKey::fingerprint`] instead.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::CryptoError;
use crate::config::{
    PUBLIC_KEY_LENGTH, PUBLIC_KEY_PREFIX, SIGNATURE_DOMAIN, SIGNATURE_LENGTH,
    SIGNATURE_SALT_LENGTH,
};

/// Length of the exported secret: Ed25519 seed followed by the X25519 secret.
pub const SECRET_LENGTH: usize = 64;

/// A SHROUD keypair: Ed25519 for signing, X25519 for receiving sealed payloads.
///
/// Intentionally does NOT implement `Serialize`. Exporting a private key
/// should be a deliberate act, so use [`to_secret_hex`](Self::to_secret_hex).
///
/// # Examples
///
/// ```
/// use shroud_protocol::crypto::keys::ShroudKeypair;
///
/// let kp = ShroudKeypair::generate();
/// let sig = kp.sign(b"hello");
/// assert!(kp.public_key().verify(b"hello", &sig));
/// ```
pub struct ShroudKeypair {
    signing_key: SigningKey,
    agreement_secret: StaticSecret,
}

/// The public half of a [`ShroudKeypair`], safe to share with the world.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PublicKey {
    verifying: [u8; PUBLIC_KEY_LENGTH],
    agreement: [u8; PUBLIC_KEY_LENGTH],
}

/// A salted Ed25519 signature: `salt (16) || ed25519 (64)`.
///
/// Stored as raw bytes so a malformed signature can still be carried around
/// and simply fail verification. No panics, just `false`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Signature {
    bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ShroudKeypair
// ---------------------------------------------------------------------------

impl ShroudKeypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            agreement_secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Rebuild a keypair from its 64-byte exported secret.
    pub fn from_secret_bytes(bytes: &[u8; SECRET_LENGTH]) -> Self {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        let mut agreement = [0u8; 32];
        agreement.copy_from_slice(&bytes[32..]);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            agreement_secret: StaticSecret::from(agreement),
        }
    }

    /// Rebuild a keypair from a hex-encoded exported secret.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| CryptoError::InvalidSecretKey)?;
        let arr: [u8; SECRET_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_secret_bytes(&arr))
    }

    /// Export the raw secret. Handle with extreme care.
    pub fn secret_bytes(&self) -> [u8; SECRET_LENGTH] {
        let mut out = [0u8; SECRET_LENGTH];
        out[..32].copy_from_slice(&self.signing_key.to_bytes());
        out[32..].copy_from_slice(&self.agreement_secret.to_bytes());
        out
    }

    /// Hex form of [`secret_bytes`](Self::secret_bytes), for key files.
    pub fn to_secret_hex(&self) -> String {
        hex::encode(self.secret_bytes())
    }

    /// The public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying: self.signing_key.verifying_key().to_bytes(),
            agreement: X25519PublicKey::from(&self.agreement_secret).to_bytes(),
        }
    }

    /// Sign a message with a fresh random salt.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let mut salt = [0u8; SIGNATURE_SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        let sig = self.signing_key.sign(&signing_input(&salt, message));

        let mut bytes = Vec::with_capacity(SIGNATURE_SALT_LENGTH + SIGNATURE_LENGTH);
        bytes.extend_from_slice(&salt);
        bytes.extend_from_slice(&sig.to_bytes());
        Signature { bytes }
    }

    pub(crate) fn agreement_secret(&self) -> &StaticSecret {
        &self.agreement_secret
    }
}

impl Clone for ShroudKeypair {
    /// Every copy of a private key is another thing to protect.
    fn clone(&self) -> Self {
        Self::from_secret_bytes(&self.secret_bytes())
    }
}

impl fmt::Debug for ShroudKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShroudKeypair(pub={})", self.public_key().fingerprint())
    }
}

/// `DOMAIN || salt || message`: the bytes Ed25519 actually signs.
fn signing_input(salt: &[u8], message: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(SIGNATURE_DOMAIN.len() + salt.len() + message.len());
    input.extend_from_slice(SIGNATURE_DOMAIN);
    input.extend_from_slice(salt);
    input.extend_from_slice(message);
    input
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    /// Verify a salted signature against this key.
    ///
    /// Returns `false` for a wrong key, a wrong message, a truncated
    /// signature, or a key that isn't a valid Ed25519 point. Never panics.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.verifying) else {
            return false;
        };
        if signature.bytes.len() != SIGNATURE_SALT_LENGTH + SIGNATURE_LENGTH {
            return false;
        }
        let (salt, raw) = signature.bytes.split_at(SIGNATURE_SALT_LENGTH);
        let raw: [u8; SIGNATURE_LENGTH] = match raw.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let dalek_sig = DalekSignature::from_bytes(&raw);
        verifying_key
            .verify_strict(&signing_input(salt, message), &dalek_sig)
            .is_ok()
    }

    /// Raw Ed25519 verifying key bytes.
    pub fn verifying_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.verifying
    }

    /// Raw X25519 public key bytes.
    pub fn agreement_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.agreement
    }

    /// Export in the interchange encoding: `shroud-pk1:<hex verifying><hex agreement>`.
    pub fn to_interchange(&self) -> String {
        let mut raw = [0u8; PUBLIC_KEY_LENGTH * 2];
        raw[..PUBLIC_KEY_LENGTH].copy_from_slice(&self.verifying);
        raw[PUBLIC_KEY_LENGTH..].copy_from_slice(&self.agreement);
        format!("{}{}", PUBLIC_KEY_PREFIX, hex::encode(raw))
    }

    /// Parse the interchange encoding.
    ///
    /// Rejects a missing prefix, bad hex, the wrong length, verifying keys
    /// that are not valid Ed25519 points, and low-order agreement keys.
    pub fn from_interchange(s: &str) -> Result<Self, CryptoError> {
        let body = s
            .trim()
            .strip_prefix(PUBLIC_KEY_PREFIX)
            .ok_or(CryptoError::InvalidPublicKey)?;
        let raw = hex::decode(body).map_err(|_| CryptoError::InvalidPublicKey)?;
        if raw.len() != PUBLIC_KEY_LENGTH * 2 {
            return Err(CryptoError::InvalidPublicKey);
        }

        let mut verifying = [0u8; PUBLIC_KEY_LENGTH];
        verifying.copy_from_slice(&raw[..PUBLIC_KEY_LENGTH]);
        let mut agreement = [0u8; PUBLIC_KEY_LENGTH];
        agreement.copy_from_slice(&raw[PUBLIC_KEY_LENGTH..]);

        VerifyingKey::from_bytes(&verifying).map_err(|_| CryptoError::InvalidPublicKey)?;
        if is_low_order(&agreement) {
            return Err(CryptoError::InvalidPublicKey);
        }

        Ok(Self {
            verifying,
            agreement,
        })
    }

    /// Short BLAKE3 digest of the key, for logs and tables.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.verifying);
        hasher.update(&self.agreement);
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }
}

/// Fixed scalar for [`is_low_order`]. After clamping it is `8 * m` with
/// `0 < m` below both prime subgroup orders, so `k * P` is the identity
/// exactly when `P` has order dividing 8.
const LOW_ORDER_SCALAR: [u8; 32] = [0x5a; 32];

/// True when no secret can agree on a contributory shared secret with `point`.
fn is_low_order(point: &[u8; PUBLIC_KEY_LENGTH]) -> bool {
    !StaticSecret::from(LOW_ORDER_SCALAR)
        .diffie_hellman(&X25519PublicKey::from(*point))
        .was_contributory()
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.verifying.hash(state);
        self.agreement.hash(state);
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_interchange())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_interchange(s)
    }
}

impl From<PublicKey> for String {
    fn from(pk: PublicKey) -> Self {
        pk.to_interchange()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CryptoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_interchange(&s)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    /// Wrap raw signature bytes. Length is checked at verification time.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw `salt || ed25519` bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidSignatureEncoding)?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() > 16 {
            write!(f, "Signature({}..{})", &hex_str[..8], &hex_str[hex_str.len() - 8..])
        } else {
            write!(f, "Signature({})", hex_str)
        }
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_hex()
    }
}

impl TryFrom<String> for Signature {
    type Error = CryptoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = ShroudKeypair::generate();
        let sig = kp.sign(b"essay on cryptography");
        assert!(kp.public_key().verify(b"essay on cryptography", &sig));
    }

    #[test]
    fn signatures_are_randomized() {
        let kp = ShroudKeypair::generate();
        let a = kp.sign(b"same payload");
        let b = kp.sign(b"same payload");
        assert_ne!(a, b);
        assert!(kp.public_key().verify(b"same payload", &a));
        assert!(kp.public_key().verify(b"same payload", &b));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = ShroudKeypair::generate();
        let sig = kp.sign(b"correct");
        assert!(!kp.public_key().verify(b"wrong", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = ShroudKeypair::generate();
        let kp2 = ShroudKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public_key().verify(b"message", &sig));
    }

    #[test]
    fn tampered_salt_fails_verification() {
        let kp = ShroudKeypair::generate();
        let sig = kp.sign(b"message");
        let mut bytes = sig.as_bytes().to_vec();
        bytes[0] ^= 0x01;
        assert!(!kp.public_key().verify(b"message", &Signature::from_bytes(bytes)));
    }

    #[test]
    fn malformed_signature_is_false_not_panic() {
        let kp = ShroudKeypair::generate();
        assert!(!kp.public_key().verify(b"m", &Signature::from_bytes(vec![])));
        assert!(!kp.public_key().verify(b"m", &Signature::from_bytes(vec![7; 79])));
        assert!(!kp.public_key().verify(b"m", &Signature::from_bytes(vec![7; 200])));
    }

    #[test]
    fn interchange_roundtrip() {
        let pk = ShroudKeypair::generate().public_key();
        let text = pk.to_interchange();
        assert!(text.starts_with(PUBLIC_KEY_PREFIX));
        assert_eq!(text.len(), PUBLIC_KEY_PREFIX.len() + 128);
        assert_eq!(PublicKey::from_interchange(&text).unwrap(), pk);
        assert_eq!(text.parse::<PublicKey>().unwrap(), pk);
    }

    #[test]
    fn interchange_rejects_garbage() {
        assert!(PublicKey::from_interchange("nope").is_err());
        assert!(PublicKey::from_interchange("shroud-pk1:zz").is_err());
        assert!(PublicKey::from_interchange("shroud-pk1:abcd").is_err());
    }

    #[test]
    fn interchange_rejects_low_order_agreement_key() {
        let text = ShroudKeypair::generate().public_key().to_interchange();
        let verifying_hex = &text[..PUBLIC_KEY_PREFIX.len() + 64];

        let zero = format!("{verifying_hex}{}", "0".repeat(64));
        assert_eq!(
            PublicKey::from_interchange(&zero),
            Err(CryptoError::InvalidPublicKey)
        );

        // u = 1 has order 4 on Curve25519.
        let order_four = format!("{verifying_hex}01{}", "0".repeat(62));
        assert_eq!(
            PublicKey::from_interchange(&order_four),
            Err(CryptoError::InvalidPublicKey)
        );

        let json = serde_json::to_string(&zero).unwrap();
        assert!(serde_json::from_str::<PublicKey>(&json).is_err());
    }

    #[test]
    fn public_key_serializes_as_interchange_string() {
        let pk = ShroudKeypair::generate().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_interchange()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn secret_hex_roundtrip() {
        let kp = ShroudKeypair::generate();
        let restored = ShroudKeypair::from_secret_hex(&kp.to_secret_hex()).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
    }

    #[test]
    fn secret_hex_rejects_wrong_length() {
        assert!(ShroudKeypair::from_secret_hex("deadbeef").is_err());
        assert!(ShroudKeypair::from_secret_hex("not hex").is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = ShroudKeypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("ShroudKeypair(pub="));
        assert!(!debug_str.contains(&kp.to_secret_hex()));
    }

    #[test]
    fn two_generated_keypairs_differ() {
        let a = ShroudKeypair::generate();
        let b = ShroudKeypair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }
}
