//! # Sealed Payloads
//!
//! Public-key encryption for short payloads, the way SHROUD delivers a
//! freshly minted pseudonym to the only principal allowed to read it.
//!
//! Construction (ephemeral-static X25519, ECIES style):
//!
//! 1. Generate an ephemeral X25519 secret `e`, public `E`.
//! 2. `shared = X25519(e, R)` where `R` is the recipient's agreement key.
//!    Non-contributory results (low-order `R`) are rejected.
//! 3. `key = BLAKE3-derive_key(CONTEXT, shared || E || R)`.
//! 4. AES-256-GCM with a random 96-bit nonce and `E || R` as AAD.
//!
//! ## Wire format
//!
//! ```text
//! E (32) || nonce (12) || ciphertext + tag (len + 16)
//! ```
//!
//! ## Capacity
//!
//! Payloads above [`MAX_SEALED_PAYLOAD`] are refused with
//! `PayloadTooLarge`. Seal tokens, not documents.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use super::keys::{PublicKey, ShroudKeypair};
use super::CryptoError;
use crate::config::{
    AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH, MAX_SEALED_PAYLOAD, PUBLIC_KEY_LENGTH,
    SEAL_KDF_CONTEXT,
};

/// Smallest well-formed sealed payload (empty plaintext).
const MIN_SEALED_LENGTH: usize = PUBLIC_KEY_LENGTH + AES_NONCE_LENGTH + AES_TAG_LENGTH;

/// A payload sealed to one recipient. Serialized as a hex string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Ciphertext {
    bytes: Vec<u8>,
}

impl Ciphertext {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({} bytes)", self.bytes.len())
    }
}

impl From<Ciphertext> for String {
    fn from(ct: Ciphertext) -> Self {
        hex::encode(ct.bytes)
    }
}

impl TryFrom<String> for Ciphertext {
    type Error = CryptoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(Self { bytes })
    }
}

/// Seal `plaintext` so that only the holder of `recipient`'s secret can open it.
///
/// # Example
///
/// ```
/// use shroud_protocol::crypto::{keys::ShroudKeypair, seal, open};
///
/// let bob = ShroudKeypair::generate();
/// let sealed = seal(&bob.public_key(), b"3f9c0d...").unwrap();
/// assert_eq!(open(&bob, &sealed).unwrap(), b"3f9c0d...");
/// ```
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Ciphertext, CryptoError> {
    if plaintext.len() > MAX_SEALED_PAYLOAD {
        return Err(CryptoError::PayloadTooLarge {
            len: plaintext.len(),
            max: MAX_SEALED_PAYLOAD,
        });
    }

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);
    let recipient_public = X25519PublicKey::from(*recipient.agreement_bytes());

    let shared = ephemeral.diffie_hellman(&recipient_public);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }

    let key = derive_seal_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient.agreement_bytes(),
    );
    let aad = binding_aad(ephemeral_public.as_bytes(), recipient.agreement_bytes());
    let (nonce, ciphertext) = encrypt_with_aad(&key, plaintext, &aad)?;

    let mut bytes = Vec::with_capacity(MIN_SEALED_LENGTH + plaintext.len());
    bytes.extend_from_slice(ephemeral_public.as_bytes());
    bytes.extend_from_slice(&nonce);
    bytes.extend_from_slice(&ciphertext);
    Ok(Ciphertext { bytes })
}

/// Open a payload sealed to `keypair`.
///
/// Every failure (truncation, wrong recipient, flipped bit, low-order
/// ephemeral key) is reported as the same `DecryptionFailed`.
pub fn open(keypair: &ShroudKeypair, sealed: &Ciphertext) -> Result<Vec<u8>, CryptoError> {
    let data = sealed.as_bytes();
    if data.len() < MIN_SEALED_LENGTH {
        return Err(CryptoError::DecryptionFailed);
    }

    let (ephemeral_bytes, rest) = data.split_at(PUBLIC_KEY_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(AES_NONCE_LENGTH);

    let ephemeral: [u8; PUBLIC_KEY_LENGTH] = ephemeral_bytes
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce: [u8; AES_NONCE_LENGTH] = nonce_bytes
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let own_public = keypair.public_key();
    let shared = keypair
        .agreement_secret()
        .diffie_hellman(&X25519PublicKey::from(ephemeral));
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }

    let key = derive_seal_key(shared.as_bytes(), &ephemeral, own_public.agreement_bytes());
    let aad = binding_aad(&ephemeral, own_public.agreement_bytes());
    decrypt_with_aad(&key, &nonce, ciphertext, &aad)
}

fn derive_seal_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    blake3::derive_key(SEAL_KDF_CONTEXT, &material)
}

fn binding_aad(ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(ephemeral);
    aad[32..].copy_from_slice(recipient);
    aad
}

/// Encrypt with Additional Authenticated Data under a random nonce.
///
/// Returns `(nonce, ciphertext)`; the ciphertext includes the 16-byte tag.
/// The caller MUST present the same AAD at decryption time.
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; AES_NONCE_LENGTH], Vec<u8>), CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt ciphertext produced by [`encrypt_with_aad`].
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}
