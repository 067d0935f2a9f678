//! # Identity
//!
//! The key material a principal (or the Authority) carries through the
//! protocol. An [`Identity`] owns one [`ShroudKeypair`] and exposes exactly
//! the five operations the protocol needs: publish the public key, sign,
//! verify, seal to someone else, and open what was sealed to us.
//!
//! The private half never leaves this type. Only the public key, signatures,
//! and ciphertexts cross the boundary.

use crate::crypto::{self, Ciphertext, PublicKey, ShroudKeypair, Signature};
use crate::error::ProtocolError;

/// A principal's signing and decryption keys.
#[derive(Clone, Debug)]
pub struct Identity {
    keypair: ShroudKeypair,
}

impl Identity {
    /// Fresh identity from the OS RNG.
    pub fn generate() -> Self {
        Self {
            keypair: ShroudKeypair::generate(),
        }
    }

    /// Wrap an existing keypair (e.g. loaded from the node's key file).
    pub fn from_keypair(keypair: ShroudKeypair) -> Self {
        Self { keypair }
    }

    /// Restore from [`to_secret_hex`](Self::to_secret_hex) output.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ProtocolError> {
        Ok(Self::from_keypair(ShroudKeypair::from_secret_hex(hex_str)?))
    }

    /// Export the secret for a key file. Nothing else should call this.
    pub fn to_secret_hex(&self) -> String {
        self.keypair.to_secret_hex()
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Randomized signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> Signature {
        self.keypair.sign(payload)
    }

    /// Pure predicate: does `signature` over `payload` verify under `public_key`?
    pub fn verify(payload: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
        public_key.verify(payload, signature)
    }

    /// Seal `payload` to `recipient`. Fails with `PayloadTooLarge` above the
    /// per-key capacity.
    pub fn encrypt_for(
        &self,
        payload: &[u8],
        recipient: &PublicKey,
    ) -> Result<Ciphertext, ProtocolError> {
        Ok(crypto::seal(recipient, payload)?)
    }

    /// Open a payload sealed to this identity. Any failure is `DecryptionFailed`.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>, ProtocolError> {
        crypto::open(&self.keypair, ciphertext).map_err(|_| ProtocolError::DecryptionFailed)
    }
}
