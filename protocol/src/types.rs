//! Identifier and value types shared by every protocol component.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{MAX_REAL_ID_LENGTH, PSEUDONYM_BYTES, PSEUDONYM_HEX_LENGTH};
use crate::error::ProtocolError;

/// A numeric grade. Scale is the Authority's business.
pub type Grade = u32;

/// A principal's real, externally assigned identifier (e.g. a student number).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealId(String);

impl RealId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, at most [`MAX_REAL_ID_LENGTH`] bytes, no control characters.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.0.is_empty() {
            return Err(ProtocolError::Malformed("empty real id".to_string()));
        }
        if self.0.len() > MAX_REAL_ID_LENGTH {
            return Err(ProtocolError::Malformed(format!(
                "real id longer than {MAX_REAL_ID_LENGTH} bytes"
            )));
        }
        if self.0.chars().any(char::is_control) {
            return Err(ProtocolError::Malformed(
                "real id contains control characters".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RealId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An unguessable token standing in for a real identity.
///
/// 128 bits from the OS CSPRNG, hex-encoded. Collisions are not a thing
/// we plan for.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pseudonym(String);

impl Pseudonym {
    /// Mint a fresh pseudonym.
    pub fn mint() -> Self {
        let mut bytes = [0u8; PSEUDONYM_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parse a pseudonym received from the outside world.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let candidate = Self(s.to_string());
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exactly [`PSEUDONYM_HEX_LENGTH`] lowercase hex characters.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let well_formed = self.0.len() == PSEUDONYM_HEX_LENGTH
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(())
        } else {
            Err(ProtocolError::Malformed("pseudonym format".to_string()))
        }
    }
}

impl fmt::Display for Pseudonym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the Unix epoch, as carried in protocol messages.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
