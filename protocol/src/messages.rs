//! # Protocol Messages
//!
//! One typed payload per protocol step, plus the signed [`Envelope`] that
//! carries them.
//!
//! ```text
//!   ┌─────────────┐                                 ┌─────────────┐
//!   │ Participant │                                 │  Authority  │
//!   └──────┬──────┘                                 └──────┬──────┘
//!          │  Registration (real_id, public_key)           │
//!          ├──────────────────────────────────────────────►│
//!          │  Envelope<PseudonymRequest>                   │
//!          ├──────────────────────────────────────────────►│
//!          │  Envelope<PseudonymGrant> (sealed pseudonym)  │
//!          │◄──────────────────────────────────────────────┤
//!          │  Envelope<Submission> (pseudonym, content)    │
//!          ├──────────────────────────────────────────────►│
//!          │  GradeQuery (pseudonym)                       │
//!          ├──────────────────────────────────────────────►│
//! ```
//!
//! ## Canonical form
//!
//! Signatures cover the *canonical bytes* of a payload: the payload as a
//! JSON object with keys in lexicographic order and the message kind added
//! under `"kind"`. The kind tag keeps a signature over one message type from
//! being replayed as another.
//!
//! ## Validation order
//!
//! [`Envelope::open`] checks the kind tag, then the payload's version and
//! field shape, and only then the signature. Nothing in the payload is
//! trusted until `open` returns.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::config::{MAX_SUBMISSION_CONTENT, MESSAGE_VERSION, REQUEST_PSEUDONYM_ACTION};
use crate::crypto::{Ciphertext, PublicKey, Signature};
use crate::error::ProtocolError;
use crate::identity::Identity;
use crate::types::{now_millis, Grade, Pseudonym, RealId};

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Tag identifying which protocol step a payload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Registration,
    PseudonymRequest,
    PseudonymGrant,
    Submission,
    GradeQuery,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Registration => "registration",
            MessageKind::PseudonymRequest => "pseudonym_request",
            MessageKind::PseudonymGrant => "pseudonym_grant",
            MessageKind::Submission => "submission",
            MessageKind::GradeQuery => "grade_query",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProtocolMessage
// ---------------------------------------------------------------------------

/// Common behaviour of every protocol payload.
pub trait ProtocolMessage: Serialize + DeserializeOwned + Clone {
    /// The step this payload belongs to.
    const KIND: MessageKind;

    /// Schema version carried by the payload.
    fn version(&self) -> u16;

    /// Payload-specific shape checks.
    fn validate_fields(&self) -> Result<(), ProtocolError>;

    /// Version check followed by [`validate_fields`](Self::validate_fields).
    fn validate(&self) -> Result<(), ProtocolError> {
        if self.version() != MESSAGE_VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version()));
        }
        self.validate_fields()
    }

    /// Deterministic bytes signed and verified for this payload.
    fn canonical_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        canonical_bytes(Self::KIND, self)
    }
}

/// Encode `payload` as sorted-key JSON with `"kind"` injected.
///
/// The payload must serialize to a JSON object. Keys are re-collected into a
/// `BTreeMap` so ordering does not depend on serde_json's map feature flags.
pub fn canonical_bytes<T: Serialize>(
    kind: MessageKind,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let Value::Object(fields) = serde_json::to_value(payload)? else {
        return Err(ProtocolError::Malformed(
            "payload must encode as an object".to_string(),
        ));
    };
    if fields.contains_key("kind") {
        return Err(ProtocolError::Malformed(
            "payload may not define a kind field".to_string(),
        ));
    }

    let mut sorted: BTreeMap<String, Value> = fields.into_iter().collect();
    sorted.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
    Ok(serde_json::to_vec(&sorted)?)
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Step 1: a principal announces its real id and public key. Unsigned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub version: u16,
    pub real_id: RealId,
    pub public_key: PublicKey,
}

impl Registration {
    pub fn new(real_id: RealId, public_key: PublicKey) -> Self {
        Self {
            version: MESSAGE_VERSION,
            real_id,
            public_key,
        }
    }
}

impl ProtocolMessage for Registration {
    const KIND: MessageKind = MessageKind::Registration;

    fn version(&self) -> u16 {
        self.version
    }

    fn validate_fields(&self) -> Result<(), ProtocolError> {
        self.real_id.validate()
    }
}

/// Step 2: a signed request for a fresh pseudonym.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudonymRequest {
    pub version: u16,
    pub real_id: RealId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Always `"request_pseudonym"`.
    pub action: String,
    /// Echoed back in the grant so a stale grant can't be passed off as fresh.
    pub nonce: Uuid,
}

impl PseudonymRequest {
    pub fn new(real_id: RealId) -> Self {
        Self {
            version: MESSAGE_VERSION,
            real_id,
            timestamp: now_millis(),
            action: REQUEST_PSEUDONYM_ACTION.to_string(),
            nonce: Uuid::new_v4(),
        }
    }
}

impl ProtocolMessage for PseudonymRequest {
    const KIND: MessageKind = MessageKind::PseudonymRequest;

    fn version(&self) -> u16 {
        self.version
    }

    fn validate_fields(&self) -> Result<(), ProtocolError> {
        self.real_id.validate()?;
        if self.action != REQUEST_PSEUDONYM_ACTION {
            return Err(ProtocolError::Malformed(format!(
                "unexpected action {:?}",
                self.action
            )));
        }
        Ok(())
    }
}

/// Step 2 response: the pseudonym, sealed to the requester, signed by the Authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudonymGrant {
    pub version: u16,
    pub sealed_pseudonym: Ciphertext,
    pub request_nonce: Uuid,
    pub issued_at: u64,
}

impl ProtocolMessage for PseudonymGrant {
    const KIND: MessageKind = MessageKind::PseudonymGrant;

    fn version(&self) -> u16 {
        self.version
    }

    fn validate_fields(&self) -> Result<(), ProtocolError> {
        if self.sealed_pseudonym.is_empty() {
            return Err(ProtocolError::Malformed("empty sealed pseudonym".to_string()));
        }
        Ok(())
    }
}

/// Step 3: work submitted under a pseudonym. Carries no real id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub version: u16,
    pub pseudonym: Pseudonym,
    pub timestamp: u64,
    pub content: String,
}

impl Submission {
    pub fn new(pseudonym: Pseudonym, content: impl Into<String>) -> Self {
        Self {
            version: MESSAGE_VERSION,
            pseudonym,
            timestamp: now_millis(),
            content: content.into(),
        }
    }
}

impl ProtocolMessage for Submission {
    const KIND: MessageKind = MessageKind::Submission;

    fn version(&self) -> u16 {
        self.version
    }

    fn validate_fields(&self) -> Result<(), ProtocolError> {
        self.pseudonym.validate()?;
        if self.content.len() > MAX_SUBMISSION_CONTENT {
            return Err(ProtocolError::Malformed(format!(
                "content exceeds {MAX_SUBMISSION_CONTENT} bytes"
            )));
        }
        Ok(())
    }
}

/// Step 6: look up the published grade for a pseudonym. Unsigned; the
/// published map is public anyway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeQuery {
    pub version: u16,
    pub pseudonym: Pseudonym,
}

impl GradeQuery {
    pub fn new(pseudonym: Pseudonym) -> Self {
        Self {
            version: MESSAGE_VERSION,
            pseudonym,
        }
    }
}

impl ProtocolMessage for GradeQuery {
    const KIND: MessageKind = MessageKind::GradeQuery;

    fn version(&self) -> u16 {
        self.version
    }

    fn validate_fields(&self) -> Result<(), ProtocolError> {
        self.pseudonym.validate()
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A payload bound to its sender by a signature over its canonical bytes.
///
/// Fields are private: an envelope is immutable once signed. Transports that
/// need to rebuild one from parts use [`Envelope::from_parts`], and the
/// result is as untrusted as anything else until [`Envelope::open`] passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    kind: MessageKind,
    payload: T,
    signature: Signature,
    sender: PublicKey,
}

impl<T: ProtocolMessage> Envelope<T> {
    /// Sign `payload` with `identity` and wrap it.
    pub fn sign(payload: T, identity: &Identity) -> Result<Self, ProtocolError> {
        payload.validate()?;
        let signature = identity.sign(&payload.canonical_bytes()?);
        Ok(Self {
            kind: T::KIND,
            payload,
            signature,
            sender: identity.public_key(),
        })
    }

    /// Reassemble an envelope received in pieces.
    pub fn from_parts(
        kind: MessageKind,
        payload: T,
        signature: Signature,
        sender: PublicKey,
    ) -> Self {
        Self {
            kind,
            payload,
            signature,
            sender,
        }
    }

    /// Validate structure, then verify the signature against the declared
    /// sender. Returns the payload only if both pass.
    pub fn open(&self) -> Result<&T, ProtocolError> {
        if self.kind != T::KIND {
            return Err(ProtocolError::UnexpectedKind {
                expected: T::KIND.to_string(),
                got: self.kind.to_string(),
            });
        }
        self.payload.validate()?;
        let bytes = self.payload.canonical_bytes()?;
        if !Identity::verify(&bytes, &self.signature, &self.sender) {
            return Err(ProtocolError::InvalidSignature);
        }
        Ok(&self.payload)
    }

    /// [`open`](Self::open), additionally requiring a specific sender.
    pub fn open_from(&self, expected_sender: &PublicKey) -> Result<&T, ProtocolError> {
        if &self.sender != expected_sender {
            return Err(ProtocolError::InvalidSignature);
        }
        self.open()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The declared sender key. Declared, not proven, until `open` passes.
    pub fn sender(&self) -> &PublicKey {
        &self.sender
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The payload without any checks. For logging and tests only.
    pub fn payload_unverified(&self) -> &T {
        &self.payload
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Operations that answer with an [`Ack`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Register,
    Submit,
    Grade,
}

/// Acknowledgement of an accepted operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub operation: Operation,
    pub at: u64,
}

impl Ack {
    pub fn now(operation: Operation) -> Self {
        Self {
            operation,
            at: now_millis(),
        }
    }
}

/// Outcome of a grade lookup. "Not yet graded" is a normal answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "grade", rename_all = "snake_case")]
pub enum GradeStatus {
    Published(Grade),
    NotYetGraded,
}

impl GradeStatus {
    pub fn grade(&self) -> Option<Grade> {
        match self {
            GradeStatus::Published(g) => Some(*g),
            GradeStatus::NotYetGraded => None,
        }
    }
}
