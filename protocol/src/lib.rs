// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SHROUD Protocol — Core Library
//!
//! SHROUD lets a registered principal hand in work under a pseudonym that
//! nobody but the issuing Authority can link back to them, while every
//! submission stays signed, attributable and tamper-evident. The Authority
//! grades pseudonymously, publishes the grades, and only at the very end
//! resolves pseudonyms to real ids for its own records.
//!
//! Ed25519 signs, X25519 + AES-256-GCM seals the pseudonym on its way back
//! to the requester, and canonical JSON is what gets signed.
//!
//! ## Architecture
//!
//! - **crypto** — Key pairs, salted signatures, sealed payloads.
//! - **identity** — A principal's key material and the five operations on it.
//! - **types** — Real ids, pseudonyms, grades.
//! - **messages** — Versioned payloads per protocol step and the signed envelope.
//! - **registry** — real id ↔ key ↔ pseudonym bookkeeping.
//! - **authority** — Issuance, submission, grading, publishing, de-anonymisation.
//! - **participant** — The submitting side.
//! - **endpoint** — The principal-facing surface both sides agree on.
//! - **config** — Protocol constants and Authority policy.
//! - **error** — The failure taxonomy.
//!
//! ## Ground rules
//!
//! 1. Nothing in a payload is trusted before its envelope opens.
//! 2. Every step fails closed: an error leaves no half-written state.
//! 3. The reverse pseudonym map never leaves the Authority.
//! 4. No log line carries both a real id and a pseudonym.

pub mod authority;
pub mod config;
pub mod crypto;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod messages;
pub mod participant;
pub mod registry;
pub mod types;

pub use authority::{Authority, FinalRecord, PrincipalState, SubmissionRecord};
pub use config::AuthorityConfig;
pub use endpoint::AuthorityEndpoint;
pub use error::ProtocolError;
pub use identity::Identity;
pub use participant::Participant;
pub use types::{Grade, Pseudonym, RealId};
