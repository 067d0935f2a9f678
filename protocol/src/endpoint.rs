//! The principal-facing surface of an Authority.
//!
//! [`Participant`](crate::participant::Participant) talks to an Authority
//! only through this trait. The in-process [`Authority`](crate::authority::Authority)
//! implements it directly. The participant tests put a tampering double
//! behind it to check that forged grants are refused.
//!
//! Nothing here exposes the reverse pseudonym map, grading, or final records.

use std::collections::BTreeMap;

use crate::error::ProtocolError;
use crate::messages::{
    Ack, Envelope, GradeQuery, GradeStatus, PseudonymGrant, PseudonymRequest, Registration,
    Submission,
};
use crate::types::{Grade, Pseudonym};

pub trait AuthorityEndpoint {
    fn register_principal(&self, registration: Registration) -> Result<Ack, ProtocolError>;

    fn request_pseudonym(
        &self,
        request: Envelope<PseudonymRequest>,
    ) -> Result<Envelope<PseudonymGrant>, ProtocolError>;

    fn submit_work(&self, submission: Envelope<Submission>) -> Result<Ack, ProtocolError>;

    fn published_grades(&self) -> BTreeMap<Pseudonym, Grade>;

    fn query_grade(&self, query: GradeQuery) -> Result<GradeStatus, ProtocolError>;
}
