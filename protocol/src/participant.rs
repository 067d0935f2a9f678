//! # Participant
//!
//! The submitting side. A [`Participant`] holds a principal's [`Identity`],
//! pins the Authority's public key at construction, and drives the protocol
//! through any [`AuthorityEndpoint`].
//!
//! Every response is checked before it changes local state: a grant must
//! come from the pinned key, verify, echo our nonce and decrypt to a
//! well-formed pseudonym, or nothing is cached.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::crypto::PublicKey;
use crate::endpoint::AuthorityEndpoint;
use crate::error::ProtocolError;
use crate::identity::Identity;
use crate::messages::{Ack, Envelope, GradeQuery, PseudonymRequest, Registration, Submission};
use crate::types::{Grade, Pseudonym, RealId};

/// A principal taking part in the protocol.
#[derive(Debug, Clone)]
pub struct Participant {
    name: String,
    real_id: RealId,
    identity: Identity,
    authority_key: PublicKey,
    pseudonym: Option<Pseudonym>,
    submissions: Vec<Envelope<Submission>>,
    grades: HashMap<Pseudonym, Grade>,
}

impl Participant {
    /// New participant with a freshly generated identity.
    pub fn new(name: impl Into<String>, real_id: RealId, authority_key: PublicKey) -> Self {
        Self::with_identity(name, real_id, Identity::generate(), authority_key)
    }

    pub fn with_identity(
        name: impl Into<String>,
        real_id: RealId,
        identity: Identity,
        authority_key: PublicKey,
    ) -> Self {
        Self {
            name: name.into(),
            real_id,
            identity,
            authority_key,
            pseudonym: None,
            submissions: Vec::new(),
            grades: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn real_id(&self) -> &RealId {
        &self.real_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn pseudonym(&self) -> Option<&Pseudonym> {
        self.pseudonym.as_ref()
    }

    /// Submissions the Authority has accepted from us, oldest first.
    pub fn submissions(&self) -> &[Envelope<Submission>] {
        &self.submissions
    }

    pub fn cached_grade(&self, pseudonym: &Pseudonym) -> Option<Grade> {
        self.grades.get(pseudonym).copied()
    }

    /// The unsigned registration payload for this participant.
    pub fn registration(&self) -> Registration {
        Registration::new(self.real_id.clone(), self.identity.public_key())
    }

    pub fn register<E: AuthorityEndpoint + ?Sized>(
        &self,
        endpoint: &E,
    ) -> Result<Ack, ProtocolError> {
        endpoint.register_principal(self.registration())
    }

    /// Ask for a fresh pseudonym and cache it once the grant checks out.
    pub fn request_pseudonym<E: AuthorityEndpoint + ?Sized>(
        &mut self,
        endpoint: &E,
    ) -> Result<Pseudonym, ProtocolError> {
        let request = PseudonymRequest::new(self.real_id.clone());
        let nonce = request.nonce;
        let envelope = Envelope::sign(request, &self.identity)?;

        let grant_envelope = endpoint.request_pseudonym(envelope)?;
        let grant = grant_envelope.open_from(&self.authority_key)?;
        if grant.request_nonce != nonce {
            return Err(ProtocolError::Malformed(
                "grant answers a different request".to_string(),
            ));
        }

        let plaintext = self.identity.decrypt(&grant.sealed_pseudonym)?;
        let text = std::str::from_utf8(&plaintext).map_err(|_| ProtocolError::DecryptionFailed)?;
        let pseudonym = Pseudonym::parse(text)?;

        if self.pseudonym.replace(pseudonym.clone()).is_some() {
            debug!(name = %self.name, "replaced cached pseudonym");
        }
        info!(name = %self.name, "pseudonym received");
        Ok(pseudonym)
    }

    /// Sign `content` under the current pseudonym.
    pub fn create_submission(&self, content: &str) -> Result<Envelope<Submission>, ProtocolError> {
        let pseudonym = self
            .pseudonym
            .clone()
            .ok_or(ProtocolError::PseudonymNotIssued)?;
        Envelope::sign(Submission::new(pseudonym, content), &self.identity)
    }

    /// Create, send, and on acceptance record a submission.
    pub fn submit_work<E: AuthorityEndpoint + ?Sized>(
        &mut self,
        endpoint: &E,
        content: &str,
    ) -> Result<Ack, ProtocolError> {
        let envelope = self.create_submission(content)?;
        let ack = endpoint.submit_work(envelope.clone())?;
        self.submissions.push(envelope);
        Ok(ack)
    }

    /// Look up our grade in the published map. `None` means not yet graded.
    pub fn check_grade<E: AuthorityEndpoint + ?Sized>(
        &mut self,
        endpoint: &E,
    ) -> Result<Option<Grade>, ProtocolError> {
        let pseudonym = self
            .pseudonym
            .clone()
            .ok_or(ProtocolError::PseudonymNotIssued)?;
        let status = endpoint.query_grade(GradeQuery::new(pseudonym.clone()))?;
        let grade = status.grade();
        if let Some(g) = grade {
            self.grades.insert(pseudonym, g);
        }
        Ok(grade)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::authority::Authority;
    use crate::messages::{GradeStatus, PseudonymGrant};

    /// Forwards to a real Authority but lets a test rewrite the grant.
    struct Tampering<F> {
        inner: Authority,
        rewrite: F,
    }

    impl<F> AuthorityEndpoint for Tampering<F>
    where
        F: Fn(Envelope<PseudonymGrant>) -> Envelope<PseudonymGrant>,
    {
        fn register_principal(&self, r: Registration) -> Result<Ack, ProtocolError> {
            self.inner.register_principal(&r)
        }

        fn request_pseudonym(
            &self,
            request: Envelope<PseudonymRequest>,
        ) -> Result<Envelope<PseudonymGrant>, ProtocolError> {
            self.inner.request_pseudonym(&request).map(&self.rewrite)
        }

        fn submit_work(&self, s: Envelope<Submission>) -> Result<Ack, ProtocolError> {
            self.inner.submit_work(&s)
        }

        fn published_grades(&self) -> BTreeMap<Pseudonym, Grade> {
            self.inner.published_grades()
        }

        fn query_grade(&self, q: GradeQuery) -> Result<GradeStatus, ProtocolError> {
            self.inner.query_grade(&q)
        }
    }

    #[test]
    fn full_cycle() {
        let authority = Authority::generate();
        let mut alice = Participant::new("Alice", RealId::new("S1"), authority.public_key());
        alice.register(&authority).unwrap();

        let p = alice.request_pseudonym(&authority).unwrap();
        assert_eq!(alice.pseudonym(), Some(&p));
        alice.submit_work(&authority, "hello").unwrap();
        assert_eq!(alice.submissions().len(), 1);

        assert_eq!(alice.check_grade(&authority).unwrap(), None);
        authority.grade_submission(&p, 90).unwrap();
        authority.publish_grades();
        assert_eq!(alice.check_grade(&authority).unwrap(), Some(90));
        assert_eq!(alice.cached_grade(&p), Some(90));
    }

    #[test]
    fn submit_before_pseudonym_fails() {
        let authority = Authority::generate();
        let mut bob = Participant::new("Bob", RealId::new("S2"), authority.public_key());
        assert_eq!(
            bob.submit_work(&authority, "early").unwrap_err(),
            ProtocolError::PseudonymNotIssued
        );
        assert!(bob.submissions().is_empty());
    }

    #[test]
    fn rejected_submission_is_not_recorded() {
        let authority = Authority::new(
            Identity::generate(),
            crate::config::AuthorityConfig {
                allow_resubmission: false,
                ..Default::default()
            },
        );
        let mut carol = Participant::new("Carol", RealId::new("S3"), authority.public_key());
        carol.request_pseudonym(&authority).unwrap();
        carol.submit_work(&authority, "one").unwrap();
        assert_eq!(
            carol.submit_work(&authority, "two").unwrap_err(),
            ProtocolError::DuplicateSubmission
        );
        assert_eq!(carol.submissions().len(), 1);
    }

    #[test]
    fn grant_from_unpinned_key_is_rejected() {
        let authority = Authority::generate();
        let pinned = Identity::generate().public_key();
        let mut dave = Participant::new("Dave", RealId::new("S4"), pinned);
        assert_eq!(
            dave.request_pseudonym(&authority).unwrap_err(),
            ProtocolError::InvalidSignature
        );
        assert!(dave.pseudonym().is_none());
    }

    #[test]
    fn forged_grant_is_rejected_without_caching() {
        let impostor = Identity::generate();
        let endpoint = Tampering {
            inner: Authority::generate(),
            rewrite: |grant: Envelope<PseudonymGrant>| {
                let mut payload = grant.payload_unverified().clone();
                payload.issued_at += 1;
                Envelope::from_parts(
                    grant.kind(),
                    payload,
                    grant.signature().clone(),
                    grant.sender().clone(),
                )
            },
        };
        let mut eve = Participant::new("Eve", RealId::new("S5"), endpoint.inner.public_key());
        assert_eq!(
            eve.request_pseudonym(&endpoint).unwrap_err(),
            ProtocolError::InvalidSignature
        );
        assert!(eve.pseudonym().is_none());

        // A grant re-signed by someone else fails the pin check.
        let resigned = Tampering {
            inner: Authority::generate(),
            rewrite: move |grant: Envelope<PseudonymGrant>| {
                Envelope::sign(grant.payload_unverified().clone(), &impostor).unwrap()
            },
        };
        let mut frank = Participant::new("Frank", RealId::new("S6"), resigned.inner.public_key());
        assert_eq!(
            frank.request_pseudonym(&resigned).unwrap_err(),
            ProtocolError::InvalidSignature
        );
        assert!(frank.pseudonym().is_none());
    }

    #[test]
    fn re_request_replaces_cached_pseudonym() {
        let authority = Authority::generate();
        let mut gina = Participant::new("Gina", RealId::new("S7"), authority.public_key());
        let first = gina.request_pseudonym(&authority).unwrap();
        let second = gina.request_pseudonym(&authority).unwrap();
        assert_ne!(first, second);
        assert_eq!(gina.pseudonym(), Some(&second));
    }
}
