//! # Authority
//!
//! The issuing and grading side of the protocol. The Authority owns its
//! [`Identity`], the [`Registry`], every [`SubmissionRecord`] and the
//! published grade map. Nothing outside this module gets a reference into
//! any of them; callers see snapshots.
//!
//! ## Locking
//!
//! - Registration and pseudonym issuance for one real id run under that
//!   real id's entry in `principal_locks`, so two concurrent first requests
//!   cannot bind two different keys. A failed issuance drops the entry
//!   again once nobody else holds it, so the table never outgrows the
//!   registry plus the requests in flight.
//! - Submission and grading for one pseudonym run under the `DashMap` shard
//!   lock of its entry in `submissions`.
//! - The published map has its own `RwLock`. Publishing takes the write
//!   lock before it reads the submission table, so publishes are totally
//!   ordered and a later one never writes an older grade. Nothing takes a
//!   submission shard lock and then the published lock.
//!
//! ## Logging
//!
//! Events name either a real id or a pseudonym, never both.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AuthorityConfig, MESSAGE_VERSION};
use crate::crypto::{PublicKey, Signature};
use crate::endpoint::AuthorityEndpoint;
use crate::error::ProtocolError;
use crate::identity::Identity;
use crate::messages::{
    Ack, Envelope, GradeQuery, GradeStatus, Operation, ProtocolMessage, PseudonymGrant,
    PseudonymRequest, Registration, Submission,
};
use crate::registry::{Enrollment, Registry};
use crate::types::{now_millis, Grade, Pseudonym, RealId};

/// Work received under a pseudonym, kept with its original signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub pseudonym: Pseudonym,
    pub submission: Submission,
    pub signature: Signature,
    pub grade: Option<Grade>,
    /// Milliseconds since the Unix epoch.
    pub received_at: u64,
}

/// One line of the de-anonymised grade sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub real_id: RealId,
    pub pseudonym: Pseudonym,
    pub grade: Grade,
}

/// Where a principal stands, as far as its current pseudonym goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalState {
    Unregistered,
    Registered,
    PseudonymIssued,
    Submitted,
    Graded,
    Published,
}

impl fmt::Display for PrincipalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrincipalState::Unregistered => "unregistered",
            PrincipalState::Registered => "registered",
            PrincipalState::PseudonymIssued => "pseudonym_issued",
            PrincipalState::Submitted => "submitted",
            PrincipalState::Graded => "graded",
            PrincipalState::Published => "published",
        };
        f.write_str(s)
    }
}

/// The instructor: issues pseudonyms, accepts and grades work, publishes.
pub struct Authority {
    identity: Identity,
    config: AuthorityConfig,
    registry: Registry,
    principal_locks: DashMap<RealId, Arc<Mutex<()>>>,
    submissions: DashMap<Pseudonym, SubmissionRecord>,
    published: RwLock<BTreeMap<Pseudonym, Grade>>,
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("key", &self.identity.public_key().fingerprint())
            .field("config", &self.config)
            .field("registered", &self.registry.registered_count())
            .field("submissions", &self.submissions.len())
            .finish()
    }
}

impl Authority {
    pub fn new(identity: Identity, config: AuthorityConfig) -> Self {
        info!(
            key = %identity.public_key().fingerprint(),
            trust_on_first_use = config.trust_on_first_use,
            allow_resubmission = config.allow_resubmission,
            "authority initialised"
        );
        Self {
            identity,
            config,
            registry: Registry::new(),
            principal_locks: DashMap::new(),
            submissions: DashMap::new(),
            published: RwLock::new(BTreeMap::new()),
        }
    }

    /// Fresh identity, default configuration.
    pub fn generate() -> Self {
        Self::new(Identity::generate(), AuthorityConfig::default())
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    fn principal_lock(&self, real_id: &RealId) -> Arc<Mutex<()>> {
        self.principal_locks
            .entry(real_id.clone())
            .or_default()
            .clone()
    }

    /// Give back a lock from [`principal_lock`](Self::principal_lock) and
    /// remove its entry if no other caller holds or waits on it.
    fn release_principal_lock(&self, real_id: &RealId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.principal_locks
            .remove_if(real_id, |_, entry| Arc::strong_count(entry) == 1);
    }

    // -----------------------------------------------------------------------
    // Step 1: registration
    // -----------------------------------------------------------------------

    /// Store (or replace) the key for a real id. Unsigned bootstrap step.
    pub fn register_principal(&self, registration: &Registration) -> Result<Ack, ProtocolError> {
        registration.validate()?;
        let lock = self.principal_lock(&registration.real_id);
        let _guard = lock.lock();

        self.registry.register(
            registration.real_id.clone(),
            registration.public_key.clone(),
        );
        info!(
            real_id = %registration.real_id,
            key = %registration.public_key.fingerprint(),
            "principal registered"
        );
        Ok(Ack::now(Operation::Register))
    }

    // -----------------------------------------------------------------------
    // Step 2: pseudonym issuance
    // -----------------------------------------------------------------------

    /// Verify a signed request, mint a pseudonym, and return it sealed to the
    /// requester inside a grant signed by the Authority.
    ///
    /// The registry is touched only after sealing and signing have succeeded.
    pub fn request_pseudonym(
        &self,
        envelope: &Envelope<PseudonymRequest>,
    ) -> Result<Envelope<PseudonymGrant>, ProtocolError> {
        let result = self.issue(envelope);
        if let Err(e) = &result {
            warn!(error = %e, "pseudonym request rejected");
        }
        result
    }

    fn issue(
        &self,
        envelope: &Envelope<PseudonymRequest>,
    ) -> Result<Envelope<PseudonymGrant>, ProtocolError> {
        let request = envelope.open()?;
        let claimed_key = envelope.sender();

        let lock = self.principal_lock(&request.real_id);
        let result = {
            let _guard = lock.lock();
            self.issue_locked(request, claimed_key)
        };
        if result.is_err() {
            self.release_principal_lock(&request.real_id, lock);
        }
        result
    }

    /// Issuance proper. The caller holds the real id's lock.
    fn issue_locked(
        &self,
        request: &PseudonymRequest,
        claimed_key: &PublicKey,
    ) -> Result<Envelope<PseudonymGrant>, ProtocolError> {
        let enrollment = self.registry.check_enrollment(
            &request.real_id,
            claimed_key,
            self.config.trust_on_first_use,
        )?;

        let pseudonym = self.mint_unused();
        let sealed = self
            .identity
            .encrypt_for(pseudonym.as_str().as_bytes(), claimed_key)?;
        let grant = PseudonymGrant {
            version: MESSAGE_VERSION,
            sealed_pseudonym: sealed,
            request_nonce: request.nonce,
            issued_at: now_millis(),
        };
        let response = Envelope::sign(grant, &self.identity)?;

        let replaced = self
            .registry
            .commit_issuance(&request.real_id, claimed_key, pseudonym);

        if enrollment == Enrollment::New {
            info!(real_id = %request.real_id, "principal registered on first request");
        }
        info!(
            real_id = %request.real_id,
            reissue = replaced.is_some(),
            "pseudonym issued"
        );
        Ok(response)
    }

    /// A fresh pseudonym that has never been bound. With 128 random bits the
    /// loop body runs once.
    fn mint_unused(&self) -> Pseudonym {
        loop {
            let candidate = Pseudonym::mint();
            if self.registry.resolve_pseudonym(&candidate).is_err() {
                return candidate;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Step 3: submission
    // -----------------------------------------------------------------------

    /// Accept signed work under a pseudonym.
    ///
    /// The real id behind the pseudonym is used for the key check and then
    /// dropped; it never reaches the stored record or the log.
    pub fn submit_work(&self, envelope: &Envelope<Submission>) -> Result<Ack, ProtocolError> {
        let result = self.accept(envelope);
        match &result {
            Ok(_) => info!(
                pseudonym = %envelope.payload_unverified().pseudonym,
                "submission accepted"
            ),
            Err(e) => warn!(error = %e, "submission rejected"),
        }
        result
    }

    fn accept(&self, envelope: &Envelope<Submission>) -> Result<Ack, ProtocolError> {
        let submission = envelope.open()?;
        let (_, registered_key) = self.registry.resolve_with_key(&submission.pseudonym)?;
        if envelope.sender() != &registered_key {
            return Err(ProtocolError::KeyMismatch);
        }

        let record = SubmissionRecord {
            pseudonym: submission.pseudonym.clone(),
            submission: submission.clone(),
            signature: envelope.signature().clone(),
            grade: None,
            received_at: now_millis(),
        };
        match self.submissions.entry(submission.pseudonym.clone()) {
            Entry::Occupied(mut existing) => {
                if !self.config.allow_resubmission {
                    return Err(ProtocolError::DuplicateSubmission);
                }
                debug!(pseudonym = %submission.pseudonym, "replacing earlier submission");
                existing.insert(record);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        Ok(Ack::now(Operation::Submit))
    }

    // -----------------------------------------------------------------------
    // Steps 4-6: grading, publishing, retrieval
    // -----------------------------------------------------------------------

    /// Set the grade on an existing submission. Authority-local.
    pub fn grade_submission(
        &self,
        pseudonym: &Pseudonym,
        grade: Grade,
    ) -> Result<Ack, ProtocolError> {
        let mut record = self
            .submissions
            .get_mut(pseudonym)
            .ok_or(ProtocolError::UnknownPseudonym)?;
        record.grade = Some(grade);
        info!(pseudonym = %pseudonym, grade, "submission graded");
        Ok(Ack::now(Operation::Grade))
    }

    /// Copy every graded record into the published map and return the whole
    /// map. Running it again without new grading changes nothing.
    pub fn publish_grades(&self) -> BTreeMap<Pseudonym, Grade> {
        let mut published = self.published.write();
        let mut changed = 0usize;
        for entry in self.submissions.iter() {
            let Some(grade) = entry.grade else {
                continue;
            };
            if published.insert(entry.key().clone(), grade) != Some(grade) {
                changed += 1;
            }
        }
        info!(changed, total = published.len(), "grades published");
        published.clone()
    }

    pub fn published_grades(&self) -> BTreeMap<Pseudonym, Grade> {
        self.published.read().clone()
    }

    /// Look up one published grade. An absent grade is `NotYetGraded`.
    pub fn query_grade(&self, query: &GradeQuery) -> Result<GradeStatus, ProtocolError> {
        query.validate()?;
        Ok(match self.published.read().get(&query.pseudonym) {
            Some(grade) => GradeStatus::Published(*grade),
            None => GradeStatus::NotYetGraded,
        })
    }

    // -----------------------------------------------------------------------
    // Authority-only views
    // -----------------------------------------------------------------------

    /// De-anonymised grade sheet, sorted by real id. Never hand this to a
    /// principal.
    pub fn final_records(&self) -> Vec<FinalRecord> {
        let published = self.published.read();
        let mut records: Vec<FinalRecord> = published
            .iter()
            .filter_map(|(pseudonym, grade)| match self.registry.resolve_pseudonym(pseudonym) {
                Ok(real_id) => Some(FinalRecord {
                    real_id,
                    pseudonym: pseudonym.clone(),
                    grade: *grade,
                }),
                Err(_) => {
                    warn!("published grade has no registry binding");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| {
            a.real_id
                .cmp(&b.real_id)
                .then_with(|| a.pseudonym.cmp(&b.pseudonym))
        });
        records
    }

    /// Current `(real id, pseudonym)` bindings, sorted by real id.
    pub fn pseudonym_assignments(&self) -> Vec<(RealId, Pseudonym)> {
        self.registry.forward_bindings()
    }

    /// Pseudonyms that have work on file, sorted.
    pub fn submission_pseudonyms(&self) -> Vec<Pseudonym> {
        let mut out: Vec<Pseudonym> = self.submissions.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    pub fn submission_record(&self, pseudonym: &Pseudonym) -> Option<SubmissionRecord> {
        self.submissions.get(pseudonym).map(|r| r.value().clone())
    }

    /// Every record, sorted by pseudonym.
    pub fn submission_records(&self) -> Vec<SubmissionRecord> {
        let mut out: Vec<SubmissionRecord> =
            self.submissions.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.pseudonym.cmp(&b.pseudonym));
        out
    }

    /// Re-check a stored submission's signature against its owner's
    /// registered key.
    pub fn verify_submission_record(&self, pseudonym: &Pseudonym) -> Result<bool, ProtocolError> {
        let record = self
            .submission_record(pseudonym)
            .ok_or(ProtocolError::UnknownPseudonym)?;
        let (_, key) = self.registry.resolve_with_key(pseudonym)?;
        let bytes = record.submission.canonical_bytes()?;
        Ok(Identity::verify(&bytes, &record.signature, &key))
    }

    /// State of `real_id` judged by its current pseudonym.
    pub fn principal_state(&self, real_id: &RealId) -> PrincipalState {
        if !self.registry.is_registered(real_id) {
            return PrincipalState::Unregistered;
        }
        let Some(pseudonym) = self.registry.current_pseudonym(real_id) else {
            return PrincipalState::Registered;
        };
        if self.published.read().contains_key(&pseudonym) {
            return PrincipalState::Published;
        }
        match self.submissions.get(&pseudonym) {
            Some(record) if record.grade.is_some() => PrincipalState::Graded,
            Some(_) => PrincipalState::Submitted,
            None => PrincipalState::PseudonymIssued,
        }
    }

    pub fn registered_count(&self) -> usize {
        self.registry.registered_count()
    }

    pub fn issued_count(&self) -> usize {
        self.registry.issued_count()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    pub fn published_count(&self) -> usize {
        self.published.read().len()
    }
}

impl AuthorityEndpoint for Authority {
    fn register_principal(&self, registration: Registration) -> Result<Ack, ProtocolError> {
        Authority::register_principal(self, &registration)
    }

    fn request_pseudonym(
        &self,
        request: Envelope<PseudonymRequest>,
    ) -> Result<Envelope<PseudonymGrant>, ProtocolError> {
        Authority::request_pseudonym(self, &request)
    }

    fn submit_work(&self, submission: Envelope<Submission>) -> Result<Ack, ProtocolError> {
        Authority::submit_work(self, &submission)
    }

    fn published_grades(&self) -> BTreeMap<Pseudonym, Grade> {
        Authority::published_grades(self)
    }

    fn query_grade(&self, query: GradeQuery) -> Result<GradeStatus, ProtocolError> {
        Authority::query_grade(self, &query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_from(identity: &Identity, real_id: &str) -> Envelope<PseudonymRequest> {
        Envelope::sign(PseudonymRequest::new(RealId::new(real_id)), identity).unwrap()
    }

    fn obtain(authority: &Authority, identity: &Identity, real_id: &str) -> Pseudonym {
        let grant = authority
            .request_pseudonym(&request_from(identity, real_id))
            .unwrap();
        let payload = grant.open_from(&authority.public_key()).unwrap();
        let bytes = identity.decrypt(&payload.sealed_pseudonym).unwrap();
        Pseudonym::parse(std::str::from_utf8(&bytes).unwrap()).unwrap()
    }

    fn submit(
        authority: &Authority,
        identity: &Identity,
        p: &Pseudonym,
        content: &str,
    ) -> Result<Ack, ProtocolError> {
        let env = Envelope::sign(Submission::new(p.clone(), content), identity).unwrap();
        authority.submit_work(&env)
    }

    #[test]
    fn register_then_issue() {
        let authority = Authority::generate();
        let student = Identity::generate();
        let ack = authority
            .register_principal(&Registration::new(RealId::new("S1"), student.public_key()))
            .unwrap();
        assert_eq!(ack.operation, Operation::Register);
        assert_eq!(authority.principal_state(&RealId::new("S1")), PrincipalState::Registered);

        let p = obtain(&authority, &student, "S1");
        assert_eq!(
            authority.pseudonym_assignments(),
            vec![(RealId::new("S1"), p)]
        );
        assert_eq!(
            authority.principal_state(&RealId::new("S1")),
            PrincipalState::PseudonymIssued
        );
    }

    #[test]
    fn grant_echoes_request_nonce() {
        let authority = Authority::generate();
        let student = Identity::generate();
        let request = request_from(&student, "S1");
        let grant = authority.request_pseudonym(&request).unwrap();
        assert_eq!(
            grant.open().unwrap().request_nonce,
            request.payload_unverified().nonce
        );
        assert_eq!(grant.sender(), &authority.public_key());
    }

    #[test]
    fn issuance_with_wrong_key_commits_nothing() {
        let authority = Authority::generate();
        let owner = Identity::generate();
        let p = obtain(&authority, &owner, "S1");

        let impostor = Identity::generate();
        let err = authority
            .request_pseudonym(&request_from(&impostor, "S1"))
            .unwrap_err();
        assert_eq!(err, ProtocolError::KeyMismatch);
        assert_eq!(authority.issued_count(), 1);
        assert_eq!(authority.pseudonym_assignments(), vec![(RealId::new("S1"), p)]);
    }

    #[test]
    fn tofu_disabled_requires_registration() {
        let config = AuthorityConfig {
            trust_on_first_use: false,
            ..AuthorityConfig::default()
        };
        let authority = Authority::new(Identity::generate(), config);
        let student = Identity::generate();

        let err = authority
            .request_pseudonym(&request_from(&student, "S1"))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotFound(_)));
        assert_eq!(authority.registered_count(), 0);

        authority
            .register_principal(&Registration::new(RealId::new("S1"), student.public_key()))
            .unwrap();
        obtain(&authority, &student, "S1");
    }

    #[test]
    fn refused_requests_leave_no_lock_entries() {
        let config = AuthorityConfig {
            trust_on_first_use: false,
            ..AuthorityConfig::default()
        };
        let authority = Authority::new(Identity::generate(), config);
        let stranger = Identity::generate();
        for i in 0..50 {
            let request = request_from(&stranger, &format!("X{i}"));
            assert!(authority.request_pseudonym(&request).is_err());
        }
        assert!(authority.principal_locks.is_empty());

        let owner = Identity::generate();
        authority
            .register_principal(&Registration::new(RealId::new("S1"), owner.public_key()))
            .unwrap();
        for _ in 0..10 {
            let err = authority
                .request_pseudonym(&request_from(&stranger, "S1"))
                .unwrap_err();
            assert_eq!(err, ProtocolError::KeyMismatch);
        }
        assert!(authority.principal_locks.len() <= 1);
        obtain(&authority, &owner, "S1");
    }

    #[test]
    fn submission_key_must_match_owner() {
        let authority = Authority::generate();
        let owner = Identity::generate();
        let p = obtain(&authority, &owner, "S1");

        let other = Identity::generate();
        assert_eq!(
            submit(&authority, &other, &p, "hello").unwrap_err(),
            ProtocolError::KeyMismatch
        );
        assert_eq!(authority.submission_count(), 0);
        assert!(submit(&authority, &owner, &p, "hello").is_ok());
        assert!(authority.verify_submission_record(&p).unwrap());
    }

    #[test]
    fn unknown_pseudonym_rejected() {
        let authority = Authority::generate();
        let student = Identity::generate();
        obtain(&authority, &student, "S1");
        assert_eq!(
            submit(&authority, &student, &Pseudonym::mint(), "x").unwrap_err(),
            ProtocolError::UnknownPseudonym
        );
    }

    #[test]
    fn resubmission_policy() {
        let authority = Authority::generate();
        let student = Identity::generate();
        let p = obtain(&authority, &student, "S1");
        submit(&authority, &student, &p, "draft").unwrap();
        authority.grade_submission(&p, 50).unwrap();
        submit(&authority, &student, &p, "final").unwrap();

        let record = authority.submission_record(&p).unwrap();
        assert_eq!(record.submission.content, "final");
        assert_eq!(record.grade, None);

        let strict = Authority::new(
            Identity::generate(),
            AuthorityConfig {
                allow_resubmission: false,
                ..AuthorityConfig::default()
            },
        );
        let p = obtain(&strict, &student, "S1");
        submit(&strict, &student, &p, "first").unwrap();
        assert_eq!(
            submit(&strict, &student, &p, "second").unwrap_err(),
            ProtocolError::DuplicateSubmission
        );
        assert_eq!(strict.submission_record(&p).unwrap().submission.content, "first");
    }

    #[test]
    fn grading_requires_a_record() {
        let authority = Authority::generate();
        assert_eq!(
            authority.grade_submission(&Pseudonym::mint(), 90).unwrap_err(),
            ProtocolError::UnknownPseudonym
        );
    }

    #[test]
    fn publish_is_idempotent_and_incremental() {
        let authority = Authority::generate();
        let (a, b) = (Identity::generate(), Identity::generate());
        let pa = obtain(&authority, &a, "A");
        let pb = obtain(&authority, &b, "B");
        submit(&authority, &a, &pa, "a").unwrap();
        submit(&authority, &b, &pb, "b").unwrap();

        authority.grade_submission(&pa, 70).unwrap();
        let first = authority.publish_grades();
        assert_eq!(first, BTreeMap::from([(pa.clone(), 70)]));
        assert_eq!(authority.publish_grades(), first);
        assert_eq!(
            authority.query_grade(&GradeQuery::new(pb.clone())).unwrap(),
            GradeStatus::NotYetGraded
        );

        authority.grade_submission(&pb, 80).unwrap();
        let second = authority.publish_grades();
        assert_eq!(second.len(), 2);
        assert_eq!(authority.published_grades(), second);
        assert_eq!(
            authority.query_grade(&GradeQuery::new(pb)).unwrap(),
            GradeStatus::Published(80)
        );
        assert_eq!(
            authority.principal_state(&RealId::new("A")),
            PrincipalState::Published
        );
    }

    #[test]
    fn concurrent_publishes_never_regress() {
        let authority = Arc::new(Authority::generate());
        let student = Identity::generate();
        let p = obtain(&authority, &student, "S1");
        submit(&authority, &student, &p, "essay").unwrap();

        // Grades only ever go up, so every publish that starts after a grade
        // was set must leave at least that grade in the published map.
        let next_grade = Mutex::new(0u32);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let (authority, p, next_grade) = (&authority, &p, &next_grade);
                scope.spawn(move || {
                    for _ in 0..200 {
                        let set = {
                            let mut next = next_grade.lock();
                            *next += 1;
                            authority.grade_submission(p, *next).unwrap();
                            *next
                        };
                        authority.publish_grades();
                        assert!(authority.published_grades()[p] >= set);
                    }
                });
            }
        });
        assert_eq!(authority.published_grades()[&p], 800);
    }

    #[test]
    fn final_records_resolve_and_sort() {
        let authority = Authority::generate();
        let (z, a) = (Identity::generate(), Identity::generate());
        let pz = obtain(&authority, &z, "Z9");
        let pa = obtain(&authority, &a, "A1");
        submit(&authority, &z, &pz, "z").unwrap();
        submit(&authority, &a, &pa, "a").unwrap();
        authority.grade_submission(&pz, 60).unwrap();
        authority.grade_submission(&pa, 95).unwrap();
        authority.publish_grades();

        let records = authority.final_records();
        assert_eq!(
            records,
            vec![
                FinalRecord {
                    real_id: RealId::new("A1"),
                    pseudonym: pa,
                    grade: 95,
                },
                FinalRecord {
                    real_id: RealId::new("Z9"),
                    pseudonym: pz,
                    grade: 60,
                },
            ]
        );
    }

    #[test]
    fn orphaned_pseudonym_keeps_its_work() {
        let authority = Authority::generate();
        let student = Identity::generate();
        let old = obtain(&authority, &student, "S1");
        submit(&authority, &student, &old, "early").unwrap();

        let new = obtain(&authority, &student, "S1");
        assert_ne!(old, new);
        assert_eq!(authority.pseudonym_assignments(), vec![(RealId::new("S1"), new.clone())]);
        assert_eq!(
            authority.principal_state(&RealId::new("S1")),
            PrincipalState::PseudonymIssued
        );

        authority.grade_submission(&old, 40).unwrap();
        authority.publish_grades();
        let records = authority.final_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pseudonym, old);
        assert_eq!(records[0].real_id, RealId::new("S1"));
    }

    #[test]
    fn concurrent_first_requests_bind_one_key() {
        let authority = Arc::new(Authority::generate());
        let contenders: Vec<Identity> = (0..8).map(|_| Identity::generate()).collect();

        let results: Vec<Result<Envelope<PseudonymGrant>, ProtocolError>> =
            std::thread::scope(|scope| {
                let handles: Vec<_> = contenders
                    .iter()
                    .map(|id| {
                        let authority = Arc::clone(&authority);
                        let request = request_from(id, "S1");
                        scope.spawn(move || authority.request_pseudonym(&request))
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

        let winners: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_ok())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| r.as_ref().unwrap_err() == &ProtocolError::KeyMismatch));
        assert_eq!(authority.registered_count(), 1);
        assert_eq!(authority.issued_count(), 1);
        assert!(authority.principal_locks.len() <= 1);
    }

    #[test]
    fn records_never_carry_real_ids() {
        let authority = Authority::generate();
        let student = Identity::generate();
        let p = obtain(&authority, &student, "S-SECRET-7");
        submit(&authority, &student, &p, "essay").unwrap();
        authority.grade_submission(&p, 88).unwrap();
        authority.publish_grades();

        let records = serde_json::to_string(&authority.submission_records()).unwrap();
        let grades = serde_json::to_string(&authority.published_grades()).unwrap();
        assert!(!records.contains("S-SECRET-7"));
        assert!(!grades.contains("S-SECRET-7"));
    }
}
