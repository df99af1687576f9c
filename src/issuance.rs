//! Grade-triggered certificate issuance.
//!
//! Per (student, course) pair a certificate moves `absent -> issued -> verified`,
//! and every later grade submission re-opens it (`verified -> issued -> verified`)
//! with a fresh fingerprint and a fresh ledger ordinal. The certificate code is
//! assigned once, on first issuance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, SubsecRound, Utc};
use thiserror::Error;

use crate::fingerprint::FingerprintInput;
use crate::ledger::Ledger;
use crate::models::{parse_id, Certificate, Course, NewCertificate, Reissue};
use crate::store::{Store, StoreError, CERTIFICATE_CODE_SEQUENCE};

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the caller gets back after a successful issue-and-verify.
#[derive(Debug, Clone)]
pub struct Issued {
    pub certificate: Certificate,
    pub hash: String,
    pub block_number: i64,
}

type PairKey = (String, String);
type PairLocks = Mutex<HashMap<PairKey, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Debug, Clone)]
pub struct Issuer<S> {
    store: S,
    ledger: Ledger<S>,
    fallback_instructor: Arc<str>,
    pair_locks: Arc<PairLocks>,
}

/// A checked-out pair lock. Dropping the last holder removes the map entry.
struct PairSlot<'a> {
    locks: &'a PairLocks,
    key: PairKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for PairSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // one reference in the map plus ours: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2
            && locks.get(&self.key).is_some_and(|l| Arc::ptr_eq(l, &self.lock))
        {
            locks.remove(&self.key);
        }
    }
}

/// `CERT-{year}-{seq:04}-{first five chars of the uppercased course name}`
pub fn certificate_code(year: i32, sequence: i64, course_name: &str) -> String {
    let prefix: String = course_name.to_uppercase().chars().take(5).collect();
    format!("CERT-{year}-{sequence:04}-{prefix}")
}

impl<S: Store> Issuer<S> {
    pub fn new(store: S, fallback_instructor: impl Into<Arc<str>>) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            fallback_instructor: fallback_instructor.into(),
            pair_locks: Arc::default(),
        }
    }

    /// Serializes issuance for one (student, course) pair within this process.
    fn pair_slot(&self, student_id: &str, course_id: &str) -> PairSlot<'_> {
        let key = (student_id.to_string(), course_id.to_string());
        let mut locks = self.pair_locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(key.clone()).or_default().clone();
        PairSlot {
            locks: &self.pair_locks,
            key,
            lock,
        }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    /// Display name for the course's instructor; falls back when unassigned or unresolvable.
    pub async fn instructor_name(&self, course: &Course) -> String {
        if let Some(instructor_id) = course.instructor_id {
            match self.store.find_user(instructor_id).await {
                Ok(Some(instructor)) => return instructor.name,
                Ok(None) => {
                    tracing::warn!(course_id=%course.id, %instructor_id, "instructor not found, using fallback name")
                }
                Err(e) => {
                    tracing::warn!(course_id=%course.id, %instructor_id, error=%e, "instructor lookup failed, using fallback name")
                }
            }
        }
        self.fallback_instructor.to_string()
    }

    pub async fn issue_and_verify(
        &self,
        student_id: &str,
        course_id: &str,
        grade: &str,
        score: f64,
    ) -> Result<Issued, IssueError> {
        let slot = self.pair_slot(student_id, course_id);
        let _guard = slot.lock.lock().await;

        let existing = self.store.find_certificate(student_id, course_id).await?;

        let student = match parse_id(student_id) {
            Some(id) => self.store.find_user(id).await?,
            None => None,
        }
        .ok_or(IssueError::NotFound("Student"))?;
        let course = match parse_id(course_id) {
            Some(id) => self.store.find_course(id).await?,
            None => None,
        }
        .ok_or(IssueError::NotFound("Course"))?;

        let instructor_name = self.instructor_name(&course).await;
        // stored timestamps keep microseconds; truncate so the fingerprint can be recomputed later
        let issue_date = Utc::now().trunc_subsecs(6);

        let reissue = Reissue {
            grade: grade.to_string(),
            score,
            instructor_name: instructor_name.clone(),
            issue_date,
        };
        let certificate = match existing {
            Some(cert) => self.store.reissue_certificate(cert.id, reissue).await?,
            None => {
                self.create(student_id, course_id, &course.name, reissue)
                    .await?
            }
        };
        tracing::info!(certificate_id=%certificate.certificate_id, student_id, course_id, "certificate issued");

        let hash = FingerprintInput {
            student_name: &student.name,
            course_name: &course.name,
            grade,
            issue_date,
            instructor_name: &instructor_name,
            certificate_id: &certificate.certificate_id,
        }
        .digest();

        // no ordinal, no verified status
        let entry = self.ledger.record(&certificate.certificate_id, &hash).await?;
        let certificate = self
            .store
            .mark_verified(certificate.id, &hash, entry.block_number)
            .await?;
        tracing::info!(
            certificate_id=%certificate.certificate_id,
            block_number = entry.block_number,
            "certificate verified"
        );

        Ok(Issued {
            certificate,
            hash,
            block_number: entry.block_number,
        })
    }

    async fn create(
        &self,
        student_id: &str,
        course_id: &str,
        course_name: &str,
        fields: Reissue,
    ) -> Result<Certificate, StoreError> {
        let sequence = self.store.next_sequence(CERTIFICATE_CODE_SEQUENCE).await?;
        let code = certificate_code(fields.issue_date.year(), sequence, course_name);
        let inserted = self
            .store
            .insert_certificate(NewCertificate {
                certificate_id: code,
                student_id: student_id.to_string(),
                course_id: course_id.to_string(),
                grade: fields.grade.clone(),
                score: fields.score,
                instructor_name: fields.instructor_name.clone(),
                issue_date: fields.issue_date,
            })
            .await;
        match inserted {
            // another process created the pair's certificate first
            Err(StoreError::Conflict(what)) => {
                let Some(winner) = self.store.find_certificate(student_id, course_id).await? else {
                    return Err(StoreError::Conflict(what));
                };
                self.store.reissue_certificate(winner.id, fields).await
            }
            other => other,
        }
    }

    /// Recomputes a stored certificate's fingerprint from current records.
    pub async fn recompute(&self, cert: &Certificate) -> Result<String, IssueError> {
        let student = match parse_id(&cert.student_id) {
            Some(id) => self.store.find_user(id).await?,
            None => None,
        }
        .ok_or(IssueError::NotFound("Student"))?;
        let course = match parse_id(&cert.course_id) {
            Some(id) => self.store.find_course(id).await?,
            None => None,
        }
        .ok_or(IssueError::NotFound("Course"))?;

        Ok(FingerprintInput {
            student_name: &student.name,
            course_name: &course.name,
            grade: &cert.grade,
            issue_date: cert.issue_date,
            instructor_name: &cert.instructor_name,
            certificate_id: &cert.certificate_id,
        }
        .digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CertificateStatus, NewCourse, NewUser, Role};
    use crate::store::{FailingStore, MemoryStore, LEDGER_SEQUENCE};
    use std::collections::HashSet;
    use uuid::Uuid;

    struct Fixture {
        store: MemoryStore,
        issuer: Issuer<MemoryStore>,
        student: String,
        course: String,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let teacher = store
            .insert_user(NewUser {
                email: "teacher@x.io".into(),
                name: "Prof. Ada".into(),
                role: Role::Teacher,
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        let student = store
            .insert_user(NewUser {
                email: "student@x.io".into(),
                name: "Alice Johnson".into(),
                role: Role::Student,
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        let course = store
            .insert_course(NewCourse {
                name: "Blockchain 101".into(),
                description: String::new(),
                instructor_id: Some(teacher.id),
            })
            .await
            .unwrap();
        Fixture {
            issuer: Issuer::new(store.clone(), "Fallback Name"),
            store,
            student: student.id.to_string(),
            course: course.id.to_string(),
        }
    }

    #[test]
    fn code_format() {
        assert_eq!(certificate_code(2026, 1, "Blockchain 101"), "CERT-2026-0001-BLOCK");
        assert_eq!(certificate_code(2026, 12345, "web"), "CERT-2026-12345-WEB");
        assert_eq!(certificate_code(2026, 7, "straße lab"), "CERT-2026-0007-STRAS");
    }

    #[tokio::test]
    async fn first_issue_is_verified_with_first_code() {
        let f = fixture().await;
        let issued = f.issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.unwrap();

        let year = issued.certificate.issue_date.year();
        assert_eq!(issued.certificate.certificate_id, format!("CERT-{year}-0001-BLOCK"));
        assert_eq!(issued.certificate.status, CertificateStatus::Verified);
        assert_eq!(issued.certificate.blockchain_hash.as_deref(), Some(issued.hash.as_str()));
        assert_eq!(issued.certificate.blockchain_block_number, Some(1));
        assert_eq!(issued.certificate.instructor_name, "Prof. Ada");
    }

    #[tokio::test]
    async fn reissue_keeps_code_and_mints_new_ordinal() {
        let f = fixture().await;
        let first = f.issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.unwrap();
        let second = f.issuer.issue_and_verify(&f.student, &f.course, "B", 80.0).await.unwrap();

        assert_eq!(first.certificate.id, second.certificate.id);
        assert_eq!(first.certificate.certificate_id, second.certificate.certificate_id);
        assert_eq!(second.certificate.grade, "B");
        assert_eq!(second.certificate.score, 80.0);
        assert_ne!(first.hash, second.hash);
        assert!(second.block_number > first.block_number);
        assert_eq!(f.store.count_certificates(None).await.unwrap(), 1);
        assert_eq!(f.issuer.ledger().transactions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn codes_follow_creation_order() {
        let f = fixture().await;
        let other = f
            .store
            .insert_course(NewCourse {
                name: "Web Development".into(),
                description: String::new(),
                instructor_id: None,
            })
            .await
            .unwrap();
        f.issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.unwrap();
        let second = f
            .issuer
            .issue_and_verify(&f.student, &other.id.to_string(), "C", 70.0)
            .await
            .unwrap();
        assert!(second.certificate.certificate_id.ends_with("-0002-WEB D"));
        assert_eq!(second.certificate.instructor_name, "Fallback Name");
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let f = fixture().await;
        let err = f
            .issuer
            .issue_and_verify("not-an-id", &f.course, "A", 95.0)
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::NotFound("Student")));

        let err = f
            .issuer
            .issue_and_verify(&f.student, &Uuid::new_v4().to_string(), "A", 95.0)
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::NotFound("Course")));
        assert_eq!(f.store.count_certificates(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_instructor_uses_fallback() {
        let f = fixture().await;
        let course = f
            .store
            .insert_course(NewCourse {
                name: "Orphaned".into(),
                description: String::new(),
                instructor_id: Some(Uuid::new_v4()),
            })
            .await
            .unwrap();
        assert_eq!(f.issuer.instructor_name(&course).await, "Fallback Name");
    }

    #[tokio::test]
    async fn failed_instructor_lookup_uses_fallback() {
        let store = FailingStore::new(MemoryStore::new());
        let course = store
            .insert_course(NewCourse {
                name: "Blockchain 101".into(),
                description: String::new(),
                instructor_id: Some(Uuid::new_v4()),
            })
            .await
            .unwrap();
        store.fail("find_user");
        let issuer = Issuer::new(store, "Fallback Name");
        assert_eq!(issuer.instructor_name(&course).await, "Fallback Name");
    }

    #[tokio::test]
    async fn pair_locks_are_released() {
        let f = fixture().await;
        for i in 0..100 {
            let err = f
                .issuer
                .issue_and_verify(&format!("bogus-{i}"), "c", "A", 95.0)
                .await
                .unwrap_err();
            assert!(matches!(err, IssueError::NotFound("Student")));
        }
        f.issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.unwrap();
        assert!(f.issuer.pair_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ledger_failure_leaves_certificate_unverified() {
        let f = fixture().await;
        let store = FailingStore::new(f.store.clone());
        let issuer = Issuer::new(store.clone(), "Fallback Name");
        let first = issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.unwrap();

        store.fail(LEDGER_SEQUENCE);
        let err = issuer
            .issue_and_verify(&f.student, &f.course, "B", 80.0)
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::Store(StoreError::Unavailable(_))));

        let cert = f.store.find_certificate(&f.student, &f.course).await.unwrap().unwrap();
        assert_eq!(cert.certificate_id, first.certificate.certificate_id);
        assert_eq!(cert.status, CertificateStatus::Issued);
        assert_eq!(cert.grade, "B");
        assert_eq!(cert.blockchain_block_number, Some(first.block_number));
        assert_eq!(issuer.ledger().transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_failure_on_first_issue_stays_issued() {
        let f = fixture().await;
        let store = FailingStore::new(f.store.clone());
        store.fail(LEDGER_SEQUENCE);
        let issuer = Issuer::new(store, "Fallback Name");
        assert!(issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.is_err());

        let cert = f.store.find_certificate(&f.student, &f.course).await.unwrap().unwrap();
        assert_eq!(cert.status, CertificateStatus::Issued);
        assert!(cert.blockchain_hash.is_none());
        assert!(cert.blockchain_block_number.is_none());
    }

    #[tokio::test]
    async fn stored_fingerprint_can_be_recomputed() {
        let f = fixture().await;
        let issued = f.issuer.issue_and_verify(&f.student, &f.course, "A", 95.0).await.unwrap();
        let recomputed = f.issuer.recompute(&issued.certificate).await.unwrap();
        assert_eq!(recomputed, issued.hash);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_submissions_yield_one_certificate() {
        let f = fixture().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let issuer = f.issuer.clone();
            let (s, c) = (f.student.clone(), f.course.clone());
            handles.push(tokio::spawn(async move {
                issuer.issue_and_verify(&s, &c, "A", 90.0).await.unwrap()
            }));
        }
        let mut codes = HashSet::new();
        let mut ordinals = HashSet::new();
        for h in handles {
            let issued = h.await.unwrap();
            codes.insert(issued.certificate.certificate_id);
            assert!(ordinals.insert(issued.block_number));
        }
        assert_eq!(codes.len(), 1);
        assert_eq!(f.store.count_certificates(None).await.unwrap(), 1);
        assert!(f.issuer.pair_locks.lock().unwrap().is_empty());
    }
}
