//! Persistence seam for users, courses, grades, certificates and the ledger.
//!
//! Every backend enforces the same invariants: unique user emails, one grade
//! and one certificate per (student, course) pair, and atomic named sequences.

use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[cfg(test)]
mod failing;
mod memory;
mod postgres;

#[cfg(test)]
pub use failing::FailingStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CERTIFICATE_CODE_SEQUENCE: &str = "certificate_code";
pub const LEDGER_SEQUENCE: &str = "ledger";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("{0} not found")]
    Missing(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait Store: Clone + Send + Sync + 'static {
    fn ping(&self) -> impl Future<Output = StoreResult<()>> + Send;

    // users
    fn insert_user(&self, user: NewUser) -> impl Future<Output = StoreResult<User>> + Send;
    fn find_user(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<User>>> + Send;
    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = StoreResult<Option<User>>> + Send;
    fn list_users(&self, role: Option<Role>)
        -> impl Future<Output = StoreResult<Vec<User>>> + Send;
    fn count_users(&self) -> impl Future<Output = StoreResult<i64>> + Send;

    // courses
    fn insert_course(&self, course: NewCourse) -> impl Future<Output = StoreResult<Course>> + Send;
    fn find_course(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<Course>>> + Send;
    fn list_courses(&self) -> impl Future<Output = StoreResult<Vec<Course>>> + Send;
    fn count_courses(&self) -> impl Future<Output = StoreResult<i64>> + Send;

    // grades
    /// Inserts the grade for the pair, or overwrites the existing one in place.
    fn upsert_grade(
        &self,
        submission: GradeSubmission,
    ) -> impl Future<Output = StoreResult<Grade>> + Send;
    fn list_grades(&self, filter: GradeFilter)
        -> impl Future<Output = StoreResult<Vec<Grade>>> + Send;

    // certificates
    fn find_certificate(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;
    fn find_certificate_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = StoreResult<Option<Certificate>>> + Send;
    /// Fails with `StoreError::Conflict` when the pair already has a certificate.
    fn insert_certificate(
        &self,
        cert: NewCertificate,
    ) -> impl Future<Output = StoreResult<Certificate>> + Send;
    /// Overwrites grade/score/snapshot/issue date and resets the status to issued.
    fn reissue_certificate(
        &self,
        id: Uuid,
        update: Reissue,
    ) -> impl Future<Output = StoreResult<Certificate>> + Send;
    fn mark_verified(
        &self,
        id: Uuid,
        hash: &str,
        block_number: i64,
    ) -> impl Future<Output = StoreResult<Certificate>> + Send;
    fn list_certificates(
        &self,
        student_id: Option<&str>,
    ) -> impl Future<Output = StoreResult<Vec<Certificate>>> + Send;
    fn count_certificates(
        &self,
        status: Option<CertificateStatus>,
    ) -> impl Future<Output = StoreResult<i64>> + Send;

    // ledger
    /// Atomically increments the named sequence and returns the new value (first call yields 1).
    fn next_sequence(&self, name: &str) -> impl Future<Output = StoreResult<i64>> + Send;
    fn append_ledger_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<LedgerEntry>> + Send;
    fn list_ledger_entries(&self) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send;
    fn ledger_summary(&self) -> impl Future<Output = StoreResult<LedgerSummary>> + Send;
}
