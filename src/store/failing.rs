//! Memory store wrapper that fails selected operations on demand.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::{MemoryStore, Store, StoreError, StoreResult};
use crate::models::*;

#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Arc::default(),
        }
    }

    /// Makes `op` fail from now on. Sequences are keyed by their name.
    pub fn fail(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    fn check(&self, op: &str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(StoreError::Unavailable(format!("{op} is down")));
        }
        Ok(())
    }
}

impl Store for FailingStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check("ping")?;
        self.inner.ping().await
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.inner.insert_user(user).await
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.check("find_user")?;
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        self.inner.list_users(role).await
    }

    async fn count_users(&self) -> StoreResult<i64> {
        self.inner.count_users().await
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        self.inner.insert_course(course).await
    }

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        self.inner.find_course(id).await
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        self.inner.list_courses().await
    }

    async fn count_courses(&self) -> StoreResult<i64> {
        self.inner.count_courses().await
    }

    async fn upsert_grade(&self, submission: GradeSubmission) -> StoreResult<Grade> {
        self.inner.upsert_grade(submission).await
    }

    async fn list_grades(&self, filter: GradeFilter) -> StoreResult<Vec<Grade>> {
        self.inner.list_grades(filter).await
    }

    async fn find_certificate(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Certificate>> {
        self.inner.find_certificate(student_id, course_id).await
    }

    async fn find_certificate_by_code(&self, code: &str) -> StoreResult<Option<Certificate>> {
        self.inner.find_certificate_by_code(code).await
    }

    async fn insert_certificate(&self, cert: NewCertificate) -> StoreResult<Certificate> {
        self.inner.insert_certificate(cert).await
    }

    async fn reissue_certificate(&self, id: Uuid, update: Reissue) -> StoreResult<Certificate> {
        self.inner.reissue_certificate(id, update).await
    }

    async fn mark_verified(&self, id: Uuid, hash: &str, block_number: i64) -> StoreResult<Certificate> {
        self.check("mark_verified")?;
        self.inner.mark_verified(id, hash, block_number).await
    }

    async fn list_certificates(&self, student_id: Option<&str>) -> StoreResult<Vec<Certificate>> {
        self.inner.list_certificates(student_id).await
    }

    async fn count_certificates(&self, status: Option<CertificateStatus>) -> StoreResult<i64> {
        self.inner.count_certificates(status).await
    }

    async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
        self.check(name)?;
        self.inner.next_sequence(name).await
    }

    async fn append_ledger_entry(&self, entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        self.inner.append_ledger_entry(entry).await
    }

    async fn list_ledger_entries(&self) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_ledger_entries().await
    }

    async fn ledger_summary(&self) -> StoreResult<LedgerSummary> {
        self.inner.ledger_summary().await
    }
}
