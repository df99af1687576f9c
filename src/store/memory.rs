//! In-process store used when no database is configured, and by tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::models::*;

#[derive(Debug, Default)]
struct Inner {
    users: Vec<User>,
    courses: Vec<Course>,
    grades: Vec<Grade>,
    certificates: Vec<Certificate>,
    ledger: Vec<LedgerEntry>,
    sequences: HashMap<String, i64>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Guards never live across an await point.
    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        f(&mut *guard)
    }
}

impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.with(|_| Ok(()))
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.with(|inner| {
            if inner.users.iter().any(|u| u.email == user.email) {
                return Err(StoreError::Conflict("user"));
            }
            let rec = User {
                id: Uuid::new_v4(),
                email: user.email,
                name: user.name,
                role: user.role,
                password_hash: user.password_hash,
                created_at: Utc::now(),
            };
            inner.users.push(rec.clone());
            Ok(rec)
        })
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.with(|inner| Ok(inner.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.with(|inner| Ok(inner.users.iter().find(|u| u.email == email).cloned()))
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        self.with(|inner| {
            Ok(inner
                .users
                .iter()
                .filter(|u| role.map_or(true, |r| u.role == r))
                .cloned()
                .collect())
        })
    }

    async fn count_users(&self) -> StoreResult<i64> {
        self.with(|inner| Ok(inner.users.len() as i64))
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        self.with(|inner| {
            let rec = Course {
                id: Uuid::new_v4(),
                name: course.name,
                description: course.description,
                instructor_id: course.instructor_id,
                created_at: Utc::now(),
            };
            inner.courses.push(rec.clone());
            Ok(rec)
        })
    }

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        self.with(|inner| Ok(inner.courses.iter().find(|c| c.id == id).cloned()))
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        self.with(|inner| Ok(inner.courses.clone()))
    }

    async fn count_courses(&self) -> StoreResult<i64> {
        self.with(|inner| Ok(inner.courses.len() as i64))
    }

    async fn upsert_grade(&self, submission: GradeSubmission) -> StoreResult<Grade> {
        self.with(|inner| {
            let now = Utc::now();
            if let Some(existing) = inner.grades.iter_mut().find(|g| {
                g.student_id == submission.student_id && g.course_id == submission.course_id
            }) {
                existing.grade = submission.grade;
                existing.score = submission.score;
                existing.feedback = submission.feedback;
                existing.certificate_issued = true;
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            let rec = Grade {
                id: Uuid::new_v4(),
                student_id: submission.student_id,
                course_id: submission.course_id,
                grade: submission.grade,
                score: submission.score,
                feedback: submission.feedback,
                certificate_issued: true,
                submission_date: now,
                created_at: now,
                updated_at: now,
            };
            inner.grades.push(rec.clone());
            Ok(rec)
        })
    }

    async fn list_grades(&self, filter: GradeFilter) -> StoreResult<Vec<Grade>> {
        self.with(|inner| {
            Ok(inner
                .grades
                .iter()
                .filter(|g| filter.student_id.as_ref().map_or(true, |s| &g.student_id == s))
                .filter(|g| filter.course_id.as_ref().map_or(true, |c| &g.course_id == c))
                .cloned()
                .collect())
        })
    }

    async fn find_certificate(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Certificate>> {
        self.with(|inner| {
            Ok(inner
                .certificates
                .iter()
                .find(|c| c.student_id == student_id && c.course_id == course_id)
                .cloned())
        })
    }

    async fn find_certificate_by_code(&self, code: &str) -> StoreResult<Option<Certificate>> {
        self.with(|inner| {
            Ok(inner
                .certificates
                .iter()
                .find(|c| c.certificate_id == code)
                .cloned())
        })
    }

    async fn insert_certificate(&self, cert: NewCertificate) -> StoreResult<Certificate> {
        self.with(|inner| {
            let taken = inner.certificates.iter().any(|c| {
                (c.student_id == cert.student_id && c.course_id == cert.course_id)
                    || c.certificate_id == cert.certificate_id
            });
            if taken {
                return Err(StoreError::Conflict("certificate"));
            }
            let rec = Certificate {
                id: Uuid::new_v4(),
                certificate_id: cert.certificate_id,
                student_id: cert.student_id,
                course_id: cert.course_id,
                grade: cert.grade,
                score: cert.score,
                instructor_name: cert.instructor_name,
                issue_date: cert.issue_date,
                blockchain_hash: None,
                blockchain_block_number: None,
                status: CertificateStatus::Issued,
                created_at: Utc::now(),
            };
            inner.certificates.push(rec.clone());
            Ok(rec)
        })
    }

    async fn reissue_certificate(&self, id: Uuid, update: Reissue) -> StoreResult<Certificate> {
        self.with(|inner| {
            let cert = inner
                .certificates
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or(StoreError::Missing("certificate"))?;
            cert.grade = update.grade;
            cert.score = update.score;
            cert.instructor_name = update.instructor_name;
            cert.issue_date = update.issue_date;
            cert.status = CertificateStatus::Issued;
            Ok(cert.clone())
        })
    }

    async fn mark_verified(&self, id: Uuid, hash: &str, block_number: i64) -> StoreResult<Certificate> {
        self.with(|inner| {
            let cert = inner
                .certificates
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or(StoreError::Missing("certificate"))?;
            cert.blockchain_hash = Some(hash.to_string());
            cert.blockchain_block_number = Some(block_number);
            cert.status = CertificateStatus::Verified;
            Ok(cert.clone())
        })
    }

    async fn list_certificates(&self, student_id: Option<&str>) -> StoreResult<Vec<Certificate>> {
        self.with(|inner| {
            Ok(inner
                .certificates
                .iter()
                .filter(|c| student_id.map_or(true, |s| c.student_id == s))
                .cloned()
                .collect())
        })
    }

    async fn count_certificates(&self, status: Option<CertificateStatus>) -> StoreResult<i64> {
        self.with(|inner| {
            Ok(inner
                .certificates
                .iter()
                .filter(|c| status.map_or(true, |s| c.status == s))
                .count() as i64)
        })
    }

    async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
        self.with(|inner| {
            let value = inner.sequences.entry(name.to_string()).or_insert(0);
            *value += 1;
            Ok(*value)
        })
    }

    async fn append_ledger_entry(&self, entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        self.with(|inner| {
            if inner.ledger.iter().any(|e| e.block_number == entry.block_number) {
                return Err(StoreError::Conflict("ledger entry"));
            }
            inner.ledger.push(entry.clone());
            Ok(entry)
        })
    }

    async fn list_ledger_entries(&self) -> StoreResult<Vec<LedgerEntry>> {
        self.with(|inner| {
            let mut entries = inner.ledger.clone();
            entries.sort_by_key(|e| e.block_number);
            Ok(entries)
        })
    }

    async fn ledger_summary(&self) -> StoreResult<LedgerSummary> {
        self.with(|inner| {
            Ok(LedgerSummary {
                total_entries: inner.ledger.len() as i64,
                latest_block_number: inner.ledger.iter().map(|e| e.block_number).max(),
            })
        })
    }
}
