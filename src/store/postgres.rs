use sqlx::{query, query_as, query_scalar, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::db::Db;
use crate::models::*;

const USER_COLUMNS: &str = "id, email, name, role, password_hash, created_at";
const COURSE_COLUMNS: &str = "id, name, description, instructor_id, created_at";
const GRADE_COLUMNS: &str = "id, student_id, course_id, grade, score, feedback, certificate_issued, \
     submission_date, created_at, updated_at";
const CERTIFICATE_COLUMNS: &str = "id, certificate_id, student_id, course_id, grade, score, \
     instructor_name, issue_date, blockchain_hash, blockchain_block_number, status, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn conflict_on_unique(what: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict(what);
            }
        }
        StoreError::Database(e)
    }
}

impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, name, role, password_hash) \
             VALUES ($1,$2,$3,$4,$5) RETURNING {USER_COLUMNS}"
        );
        query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.email)
            .bind(user.name)
            .bind(user.role)
            .bind(user.password_hash)
            .fetch_one(&self.db)
            .await
            .map_err(conflict_on_unique("user"))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id=$1");
        Ok(query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email=$1");
        Ok(query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE ($1::user_role IS NULL OR role=$1) \
             ORDER BY created_at"
        );
        Ok(query_as::<_, User>(&sql)
            .bind(role)
            .fetch_all(&self.db)
            .await?)
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?)
    }

    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let sql = format!(
            "INSERT INTO courses (id, name, description, instructor_id) \
             VALUES ($1,$2,$3,$4) RETURNING {COURSE_COLUMNS}"
        );
        Ok(query_as::<_, Course>(&sql)
            .bind(Uuid::new_v4())
            .bind(course.name)
            .bind(course.description)
            .bind(course.instructor_id)
            .fetch_one(&self.db)
            .await?)
    }

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id=$1");
        Ok(query_as::<_, Course>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY created_at");
        Ok(query_as::<_, Course>(&sql).fetch_all(&self.db).await?)
    }

    async fn count_courses(&self) -> StoreResult<i64> {
        Ok(query_scalar::<_, i64>("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.db)
            .await?)
    }

    async fn upsert_grade(&self, submission: GradeSubmission) -> StoreResult<Grade> {
        let sql = format!(
            r#"
            INSERT INTO grades (id, student_id, course_id, grade, score, feedback, certificate_issued)
            VALUES ($1,$2,$3,$4,$5,$6,TRUE)
            ON CONFLICT (student_id, course_id)
            DO UPDATE SET grade=EXCLUDED.grade, score=EXCLUDED.score, feedback=EXCLUDED.feedback,
                          certificate_issued=TRUE, updated_at=now()
            RETURNING {GRADE_COLUMNS}
            "#
        );
        Ok(query_as::<_, Grade>(&sql)
            .bind(Uuid::new_v4())
            .bind(submission.student_id)
            .bind(submission.course_id)
            .bind(submission.grade)
            .bind(submission.score)
            .bind(submission.feedback)
            .fetch_one(&self.db)
            .await?)
    }

    async fn list_grades(&self, filter: GradeFilter) -> StoreResult<Vec<Grade>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {GRADE_COLUMNS} FROM grades WHERE TRUE"));
        if let Some(student_id) = filter.student_id {
            qb.push(" AND student_id=").push_bind(student_id);
        }
        if let Some(course_id) = filter.course_id {
            qb.push(" AND course_id=").push_bind(course_id);
        }
        qb.push(" ORDER BY created_at");
        Ok(qb.build_query_as::<Grade>().fetch_all(&self.db).await?)
    }

    async fn find_certificate(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Certificate>> {
        let sql = format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE student_id=$1 AND course_id=$2"
        );
        Ok(query_as::<_, Certificate>(&sql)
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_certificate_by_code(&self, code: &str) -> StoreResult<Option<Certificate>> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_id=$1");
        Ok(query_as::<_, Certificate>(&sql)
            .bind(code)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn insert_certificate(&self, cert: NewCertificate) -> StoreResult<Certificate> {
        let sql = format!(
            r#"
            INSERT INTO certificates
                (id, certificate_id, student_id, course_id, grade, score, instructor_name, issue_date, status)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );
        query_as::<_, Certificate>(&sql)
            .bind(Uuid::new_v4())
            .bind(cert.certificate_id)
            .bind(cert.student_id)
            .bind(cert.course_id)
            .bind(cert.grade)
            .bind(cert.score)
            .bind(cert.instructor_name)
            .bind(cert.issue_date)
            .bind(CertificateStatus::Issued)
            .fetch_one(&self.db)
            .await
            .map_err(conflict_on_unique("certificate"))
    }

    async fn reissue_certificate(&self, id: Uuid, update: Reissue) -> StoreResult<Certificate> {
        let sql = format!(
            r#"
            UPDATE certificates
            SET grade=$2, score=$3, instructor_name=$4, issue_date=$5, status=$6
            WHERE id=$1
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );
        query_as::<_, Certificate>(&sql)
            .bind(id)
            .bind(update.grade)
            .bind(update.score)
            .bind(update.instructor_name)
            .bind(update.issue_date)
            .bind(CertificateStatus::Issued)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::Missing("certificate"))
    }

    async fn mark_verified(&self, id: Uuid, hash: &str, block_number: i64) -> StoreResult<Certificate> {
        let sql = format!(
            r#"
            UPDATE certificates
            SET blockchain_hash=$2, blockchain_block_number=$3, status=$4
            WHERE id=$1
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );
        query_as::<_, Certificate>(&sql)
            .bind(id)
            .bind(hash)
            .bind(block_number)
            .bind(CertificateStatus::Verified)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::Missing("certificate"))
    }

    async fn list_certificates(&self, student_id: Option<&str>) -> StoreResult<Vec<Certificate>> {
        let sql = format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates \
             WHERE ($1::text IS NULL OR student_id=$1) ORDER BY created_at"
        );
        Ok(query_as::<_, Certificate>(&sql)
            .bind(student_id)
            .fetch_all(&self.db)
            .await?)
    }

    async fn count_certificates(&self, status: Option<CertificateStatus>) -> StoreResult<i64> {
        Ok(query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM certificates WHERE ($1::certificate_status IS NULL OR status=$1)",
        )
        .bind(status)
        .fetch_one(&self.db)
        .await?)
    }

    async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
        // single statement; concurrent callers serialize on the row lock
        Ok(query_scalar::<_, i64>(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?)
    }

    async fn append_ledger_entry(&self, entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (block_number, certificate_id, hash, timestamp, verified)
            VALUES ($1,$2,$3,$4,$5)
            RETURNING block_number, certificate_id, hash, timestamp, verified
            "#,
        )
        .bind(entry.block_number)
        .bind(entry.certificate_id)
        .bind(entry.hash)
        .bind(entry.timestamp)
        .bind(entry.verified)
        .fetch_one(&self.db)
        .await
        .map_err(conflict_on_unique("ledger entry"))
    }

    async fn list_ledger_entries(&self) -> StoreResult<Vec<LedgerEntry>> {
        Ok(query_as::<_, LedgerEntry>(
            "SELECT block_number, certificate_id, hash, timestamp, verified \
             FROM ledger_entries ORDER BY block_number",
        )
        .fetch_all(&self.db)
        .await?)
    }

    async fn ledger_summary(&self) -> StoreResult<LedgerSummary> {
        let (total_entries, latest_block_number): (i64, Option<i64>) =
            query_as("SELECT COUNT(*), MAX(block_number) FROM ledger_entries")
                .fetch_one(&self.db)
                .await?;
        Ok(LedgerSummary {
            total_entries,
            latest_block_number,
        })
    }
}
