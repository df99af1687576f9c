use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "certificate_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Issued,
    Verified,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub instructor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Grade {
    pub id: Uuid,
    pub student_id: String,
    pub course_id: String,
    pub grade: String,
    pub score: f64,
    pub feedback: String,
    pub certificate_issued: bool,
    pub submission_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Certificate {
    pub id: Uuid,
    /// Human readable code, e.g. `CERT-2026-0001-BLOCK`.
    pub certificate_id: String,
    pub student_id: String,
    pub course_id: String,
    pub grade: String,
    pub score: f64,
    /// Instructor display name captured at issuance.
    pub instructor_name: String,
    pub issue_date: DateTime<Utc>,
    pub blockchain_hash: Option<String>,
    pub blockchain_block_number: Option<i64>,
    pub status: CertificateStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct LedgerEntry {
    pub block_number: i64,
    pub certificate_id: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
}

// --- store inputs ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub name: String,
    pub description: String,
    pub instructor_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct GradeSubmission {
    pub student_id: String,
    pub course_id: String,
    pub grade: String,
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Default)]
pub struct GradeFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub certificate_id: String,
    pub student_id: String,
    pub course_id: String,
    pub grade: String,
    pub score: f64,
    pub instructor_name: String,
    pub issue_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Reissue {
    pub grade: String,
    pub score: f64,
    pub instructor_name: String,
    pub issue_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total_entries: i64,
    pub latest_block_number: Option<i64>,
}

// --- requests ---

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegisterReq {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoginReq {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CreateCourseReq {
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructor_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SubmitGradeReq {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub grade: Option<String>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserQuery {
    pub role: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GradeQuery {
    pub course_id: Option<String>,
    pub student_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CertificateQuery {
    pub student_id: Option<String>,
}

// --- responses ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub instructor_id: Option<Uuid>,
    pub instructor_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GradeSummary {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub course_id: String,
    pub course_name: String,
    pub grade: String,
    pub score: f64,
    pub feedback: String,
    pub certificate_issued: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CertificateSummary {
    pub id: Uuid,
    pub certificate_id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub course_id: String,
    pub course_name: String,
    pub grade: String,
    pub score: f64,
    pub issue_date: DateTime<Utc>,
    pub blockchain_hash: Option<String>,
    pub blockchain_block_number: Option<i64>,
    pub status: CertificateStatus,
    pub instructor_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerificationReport {
    pub certificate_id: String,
    pub valid: bool,
    pub blockchain_hash: Option<String>,
    pub recomputed_hash: String,
    pub blockchain_block_number: Option<i64>,
    pub status: CertificateStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub network: String,
    pub total_transactions: i64,
    pub latest_block_number: Option<i64>,
    pub total_certificates: i64,
    pub verified_certificates: i64,
}

/// Parses a reference string into a store id; anything malformed is treated as absent.
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

/// Canonical form used when a reference is persisted or filtered on.
pub fn canonical_ref(raw: &str) -> String {
    match parse_id(raw) {
        Some(id) => id.to_string(),
        None => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_are_absent() {
        assert!(parse_id("not-an-id").is_none());
        assert!(parse_id("").is_none());
        assert!(parse_id(" 67e55044-10b1-426f-9247-bb680e5fe0c8 ").is_some());
    }

    #[test]
    fn canonical_ref_normalizes_uuids_only() {
        assert_eq!(
            canonical_ref("67E55044-10B1-426F-9247-BB680E5FE0C8"),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
        assert_eq!(canonical_ref("  abc "), "abc");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&CertificateStatus::Verified).unwrap();
        assert_eq!(json, "\"verified\"");
    }
}
