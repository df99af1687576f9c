//! Certificate fingerprints: SHA-256 over the fixed certificate tuple.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// The fields a certificate fingerprint commits to.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub student_name: &'a str,
    pub course_name: &'a str,
    pub grade: &'a str,
    pub issue_date: DateTime<Utc>,
    pub instructor_name: &'a str,
    pub certificate_id: &'a str,
}

impl FingerprintInput<'_> {
    /// Lowercase hex SHA-256, 64 chars.
    pub fn digest(&self) -> String {
        let issue_date = iso_timestamp(&self.issue_date);
        hash_fields(&[
            self.student_name.as_bytes(),
            self.course_name.as_bytes(),
            self.grade.as_bytes(),
            issue_date.as_bytes(),
            self.instructor_name.as_bytes(),
            self.certificate_id.as_bytes(),
        ])
    }
}

/// RFC 3339 in UTC with microsecond precision, e.g. `2026-10-19T08:30:00.123456Z`.
pub fn iso_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Each field is length-prefixed so `("ab", "c")` and `("a", "bc")` hash differently.
fn hash_fields(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update((p.len() as u64).to_le_bytes());
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}
