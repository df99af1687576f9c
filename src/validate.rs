// Request validators and normalizers

use crate::models::Role;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    email.contains('@')
}

/// Unknown or missing roles register as students.
pub fn normalize_role(v: Option<&str>) -> Role {
    parse_role(v.unwrap_or_default()).unwrap_or(Role::Student)
}

pub fn parse_role(v: &str) -> Option<Role> {
    match v {
        "admin"   => Some(Role::Admin),
        "teacher" => Some(Role::Teacher),
        "student" => Some(Role::Student),
        _ => None,
    }
}

/// `Some(trimmed)` when the field is present and not blank.
pub fn required(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
