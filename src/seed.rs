//! Demo data, inserted once at startup. Each collection is only seeded when empty.

use anyhow::Result;

use crate::auth::hash_password;
use crate::models::{NewCourse, NewUser, Role};
use crate::store::Store;

const DEMO_USERS: [(&str, &str, Role, &str); 3] = [
    ("admin@chainlearn.com", "Admin User", Role::Admin, "admin123"),
    ("teacher@chainlearn.com", "Dr. Sarah Smith", Role::Teacher, "teacher123"),
    ("student@chainlearn.com", "Alice Johnson", Role::Student, "student123"),
];

const DEMO_COURSES: [(&str, &str); 2] = [
    ("Blockchain 101", "Introduction to blockchain."),
    ("Web Development", "Learn HTML, CSS, and React."),
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub courses: usize,
}

pub async fn seed_demo_data<S: Store>(store: &S) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    if store.count_users().await? == 0 {
        for (email, name, role, password) in DEMO_USERS {
            let password_hash = tokio::task::spawn_blocking(move || hash_password(password)).await??;
            store
                .insert_user(NewUser {
                    email: email.into(),
                    name: name.into(),
                    role,
                    password_hash,
                })
                .await?;
            report.users += 1;
        }
        tracing::info!(users = report.users, "seeded demo users");
    } else {
        tracing::info!("users found, skipping user seed");
    }

    if store.count_courses().await? == 0 {
        let teacher = store.list_users(Some(Role::Teacher)).await?.into_iter().next();
        if teacher.is_none() {
            tracing::warn!("no teacher found, seeding courses without instructor");
        }
        for (name, description) in DEMO_COURSES {
            store
                .insert_course(NewCourse {
                    name: name.into(),
                    description: description.into(),
                    instructor_id: teacher.as_ref().map(|t| t.id),
                })
                .await?;
            report.courses += 1;
        }
        tracing::info!(courses = report.courses, "seeded demo courses");
    } else {
        tracing::info!("courses found, skipping course seed");
    }

    Ok(report)
}
