use axum::{
    extract::{FromRequest, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    auth,
    error::{e400, AppError},
    issuance::{IssueError, Issuer},
    models::*,
    store::{Store, StoreError},
    validate,
};

#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub issuer: Issuer<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, fallback_instructor: &str) -> Self {
        Self {
            issuer: Issuer::new(store.clone(), fallback_instructor),
            store,
        }
    }
}

type ApiResult<T> = Result<T, AppError>;

/// `Json` whose rejections (bad syntax, wrong field types, missing content type) become 400s.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct ApiJson<T>(T);

pub fn router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        // auth
        .route("/api/auth/login", post(login::<S>))
        .route("/api/auth/register", post(register::<S>))
        // directory
        .route("/api/users", get(list_users::<S>))
        .route("/api/courses", get(list_courses::<S>).post(create_course::<S>))
        // grading + issuance
        .route("/api/grades", get(list_grades::<S>).post(submit_grade::<S>))
        .route("/api/certificates", get(list_certificates::<S>))
        .route("/api/certificates/:certificate_id/verify", get(verify_certificate::<S>))
        // ledger projections
        .route("/api/blockchain/stats", get(ledger_stats::<S>))
        .route("/api/blockchain/transactions", get(ledger_transactions::<S>))
        .route("/api/health", get(health::<S>))
        .with_state(state)
}

// --- auth ---

async fn login<S: Store>(
    State(state): State<AppState<S>>,
    ApiJson(req): ApiJson<LoginReq>,
) -> ApiResult<Json<Value>> {
    let (Some(email), Some(password)) = (
        validate::required(req.email.as_deref()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(e400("Email and password are required"));
    };

    let invalid = || AppError::Unauthorized("Invalid email or password".into());
    let user = state.store.find_user_by_email(email).await?.ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !ok {
        return Err(invalid());
    }

    let token = format!("demo_token_{}", user.id);
    Ok(Json(json!({
        "success": true,
        "user": UserSummary::from(user),
        "token": token,
    })))
}

async fn register<S: Store>(
    State(state): State<AppState<S>>,
    ApiJson(req): ApiJson<RegisterReq>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(email), Some(password), Some(name)) = (
        validate::required(req.email.as_deref()),
        req.password.clone().filter(|p| !p.is_empty()),
        validate::required(req.name.as_deref()),
    ) else {
        return Err(e400("Email, password, and name are required"));
    };
    if !validate::is_valid_email(email) {
        return Err(e400("Invalid email format"));
    }
    if password.chars().count() < validate::MIN_PASSWORD_LEN {
        return Err(e400("Password must be at least 6 characters"));
    }
    let role = validate::normalize_role(req.role.as_deref());

    if state.store.find_user_by_email(email).await?.is_some() {
        return Err(AppError::Duplicate("Email already registered".into()));
    }

    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let user = state
        .store
        .insert_user(NewUser {
            email: email.to_string(),
            name: name.to_string(),
            role,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            // lost a race with a concurrent registration
            StoreError::Conflict(_) => AppError::Duplicate("Email already registered".into()),
            other => other.into(),
        })?;
    tracing::info!(user_id=%user.id, role=?user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration successful",
            "user": UserSummary::from(user),
        })),
    ))
}

// --- users / courses ---

async fn list_users<S: Store>(
    State(state): State<AppState<S>>,
    Query(q): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let role = match validate::required(q.role.as_deref()) {
        // an unknown role matches nobody
        Some(r) => match validate::parse_role(r) {
            Some(role) => Some(role),
            None => return Ok(Json(Vec::new())),
        },
        None => None,
    };
    let users = state.store.list_users(role).await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

async fn list_courses<S: Store>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<Vec<CourseSummary>>> {
    let courses = state.store.list_courses().await?;
    let mut out = Vec::with_capacity(courses.len());
    for course in courses {
        let instructor = match course.instructor_id {
            Some(id) => state.store.find_user(id).await?,
            None => None,
        };
        out.push(CourseSummary {
            instructor_name: instructor.map(|u| u.name).unwrap_or_else(|| "Unassigned".into()),
            id: course.id,
            name: course.name,
            description: course.description,
            instructor_id: course.instructor_id,
        });
    }
    Ok(Json(out))
}

async fn create_course<S: Store>(
    State(state): State<AppState<S>>,
    ApiJson(req): ApiJson<CreateCourseReq>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    let name = validate::required(req.name.as_deref()).ok_or_else(|| e400("Course name is required"))?;
    let instructor_id = match validate::required(req.instructor_id.as_deref()) {
        Some(raw) => Some(parse_id(raw).ok_or_else(|| e400("Invalid instructor id"))?),
        None => None,
    };

    let course = state
        .store
        .insert_course(NewCourse {
            name: name.to_string(),
            description: req.description.unwrap_or_default(),
            instructor_id,
        })
        .await?;
    tracing::info!(course_id=%course.id, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

// --- grades ---

async fn submit_grade<S: Store>(
    State(state): State<AppState<S>>,
    ApiJson(req): ApiJson<SubmitGradeReq>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(student_id), Some(course_id), Some(grade), Some(score)) = (
        validate::required(req.student_id.as_deref()),
        validate::required(req.course_id.as_deref()),
        validate::required(req.grade.as_deref()),
        req.score,
    ) else {
        return Err(e400("Student, Course, Grade, and Score are required"));
    };
    if !score.is_finite() {
        return Err(e400("Score must be a number"));
    }
    let student_id = canonical_ref(student_id);
    let course_id = canonical_ref(course_id);

    // the grade is committed first and stays committed whatever happens below
    state
        .store
        .upsert_grade(GradeSubmission {
            student_id: student_id.clone(),
            course_id: course_id.clone(),
            grade: grade.to_string(),
            score,
            feedback: req.feedback.unwrap_or_default(),
        })
        .await?;

    let issued = state
        .issuer
        .issue_and_verify(&student_id, &course_id, grade, score)
        .await
        .map_err(|e| AppError::Partial(format!("Grade saved, but certificate issue failed: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Grade submitted and certificate verified with hash: {}", issued.hash),
        })),
    ))
}

async fn list_grades<S: Store>(
    State(state): State<AppState<S>>,
    Query(q): Query<GradeQuery>,
) -> ApiResult<Json<Vec<GradeSummary>>> {
    let filter = GradeFilter {
        student_id: validate::required(q.student_id.as_deref()).map(canonical_ref),
        course_id: validate::required(q.course_id.as_deref()).map(canonical_ref),
    };
    let grades = state.store.list_grades(filter).await?;

    let mut out = Vec::with_capacity(grades.len());
    for g in grades {
        let student = find_user_ref(&state.store, &g.student_id).await?;
        let course = find_course_ref(&state.store, &g.course_id).await?;
        out.push(GradeSummary {
            id: g.id,
            student_name: student.as_ref().map_or_else(na, |s| s.name.clone()),
            student_email: student.as_ref().map_or_else(na, |s| s.email.clone()),
            course_name: course.as_ref().map_or_else(na, |co| co.name.clone()),
            student_id: g.student_id,
            course_id: g.course_id,
            grade: g.grade,
            score: g.score,
            feedback: g.feedback,
            certificate_issued: g.certificate_issued,
        });
    }
    Ok(Json(out))
}

// --- certificates ---

async fn list_certificates<S: Store>(
    State(state): State<AppState<S>>,
    Query(q): Query<CertificateQuery>,
) -> ApiResult<Json<Vec<CertificateSummary>>> {
    let student_filter = validate::required(q.student_id.as_deref()).map(canonical_ref);
    let certs = state.store.list_certificates(student_filter.as_deref()).await?;

    let mut out = Vec::with_capacity(certs.len());
    for c in certs {
        let student = find_user_ref(&state.store, &c.student_id).await?;
        let course = find_course_ref(&state.store, &c.course_id).await?;
        out.push(CertificateSummary {
            id: c.id,
            certificate_id: c.certificate_id,
            student_name: student.as_ref().map_or_else(na, |s| s.name.clone()),
            student_email: student.as_ref().map_or_else(na, |s| s.email.clone()),
            course_name: course.as_ref().map_or_else(na, |co| co.name.clone()),
            student_id: c.student_id,
            course_id: c.course_id,
            grade: c.grade,
            score: c.score,
            issue_date: c.issue_date,
            blockchain_hash: c.blockchain_hash,
            blockchain_block_number: c.blockchain_block_number,
            status: c.status,
            instructor_name: c.instructor_name,
        });
    }
    Ok(Json(out))
}

async fn verify_certificate<S: Store>(
    State(state): State<AppState<S>>,
    Path(certificate_id): Path<String>,
) -> ApiResult<Json<VerificationReport>> {
    let cert = state
        .store
        .find_certificate_by_code(&certificate_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Certificate not found".into()))?;

    let recomputed_hash = state.issuer.recompute(&cert).await.map_err(|e| match e {
        IssueError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
        IssueError::Store(inner) => inner.into(),
    })?;

    Ok(Json(VerificationReport {
        valid: cert.status == CertificateStatus::Verified
            && cert.blockchain_hash.as_deref() == Some(recomputed_hash.as_str()),
        certificate_id: cert.certificate_id,
        blockchain_hash: cert.blockchain_hash,
        recomputed_hash,
        blockchain_block_number: cert.blockchain_block_number,
        status: cert.status,
    }))
}

// --- ledger ---

async fn ledger_stats<S: Store>(State(state): State<AppState<S>>) -> ApiResult<Json<LedgerStats>> {
    Ok(Json(state.issuer.ledger().stats().await?))
}

async fn ledger_transactions<S: Store>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<Vec<LedgerEntry>>> {
    Ok(Json(state.issuer.ledger().transactions().await?))
}

// --- health ---

async fn health<S: Store>(State(state): State<AppState<S>>) -> Json<Value> {
    let database = match state.store.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => {
            tracing::warn!(error=%e, "health check: store unreachable");
            format!("error: {e}")
        }
    };
    Json(json!({ "status": "healthy", "database": database }))
}

// --- helpers ---

fn na() -> String {
    "N/A".into()
}

async fn find_user_ref<S: Store>(store: &S, raw: &str) -> Result<Option<User>, StoreError> {
    match parse_id(raw) {
        Some(id) => store.find_user(id).await,
        None => Ok(None),
    }
}

async fn find_course_ref<S: Store>(store: &S, raw: &str) -> Result<Option<Course>, StoreError> {
    match parse_id(raw) {
        Some(id) => store.find_course(id).await,
        None => Ok(None),
    }
}
