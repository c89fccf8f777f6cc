//! HTTP surface of the school backend. Handlers stay thin: resolve the
//! session, evaluate the route's role requirement, delegate to `storage`,
//! return JSON. Role requirements are resolved once at startup (see
//! [`Policies`]), so handlers never deal with role-name lookup failures.

use crate::authz::{token, AuthzError, ClaimSet, PolicyEvaluator, RoleRequirement};
use crate::errors::CampanileError;
use crate::files::FileStore;
use crate::session::SessionCookie;
use crate::settings::Settings;
use crate::storage;
use axum::body::{Body, Bytes};
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Requirement for each protected surface, resolved against the configured
/// hierarchy once at startup. A hierarchy that lacks one of these roles is
/// a configuration error and aborts before the server binds.
#[derive(Debug, Clone, Copy)]
pub struct Policies {
    /// Any signed-in account, whatever its role.
    pub signed_in: RoleRequirement,
    /// Student or any more-privileged role.
    pub student: RoleRequirement,
    /// Teacher or any more-privileged role.
    pub teacher: RoleRequirement,
    /// Exactly the direction role (top of the default hierarchy).
    pub direction: RoleRequirement,
}

impl Policies {
    pub fn new(evaluator: &PolicyEvaluator) -> Result<Self, AuthzError> {
        let hierarchy = evaluator.hierarchy();
        let lowest = hierarchy.name_of(hierarchy.lowest()).to_string();
        Ok(Self {
            signed_in: evaluator.at_least(&lowest)?,
            student: evaluator.at_least("student")?,
            teacher: evaluator.at_least("teacher")?,
            direction: evaluator.exactly("direction")?,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub evaluator: Arc<PolicyEvaluator>,
    pub policies: Policies,
    pub files: FileStore,
}

/// The session's user together with the claims derived from their role.
pub struct AuthedUser {
    pub user: storage::User,
    pub claims: ClaimSet,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // X-Frame-Options: Prevent clickjacking
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );

    // X-Content-Type-Options: Prevent MIME sniffing
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    // Content-Security-Policy: this is a JSON API, nothing should load
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    // Referrer-Policy: Control referrer information
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Resolve the request's session cookie to a user. 401 when there is no
/// valid session or the account has been disabled.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, CampanileError> {
    let cookie = SessionCookie::from_headers(headers).ok_or(CampanileError::Unauthorized)?;
    let session = storage::get_session(&state.db, &cookie.session_id)
        .await?
        .ok_or(CampanileError::Unauthorized)?;
    let user = storage::get_user_by_subject(&state.db, &session.subject)
        .await?
        .ok_or(CampanileError::Unauthorized)?;
    if user.enabled != 1 {
        return Err(CampanileError::Unauthorized);
    }

    let claims = ClaimSet::from_role(user.role.clone());
    Ok(AuthedUser { user, claims })
}

/// Authenticate, then evaluate the given requirement against the user's
/// claims. 403 when the evaluation denies.
async fn require(
    state: &AppState,
    headers: &HeaderMap,
    requirement: RoleRequirement,
) -> Result<AuthedUser, CampanileError> {
    let auth = authenticate(state, headers).await?;
    if !state.evaluator.evaluate(&auth.claims, requirement) {
        tracing::debug!(
            user = %auth.user.username,
            policy = %token::encode(state.evaluator.hierarchy(), requirement),
            "access denied"
        );
        return Err(CampanileError::Forbidden);
    }
    Ok(auth)
}

pub fn router(state: AppState) -> Router {
    let authz_router = crate::authz::web::router(state.evaluator.clone());

    let mut router = Router::new()
        .route("/healthz", get(health))
        .route("/login", post(login_submit))
        .route("/logout", get(logout))
        .route("/whoami", get(whoami))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{subject}", patch(update_user))
        .route("/modules", get(list_modules).post(create_module))
        .route(
            "/modules/{id}",
            get(get_module).patch(update_module).delete(delete_module),
        )
        .route(
            "/modules/{id}/schedule",
            get(get_schedule).post(add_schedule_entry),
        )
        .route(
            "/modules/{id}/schedule/{entry_id}",
            delete(delete_schedule_entry),
        )
        .route(
            "/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route("/appointments/{id}/status", post(set_appointment_status))
        .route("/articles", get(list_articles).post(create_article))
        .route(
            "/articles/{id}",
            get(get_article).patch(update_article).delete(delete_article),
        )
        .route("/articles/{id}/publish", post(publish_article))
        .route("/messages", post(send_message))
        .route("/messages/inbox", get(inbox))
        .route("/messages/sent", get(sent))
        .route("/messages/unread_count", get(unread_count))
        .route("/messages/{id}/read", post(mark_message_read))
        .route("/files", get(list_files).post(upload_file))
        .route("/files/{id}", get(download_file).delete(delete_file))
        .route("/jobs/{name}/run", post(run_job));

    // Conditionally add public enrollment route
    if state.settings.server.allow_self_enrollment {
        tracing::info!("Public student self-enrollment is ENABLED");
        router = router.route("/enroll", post(enroll));
    } else {
        tracing::info!("Public student self-enrollment is DISABLED - direction creates accounts");
    }

    router
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .nest("/authz", authz_router)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let app = router(state);

    tracing::info!(%addr, "School API listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ---------- Accounts & sessions ----------

/// What the API discloses about a user; never the password hash.
#[derive(Debug, Serialize)]
struct UserInfo {
    subject: String,
    username: String,
    role: String,
    display_name: Option<String>,
    email: Option<String>,
    enabled: bool,
}

impl From<storage::User> for UserInfo {
    fn from(u: storage::User) -> Self {
        Self {
            subject: u.subject,
            username: u.username,
            role: u.role,
            display_name: u.display_name,
            email: u.email,
            enabled: u.enabled == 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, CampanileError> {
    let subject = storage::verify_user_password(&state.db, &form.username, &form.password)
        .await?
        .ok_or(CampanileError::Unauthorized)?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let session = storage::create_session(
        &state.db,
        &subject,
        state.settings.server.session_ttl_secs,
        user_agent,
        None,
    )
    .await?;

    tracing::info!(username = %form.username, "login");
    let cookie = SessionCookie::new(session.session_id).to_cookie_header(&state.settings);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "subject": subject })),
    )
        .into_response())
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, CampanileError> {
    if let Some(cookie) = SessionCookie::from_headers(&headers) {
        storage::delete_session(&state.db, &cookie.session_id).await?;
    }
    Ok((
        [(header::SET_COOKIE, SessionCookie::delete_cookie_header())],
        Json(json!({ "ok": true })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct EnrollForm {
    username: String,
    password: String,
    display_name: Option<String>,
    email: Option<String>,
}

/// Self-enrollment always lands on the student role; only direction can
/// hand out anything higher.
async fn enroll(
    State(state): State<AppState>,
    Form(form): Form<EnrollForm>,
) -> Result<Json<UserInfo>, CampanileError> {
    let role = state
        .evaluator
        .hierarchy()
        .name_of(state.policies.student.rank())
        .to_string();

    let user = storage::create_user(
        &state.db,
        state.evaluator.hierarchy(),
        storage::NewUser {
            username: form.username,
            password: form.password,
            role,
            display_name: form.display_name,
            email: form.email,
        },
    )
    .await?;

    tracing::info!(username = %user.username, "student enrolled");
    Ok(Json(user.into()))
}

async fn whoami(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, CampanileError> {
    let auth = require(&state, &headers, state.policies.signed_in).await?;
    Ok(Json(auth.user.into()))
}

// ---------- User administration (direction only) ----------

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserInfo>>, CampanileError> {
    require(&state, &headers, state.policies.direction).await?;
    let users = storage::list_users(&state.db).await?;
    Ok(Json(users.into_iter().map(UserInfo::from).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    role: String,
    display_name: Option<String>,
    email: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserInfo>, CampanileError> {
    require(&state, &headers, state.policies.direction).await?;

    let user = storage::create_user(
        &state.db,
        state.evaluator.hierarchy(),
        storage::NewUser {
            username: req.username,
            password: req.password,
            role: req.role,
            display_name: req.display_name,
            email: req.email,
        },
    )
    .await?;

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    enabled: Option<bool>,
    role: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(subject): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserInfo>, CampanileError> {
    require(&state, &headers, state.policies.direction).await?;

    let user = storage::update_user(
        &state.db,
        state.evaluator.hierarchy(),
        &subject,
        req.enabled,
        req.role,
        req.display_name,
        req.email,
    )
    .await?;

    Ok(Json(user.into()))
}

// ---------- Modules & schedules ----------

async fn list_modules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<storage::Module>>, CampanileError> {
    require(&state, &headers, state.policies.student).await?;
    Ok(Json(storage::list_modules(&state.db).await?))
}

#[derive(Debug, Deserialize)]
struct CreateModuleRequest {
    code: String,
    name: String,
    description: Option<String>,
}

async fn create_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateModuleRequest>,
) -> Result<Json<storage::Module>, CampanileError> {
    let auth = require(&state, &headers, state.policies.teacher).await?;

    let module = storage::create_module(
        &state.db,
        storage::NewModule {
            code: req.code,
            name: req.name,
            description: req.description,
            teacher_subject: Some(auth.user.subject),
        },
    )
    .await?;

    Ok(Json(module))
}

async fn get_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<storage::Module>, CampanileError> {
    require(&state, &headers, state.policies.student).await?;
    let module = storage::get_module(&state.db, id)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("module {id}")))?;
    Ok(Json(module))
}

#[derive(Debug, Deserialize)]
struct UpdateModuleRequest {
    name: Option<String>,
    description: Option<String>,
    teacher_subject: Option<String>,
}

async fn update_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateModuleRequest>,
) -> Result<Json<storage::Module>, CampanileError> {
    require(&state, &headers, state.policies.teacher).await?;
    let module = storage::update_module(
        &state.db,
        id,
        req.name,
        req.description,
        req.teacher_subject,
    )
    .await?;
    Ok(Json(module))
}

async fn delete_module(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, CampanileError> {
    require(&state, &headers, state.policies.direction).await?;
    storage::delete_module(&state.db, id).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn get_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<storage::ScheduleEntry>>, CampanileError> {
    require(&state, &headers, state.policies.student).await?;
    if storage::get_module(&state.db, id).await?.is_none() {
        return Err(CampanileError::NotFound(format!("module {id}")));
    }
    Ok(Json(storage::list_schedule(&state.db, id).await?))
}

#[derive(Debug, Deserialize)]
struct AddScheduleRequest {
    weekday: i64,
    start_minute: i64,
    end_minute: i64,
    room: Option<String>,
}

async fn add_schedule_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AddScheduleRequest>,
) -> Result<Json<storage::ScheduleEntry>, CampanileError> {
    require(&state, &headers, state.policies.teacher).await?;
    let entry = storage::add_schedule_entry(
        &state.db,
        id,
        storage::NewScheduleEntry {
            weekday: req.weekday,
            start_minute: req.start_minute,
            end_minute: req.end_minute,
            room: req.room,
        },
    )
    .await?;
    Ok(Json(entry))
}

async fn delete_schedule_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, entry_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, CampanileError> {
    require(&state, &headers, state.policies.teacher).await?;
    storage::delete_schedule_entry(&state.db, id, entry_id).await?;
    Ok(Json(json!({ "ok": true })))
}

// ---------- Appointments ----------

async fn list_appointments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<storage::Appointment>>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;
    Ok(Json(
        storage::list_appointments_for(&state.db, &auth.user.subject).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct CreateAppointmentRequest {
    attendee_username: String,
    title: String,
    notes: Option<String>,
    starts_at: i64,
    ends_at: i64,
}

async fn create_appointment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<storage::Appointment>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;

    let attendee = storage::get_user_by_username(&state.db, &req.attendee_username)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("user `{}`", req.attendee_username)))?;

    let appointment = storage::create_appointment(
        &state.db,
        &auth.user.subject,
        storage::NewAppointment {
            attendee_subject: attendee.subject,
            title: req.title,
            notes: req.notes,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
        },
    )
    .await?;

    Ok(Json(appointment))
}

#[derive(Debug, Deserialize)]
struct AppointmentStatusRequest {
    status: String,
}

async fn set_appointment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AppointmentStatusRequest>,
) -> Result<Json<storage::Appointment>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;

    let appointment = storage::get_appointment(&state.db, id)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("appointment {id}")))?;

    // Only the two participants may act on an appointment
    let subject = &auth.user.subject;
    if appointment.organizer_subject != *subject && appointment.attendee_subject != *subject {
        return Err(CampanileError::Forbidden);
    }

    let updated = storage::set_appointment_status(&state.db, id, &req.status).await?;
    Ok(Json(updated))
}

// ---------- Articles ----------

#[derive(Debug, Deserialize)]
struct ArticleListQuery {
    /// Include unpublished drafts; requires teacher or above.
    #[serde(default)]
    drafts: bool,
}

async fn list_articles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ArticleListQuery>,
) -> Result<Json<Vec<storage::Article>>, CampanileError> {
    if q.drafts {
        require(&state, &headers, state.policies.teacher).await?;
    }
    Ok(Json(storage::list_articles(&state.db, q.drafts).await?))
}

#[derive(Debug, Deserialize)]
struct CreateArticleRequest {
    title: String,
    body: String,
}

async fn create_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateArticleRequest>,
) -> Result<Json<storage::Article>, CampanileError> {
    let auth = require(&state, &headers, state.policies.teacher).await?;
    let article =
        storage::create_article(&state.db, &auth.user.subject, &req.title, &req.body).await?;
    Ok(Json(article))
}

async fn get_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<storage::Article>, CampanileError> {
    let article = storage::get_article(&state.db, id)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("article {id}")))?;

    // Drafts stay invisible below teacher level
    if article.published == 0 {
        require(&state, &headers, state.policies.teacher).await?;
    }

    Ok(Json(article))
}

#[derive(Debug, Deserialize)]
struct UpdateArticleRequest {
    title: Option<String>,
    body: Option<String>,
}

async fn update_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateArticleRequest>,
) -> Result<Json<storage::Article>, CampanileError> {
    require(&state, &headers, state.policies.teacher).await?;
    let article = storage::update_article(&state.db, id, req.title, req.body).await?;
    Ok(Json(article))
}

async fn publish_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<storage::Article>, CampanileError> {
    require(&state, &headers, state.policies.teacher).await?;
    let article = storage::publish_article(&state.db, id).await?;
    Ok(Json(article))
}

async fn delete_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, CampanileError> {
    require(&state, &headers, state.policies.teacher).await?;
    storage::delete_article(&state.db, id).await?;
    Ok(Json(json!({ "ok": true })))
}

// ---------- Messaging ----------

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    recipient_username: String,
    body: String,
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<storage::Message>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;

    let recipient = storage::get_user_by_username(&state.db, &req.recipient_username)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("user `{}`", req.recipient_username)))?;

    let message =
        storage::send_message(&state.db, &auth.user.subject, &recipient.subject, &req.body)
            .await?;
    Ok(Json(message))
}

async fn inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<storage::Message>>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;
    Ok(Json(storage::list_inbox(&state.db, &auth.user.subject).await?))
}

async fn sent(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<storage::Message>>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;
    Ok(Json(storage::list_sent(&state.db, &auth.user.subject).await?))
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;
    let count = storage::unread_count(&state.db, &auth.user.subject).await?;
    Ok(Json(json!({ "unread": count })))
}

async fn mark_message_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;
    if !storage::mark_message_read(&state.db, id, &auth.user.subject).await? {
        return Err(CampanileError::NotFound(format!("message {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

// ---------- Files ----------

const FILE_NAME_HEADER: &str = "x-file-name";

async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<storage::StoredFile>, CampanileError> {
    let auth = require(&state, &headers, state.policies.teacher).await?;

    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            CampanileError::BadRequest(format!("missing `{FILE_NAME_HEADER}` header"))
        })?
        .to_string();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let digest = Sha256::digest(&body);
    let sha256 = base16(digest.as_slice());

    let id = storage::new_file_id();
    state.files.save(&id, &body)?;
    let file = storage::create_stored_file(
        &state.db,
        &id,
        &auth.user.subject,
        &file_name,
        &content_type,
        body.len() as i64,
        &sha256,
    )
    .await?;

    tracing::info!(id = %file.id, name = %file.file_name, size = file.size, "file uploaded");
    Ok(Json(file))
}

fn base16(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<storage::StoredFile>>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;
    Ok(Json(
        storage::list_files_for_owner(&state.db, &auth.user.subject).await?,
    ))
}

async fn download_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, CampanileError> {
    require(&state, &headers, state.policies.student).await?;

    let meta = storage::get_stored_file(&state.db, &id)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("file `{id}`")))?;
    let bytes = state
        .files
        .open(&id)?
        .ok_or_else(|| CampanileError::NotFound(format!("file `{id}`")))?;

    let disposition = format!("attachment; filename=\"{}\"", meta.file_name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Owners may remove their own uploads; direction may remove any.
async fn delete_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CampanileError> {
    let auth = require(&state, &headers, state.policies.student).await?;

    let meta = storage::get_stored_file(&state.db, &id)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("file `{id}`")))?;

    if meta.owner_subject != auth.user.subject
        && !state.evaluator.evaluate(&auth.claims, state.policies.direction)
    {
        return Err(CampanileError::Forbidden);
    }

    storage::delete_stored_file(&state.db, &id).await?;
    state.files.delete(&id)?;
    Ok(Json(json!({ "ok": true })))
}

// ---------- Jobs ----------

async fn run_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, CampanileError> {
    require(&state, &headers, state.policies.direction).await?;
    crate::jobs::trigger_job_manually(&state.db, &name).await?;
    Ok(Json(json!({ "ok": true })))
}
