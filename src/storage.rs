use crate::authz::RoleHierarchy;
use crate::entities;
use crate::errors::CampanileError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::Utc;
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, Database, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

pub const APPOINTMENT_STATUSES: [&str; 4] = ["pending", "confirmed", "declined", "cancelled"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub subject: String,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub created_at: i64,
    pub enabled: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub subject: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub teacher_subject: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewModule {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub teacher_subject: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: i64,
    pub module_id: i64,
    pub weekday: i64,
    pub start_minute: i64,
    pub end_minute: i64,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduleEntry {
    pub weekday: i64,
    pub start_minute: i64,
    pub end_minute: i64,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub organizer_subject: String,
    pub attendee_subject: String,
    pub title: String,
    pub notes: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub attendee_subject: String,
    pub title: String,
    pub notes: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub author_subject: String,
    pub title: String,
    pub body: String,
    pub published: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_subject: String,
    pub recipient_subject: String,
    pub body: String,
    pub sent_at: i64,
    pub read_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub owner_subject: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
    pub created_at: i64,
}

impl From<entities::user::Model> for User {
    fn from(m: entities::user::Model) -> Self {
        Self {
            subject: m.subject,
            username: m.username,
            password_hash: m.password_hash,
            role: m.role,
            display_name: m.display_name,
            email: m.email,
            created_at: m.created_at,
            enabled: m.enabled,
        }
    }
}

impl From<entities::session::Model> for Session {
    fn from(m: entities::session::Model) -> Self {
        Self {
            session_id: m.session_id,
            subject: m.subject,
            created_at: m.created_at,
            expires_at: m.expires_at,
            user_agent: m.user_agent,
            ip_address: m.ip_address,
        }
    }
}

impl From<entities::module::Model> for Module {
    fn from(m: entities::module::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            name: m.name,
            description: m.description,
            teacher_subject: m.teacher_subject,
            created_at: m.created_at,
        }
    }
}

impl From<entities::schedule_entry::Model> for ScheduleEntry {
    fn from(m: entities::schedule_entry::Model) -> Self {
        Self {
            id: m.id,
            module_id: m.module_id,
            weekday: m.weekday,
            start_minute: m.start_minute,
            end_minute: m.end_minute,
            room: m.room,
        }
    }
}

impl From<entities::appointment::Model> for Appointment {
    fn from(m: entities::appointment::Model) -> Self {
        Self {
            id: m.id,
            organizer_subject: m.organizer_subject,
            attendee_subject: m.attendee_subject,
            title: m.title,
            notes: m.notes,
            starts_at: m.starts_at,
            ends_at: m.ends_at,
            status: m.status,
            created_at: m.created_at,
        }
    }
}

impl From<entities::article::Model> for Article {
    fn from(m: entities::article::Model) -> Self {
        Self {
            id: m.id,
            author_subject: m.author_subject,
            title: m.title,
            body: m.body,
            published: m.published,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<entities::message::Model> for Message {
    fn from(m: entities::message::Model) -> Self {
        Self {
            id: m.id,
            sender_subject: m.sender_subject,
            recipient_subject: m.recipient_subject,
            body: m.body,
            sent_at: m.sent_at,
            read_at: m.read_at,
        }
    }
}

impl From<entities::stored_file::Model> for StoredFile {
    fn from(m: entities::stored_file::Model) -> Self {
        Self {
            id: m.id,
            owner_subject: m.owner_subject,
            file_name: m.file_name,
            content_type: m.content_type,
            size: m.size,
            sha256: m.sha256,
            created_at: m.created_at,
        }
    }
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, CampanileError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

/// Id for an uploaded file; generated before the content is written so the
/// disk store and the metadata row share the key.
pub fn new_file_id() -> String {
    random_id()
}

// User management functions

pub async fn create_user(
    db: &DatabaseConnection,
    hierarchy: &RoleHierarchy,
    input: NewUser,
) -> Result<User, CampanileError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    if input.username.trim().is_empty() {
        return Err(CampanileError::BadRequest("username must not be empty".into()));
    }
    if input.password.len() < 8 {
        return Err(CampanileError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if hierarchy.rank_of(&input.role).is_none() {
        return Err(CampanileError::BadRequest(format!(
            "unknown role `{}`",
            input.role
        )));
    }
    if get_user_by_username(db, &input.username).await?.is_some() {
        return Err(CampanileError::BadRequest(format!(
            "username `{}` is already taken",
            input.username
        )));
    }

    let subject = random_id();
    let created_at = Utc::now().timestamp();

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(input.password.as_bytes(), &salt)
        .map_err(|e| CampanileError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();

    let user = entities::user::ActiveModel {
        subject: Set(subject.clone()),
        username: Set(input.username.clone()),
        password_hash: Set(password_hash.clone()),
        role: Set(input.role.clone()),
        display_name: Set(input.display_name.clone()),
        email: Set(input.email.clone()),
        created_at: Set(created_at),
        enabled: Set(1),
    };

    user.insert(db).await?;

    Ok(User {
        subject,
        username: input.username,
        password_hash,
        role: input.role,
        display_name: input.display_name,
        email: input.email,
        created_at,
        enabled: 1,
    })
}

pub async fn get_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<User>, CampanileError> {
    use entities::user::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?
        .map(User::from))
}

pub async fn get_user_by_subject(
    db: &DatabaseConnection,
    subject: &str,
) -> Result<Option<User>, CampanileError> {
    Ok(entities::User::find_by_id(subject.to_string())
        .one(db)
        .await?
        .map(User::from))
}

pub async fn list_users(db: &DatabaseConnection) -> Result<Vec<User>, CampanileError> {
    use entities::user::{Column, Entity};

    Ok(Entity::find()
        .order_by_asc(Column::Username)
        .all(db)
        .await?
        .into_iter()
        .map(User::from)
        .collect())
}

/// Verify a username/password pair. Returns the user's subject on success;
/// disabled users never verify.
pub async fn verify_user_password(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<String>, CampanileError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let user = match get_user_by_username(db, username).await? {
        Some(u) if u.enabled == 1 => u,
        _ => return Ok(None),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| CampanileError::Other(format!("Invalid password hash: {}", e)))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
    {
        Ok(Some(user.subject))
    } else {
        Ok(None)
    }
}

/// Update user fields; `None` leaves a field unchanged. A new role is
/// validated against the hierarchy before it is written.
pub async fn update_user(
    db: &DatabaseConnection,
    hierarchy: &RoleHierarchy,
    subject: &str,
    enabled: Option<bool>,
    role: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
) -> Result<User, CampanileError> {
    use entities::user::Entity;

    if let Some(role) = &role {
        if hierarchy.rank_of(role).is_none() {
            return Err(CampanileError::BadRequest(format!("unknown role `{role}`")));
        }
    }

    let user = Entity::find_by_id(subject.to_string())
        .one(db)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("user `{subject}`")))?;

    // Nothing to change; an UPDATE with zero columns is a driver error
    if enabled.is_none() && role.is_none() && display_name.is_none() && email.is_none() {
        return Ok(user.into());
    }

    let mut active: entities::user::ActiveModel = user.into();
    if let Some(enabled) = enabled {
        active.enabled = Set(if enabled { 1 } else { 0 });
    }
    if let Some(role) = role {
        active.role = Set(role);
    }
    if let Some(display_name) = display_name {
        active.display_name = Set(Some(display_name));
    }
    if let Some(email) = email {
        active.email = Set(Some(email));
    }

    Ok(active.update(db).await?.into())
}

// Session management functions

pub async fn create_session(
    db: &DatabaseConnection,
    subject: &str,
    ttl_secs: i64,
    user_agent: Option<String>,
    ip_address: Option<String>,
) -> Result<Session, CampanileError> {
    let session_id = random_id();
    let now = Utc::now().timestamp();
    let expires_at = now + ttl_secs;

    let session = entities::session::ActiveModel {
        session_id: Set(session_id.clone()),
        subject: Set(subject.to_string()),
        created_at: Set(now),
        expires_at: Set(expires_at),
        user_agent: Set(user_agent.clone()),
        ip_address: Set(ip_address.clone()),
    };

    session.insert(db).await?;

    Ok(Session {
        session_id,
        subject: subject.to_string(),
        created_at: now,
        expires_at,
        user_agent,
        ip_address,
    })
}

/// Look up a session; expired sessions are reported as absent.
pub async fn get_session(
    db: &DatabaseConnection,
    session_id: &str,
) -> Result<Option<Session>, CampanileError> {
    if let Some(model) = entities::Session::find_by_id(session_id.to_string())
        .one(db)
        .await?
    {
        let now = Utc::now().timestamp();
        if now > model.expires_at {
            return Ok(None);
        }
        Ok(Some(model.into()))
    } else {
        Ok(None)
    }
}

pub async fn delete_session(
    db: &DatabaseConnection,
    session_id: &str,
) -> Result<(), CampanileError> {
    entities::Session::delete_by_id(session_id.to_string())
        .exec(db)
        .await?;
    Ok(())
}

pub async fn cleanup_expired_sessions(db: &DatabaseConnection) -> Result<u64, CampanileError> {
    use entities::session::{Column, Entity};

    let now = Utc::now().timestamp();
    let res = Entity::delete_many()
        .filter(Column::ExpiresAt.lt(now))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

// Module management functions

pub async fn create_module(
    db: &DatabaseConnection,
    input: NewModule,
) -> Result<Module, CampanileError> {
    if input.code.trim().is_empty() {
        return Err(CampanileError::BadRequest("module code must not be empty".into()));
    }
    if get_module_by_code(db, &input.code).await?.is_some() {
        return Err(CampanileError::BadRequest(format!(
            "module code `{}` already exists",
            input.code
        )));
    }

    let created_at = Utc::now().timestamp();
    let module = entities::module::ActiveModel {
        code: Set(input.code),
        name: Set(input.name),
        description: Set(input.description),
        teacher_subject: Set(input.teacher_subject),
        created_at: Set(created_at),
        ..Default::default()
    };

    Ok(module.insert(db).await?.into())
}

pub async fn get_module(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<Module>, CampanileError> {
    Ok(entities::Module::find_by_id(id).one(db).await?.map(Module::from))
}

pub async fn get_module_by_code(
    db: &DatabaseConnection,
    code: &str,
) -> Result<Option<Module>, CampanileError> {
    use entities::module::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Code.eq(code))
        .one(db)
        .await?
        .map(Module::from))
}

pub async fn list_modules(db: &DatabaseConnection) -> Result<Vec<Module>, CampanileError> {
    use entities::module::{Column, Entity};

    Ok(Entity::find()
        .order_by_asc(Column::Code)
        .all(db)
        .await?
        .into_iter()
        .map(Module::from)
        .collect())
}

pub async fn update_module(
    db: &DatabaseConnection,
    id: i64,
    name: Option<String>,
    description: Option<String>,
    teacher_subject: Option<String>,
) -> Result<Module, CampanileError> {
    let module = entities::Module::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("module {id}")))?;

    if name.is_none() && description.is_none() && teacher_subject.is_none() {
        return Ok(module.into());
    }

    let mut active: entities::module::ActiveModel = module.into();
    if let Some(name) = name {
        active.name = Set(name);
    }
    if let Some(description) = description {
        active.description = Set(Some(description));
    }
    if let Some(teacher_subject) = teacher_subject {
        active.teacher_subject = Set(Some(teacher_subject));
    }

    Ok(active.update(db).await?.into())
}

/// Delete a module and its timetable.
pub async fn delete_module(db: &DatabaseConnection, id: i64) -> Result<(), CampanileError> {
    use entities::schedule_entry::{Column, Entity as ScheduleEntity};

    let res = entities::Module::delete_by_id(id).exec(db).await?;
    if res.rows_affected == 0 {
        return Err(CampanileError::NotFound(format!("module {id}")));
    }

    ScheduleEntity::delete_many()
        .filter(Column::ModuleId.eq(id))
        .exec(db)
        .await?;

    Ok(())
}

// Schedule functions

pub async fn add_schedule_entry(
    db: &DatabaseConnection,
    module_id: i64,
    input: NewScheduleEntry,
) -> Result<ScheduleEntry, CampanileError> {
    if get_module(db, module_id).await?.is_none() {
        return Err(CampanileError::NotFound(format!("module {module_id}")));
    }
    if !(0..7).contains(&input.weekday) {
        return Err(CampanileError::BadRequest(format!(
            "weekday must be 0 (Monday) through 6 (Sunday), got {}",
            input.weekday
        )));
    }
    if input.start_minute < 0
        || input.end_minute > MINUTES_PER_DAY
        || input.start_minute >= input.end_minute
    {
        return Err(CampanileError::BadRequest(format!(
            "invalid slot {}..{} (minutes from midnight)",
            input.start_minute, input.end_minute
        )));
    }

    let entry = entities::schedule_entry::ActiveModel {
        module_id: Set(module_id),
        weekday: Set(input.weekday),
        start_minute: Set(input.start_minute),
        end_minute: Set(input.end_minute),
        room: Set(input.room),
        ..Default::default()
    };

    Ok(entry.insert(db).await?.into())
}

pub async fn list_schedule(
    db: &DatabaseConnection,
    module_id: i64,
) -> Result<Vec<ScheduleEntry>, CampanileError> {
    use entities::schedule_entry::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ModuleId.eq(module_id))
        .order_by_asc(Column::Weekday)
        .order_by_asc(Column::StartMinute)
        .all(db)
        .await?
        .into_iter()
        .map(ScheduleEntry::from)
        .collect())
}

pub async fn delete_schedule_entry(
    db: &DatabaseConnection,
    module_id: i64,
    entry_id: i64,
) -> Result<(), CampanileError> {
    use entities::schedule_entry::{Column, Entity};

    let res = Entity::delete_many()
        .filter(Column::Id.eq(entry_id))
        .filter(Column::ModuleId.eq(module_id))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Err(CampanileError::NotFound(format!(
            "schedule entry {entry_id} of module {module_id}"
        )));
    }
    Ok(())
}

// Appointment functions

pub async fn create_appointment(
    db: &DatabaseConnection,
    organizer_subject: &str,
    input: NewAppointment,
) -> Result<Appointment, CampanileError> {
    if input.starts_at >= input.ends_at {
        return Err(CampanileError::BadRequest(
            "appointment must start before it ends".into(),
        ));
    }
    if get_user_by_subject(db, &input.attendee_subject).await?.is_none() {
        return Err(CampanileError::NotFound(format!(
            "user `{}`",
            input.attendee_subject
        )));
    }

    let now = Utc::now().timestamp();
    let appointment = entities::appointment::ActiveModel {
        organizer_subject: Set(organizer_subject.to_string()),
        attendee_subject: Set(input.attendee_subject),
        title: Set(input.title),
        notes: Set(input.notes),
        starts_at: Set(input.starts_at),
        ends_at: Set(input.ends_at),
        status: Set("pending".to_string()),
        created_at: Set(now),
        ..Default::default()
    };

    Ok(appointment.insert(db).await?.into())
}

pub async fn get_appointment(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<Appointment>, CampanileError> {
    Ok(entities::Appointment::find_by_id(id)
        .one(db)
        .await?
        .map(Appointment::from))
}

/// All appointments the given subject takes part in, either side.
pub async fn list_appointments_for(
    db: &DatabaseConnection,
    subject: &str,
) -> Result<Vec<Appointment>, CampanileError> {
    use entities::appointment::{Column, Entity};

    Ok(Entity::find()
        .filter(
            Condition::any()
                .add(Column::OrganizerSubject.eq(subject))
                .add(Column::AttendeeSubject.eq(subject)),
        )
        .order_by_asc(Column::StartsAt)
        .all(db)
        .await?
        .into_iter()
        .map(Appointment::from)
        .collect())
}

/// Apply a status transition. Confirm/decline are answers to a pending
/// request; cancelling is allowed while the appointment is still pending or
/// confirmed.
pub async fn set_appointment_status(
    db: &DatabaseConnection,
    id: i64,
    new_status: &str,
) -> Result<Appointment, CampanileError> {
    let appointment = entities::Appointment::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("appointment {id}")))?;

    let allowed_from: &[&str] = match new_status {
        "confirmed" | "declined" => &["pending"],
        "cancelled" => &["pending", "confirmed"],
        _ => {
            return Err(CampanileError::BadRequest(format!(
                "unknown appointment status `{new_status}` (expected one of {APPOINTMENT_STATUSES:?})"
            )))
        }
    };
    if !allowed_from.contains(&appointment.status.as_str()) {
        return Err(CampanileError::BadRequest(format!(
            "cannot move appointment from `{}` to `{new_status}`",
            appointment.status
        )));
    }

    let mut active = appointment.into_active_model();
    active.status = Set(new_status.to_string());
    Ok(active.update(db).await?.into())
}

/// Drop appointments whose end lies further back than `retention_secs`.
pub async fn purge_past_appointments(
    db: &DatabaseConnection,
    retention_secs: i64,
) -> Result<u64, CampanileError> {
    use entities::appointment::{Column, Entity};

    let cutoff = Utc::now().timestamp() - retention_secs;
    let res = Entity::delete_many()
        .filter(Column::EndsAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

// Article functions

pub async fn create_article(
    db: &DatabaseConnection,
    author_subject: &str,
    title: &str,
    body: &str,
) -> Result<Article, CampanileError> {
    if title.trim().is_empty() {
        return Err(CampanileError::BadRequest("article title must not be empty".into()));
    }

    let now = Utc::now().timestamp();
    let article = entities::article::ActiveModel {
        author_subject: Set(author_subject.to_string()),
        title: Set(title.to_string()),
        body: Set(body.to_string()),
        published: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    Ok(article.insert(db).await?.into())
}

pub async fn get_article(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<Article>, CampanileError> {
    Ok(entities::Article::find_by_id(id).one(db).await?.map(Article::from))
}

/// Newest first. Unpublished drafts are only included on request.
pub async fn list_articles(
    db: &DatabaseConnection,
    include_unpublished: bool,
) -> Result<Vec<Article>, CampanileError> {
    use entities::article::{Column, Entity};

    let mut query = Entity::find().order_by_desc(Column::CreatedAt);
    if !include_unpublished {
        query = query.filter(Column::Published.eq(1));
    }

    Ok(query.all(db).await?.into_iter().map(Article::from).collect())
}

pub async fn update_article(
    db: &DatabaseConnection,
    id: i64,
    title: Option<String>,
    body: Option<String>,
) -> Result<Article, CampanileError> {
    let article = entities::Article::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("article {id}")))?;

    let mut active: entities::article::ActiveModel = article.into();
    if let Some(title) = title {
        active.title = Set(title);
    }
    if let Some(body) = body {
        active.body = Set(body);
    }
    active.updated_at = Set(Utc::now().timestamp());

    Ok(active.update(db).await?.into())
}

pub async fn publish_article(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Article, CampanileError> {
    let article = entities::Article::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| CampanileError::NotFound(format!("article {id}")))?;

    let mut active: entities::article::ActiveModel = article.into();
    active.published = Set(1);
    active.updated_at = Set(Utc::now().timestamp());

    Ok(active.update(db).await?.into())
}

pub async fn delete_article(db: &DatabaseConnection, id: i64) -> Result<(), CampanileError> {
    let res = entities::Article::delete_by_id(id).exec(db).await?;
    if res.rows_affected == 0 {
        return Err(CampanileError::NotFound(format!("article {id}")));
    }
    Ok(())
}

// Messaging functions

pub async fn send_message(
    db: &DatabaseConnection,
    sender_subject: &str,
    recipient_subject: &str,
    body: &str,
) -> Result<Message, CampanileError> {
    if body.trim().is_empty() {
        return Err(CampanileError::BadRequest("message body must not be empty".into()));
    }
    if get_user_by_subject(db, recipient_subject).await?.is_none() {
        return Err(CampanileError::NotFound(format!("user `{recipient_subject}`")));
    }

    let message = entities::message::ActiveModel {
        sender_subject: Set(sender_subject.to_string()),
        recipient_subject: Set(recipient_subject.to_string()),
        body: Set(body.to_string()),
        sent_at: Set(Utc::now().timestamp()),
        read_at: Set(None),
        ..Default::default()
    };

    Ok(message.insert(db).await?.into())
}

pub async fn list_inbox(
    db: &DatabaseConnection,
    subject: &str,
) -> Result<Vec<Message>, CampanileError> {
    use entities::message::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::RecipientSubject.eq(subject))
        .order_by_desc(Column::SentAt)
        .all(db)
        .await?
        .into_iter()
        .map(Message::from)
        .collect())
}

pub async fn list_sent(
    db: &DatabaseConnection,
    subject: &str,
) -> Result<Vec<Message>, CampanileError> {
    use entities::message::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::SenderSubject.eq(subject))
        .order_by_desc(Column::SentAt)
        .all(db)
        .await?
        .into_iter()
        .map(Message::from)
        .collect())
}

/// Mark a message read. Returns `false` when the message does not exist or
/// the caller is not its recipient; already-read messages keep their
/// original read timestamp.
pub async fn mark_message_read(
    db: &DatabaseConnection,
    id: i64,
    recipient_subject: &str,
) -> Result<bool, CampanileError> {
    let message = match entities::Message::find_by_id(id).one(db).await? {
        Some(m) if m.recipient_subject == recipient_subject => m,
        _ => return Ok(false),
    };

    if message.read_at.is_none() {
        let mut active = message.into_active_model();
        active.read_at = Set(Some(Utc::now().timestamp()));
        active.update(db).await?;
    }
    Ok(true)
}

pub async fn unread_count(
    db: &DatabaseConnection,
    subject: &str,
) -> Result<u64, CampanileError> {
    use entities::message::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::RecipientSubject.eq(subject))
        .filter(Column::ReadAt.is_null())
        .count(db)
        .await?)
}

// Stored file metadata functions

pub async fn create_stored_file(
    db: &DatabaseConnection,
    id: &str,
    owner_subject: &str,
    file_name: &str,
    content_type: &str,
    size: i64,
    sha256: &str,
) -> Result<StoredFile, CampanileError> {
    let created_at = Utc::now().timestamp();

    let file = entities::stored_file::ActiveModel {
        id: Set(id.to_string()),
        owner_subject: Set(owner_subject.to_string()),
        file_name: Set(file_name.to_string()),
        content_type: Set(content_type.to_string()),
        size: Set(size),
        sha256: Set(sha256.to_string()),
        created_at: Set(created_at),
    };

    Ok(file.insert(db).await?.into())
}

pub async fn get_stored_file(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<StoredFile>, CampanileError> {
    Ok(entities::StoredFile::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(StoredFile::from))
}

pub async fn list_files_for_owner(
    db: &DatabaseConnection,
    owner_subject: &str,
) -> Result<Vec<StoredFile>, CampanileError> {
    use entities::stored_file::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::OwnerSubject.eq(owner_subject))
        .order_by_desc(Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(StoredFile::from)
        .collect())
}

pub async fn delete_stored_file(
    db: &DatabaseConnection,
    id: &str,
) -> Result<(), CampanileError> {
    let res = entities::StoredFile::delete_by_id(id.to_string()).exec(db).await?;
    if res.rows_affected == 0 {
        return Err(CampanileError::NotFound(format!("file `{id}`")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    /// Test database helper that keeps temp file alive
    struct TestDb {
        connection: DatabaseConnection,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let db_url = format!("sqlite://{}?mode=rwc", db_path);

            let connection = Database::connect(&db_url)
                .await
                .expect("Failed to connect to test database");

            migration::Migrator::up(&connection, None)
                .await
                .expect("Failed to run migrations");

            Self {
                connection,
                _temp_file: temp_file,
            }
        }

        fn connection(&self) -> &DatabaseConnection {
            &self.connection
        }
    }

    fn hierarchy() -> RoleHierarchy {
        RoleHierarchy::new(["guest", "student", "teacher", "direction"]).unwrap()
    }

    async fn seed_user(db: &DatabaseConnection, username: &str, role: &str) -> User {
        create_user(
            db,
            &hierarchy(),
            NewUser {
                username: username.to_string(),
                password: "password123".to_string(),
                role: role.to_string(),
                display_name: None,
                email: None,
            },
        )
        .await
        .expect("Failed to create user")
    }

    // ============================================================================
    // User Management Tests
    // ============================================================================

    #[tokio::test]
    async fn test_create_user() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = seed_user(db, "alice", "student").await;

        assert!(!user.subject.is_empty());
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "student");
        assert_eq!(user.enabled, 1);
        // Verify it's Argon2 hash format
        assert!(user.password_hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn test_create_user_unknown_role() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let err = create_user(
            db,
            &hierarchy(),
            NewUser {
                username: "bob".into(),
                password: "password123".into(),
                role: "janitor".into(),
                display_name: None,
                email: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_create_user_duplicate_username() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        seed_user(db, "alice", "student").await;

        let err = create_user(
            db,
            &hierarchy(),
            NewUser {
                username: "alice".into(),
                password: "password123".into(),
                role: "teacher".into(),
                display_name: None,
                email: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_create_user_short_password() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let err = create_user(
            db,
            &hierarchy(),
            NewUser {
                username: "bob".into(),
                password: "short".into(),
                role: "student".into(),
                display_name: None,
                email: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_get_user_by_username_and_subject() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let created = seed_user(db, "alice", "teacher").await;

        let by_name = get_user_by_username(db, "alice")
            .await
            .unwrap()
            .expect("User not found");
        assert_eq!(by_name.subject, created.subject);

        let by_subject = get_user_by_subject(db, &created.subject)
            .await
            .unwrap()
            .expect("User not found");
        assert_eq!(by_subject.username, "alice");

        assert!(get_user_by_username(db, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_user_password() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        seed_user(db, "alice", "student").await;

        let subject = verify_user_password(db, "alice", "password123")
            .await
            .unwrap();
        assert!(subject.is_some());

        let wrong = verify_user_password(db, "alice", "wrongpassword")
            .await
            .unwrap();
        assert!(wrong.is_none());
    }

    #[tokio::test]
    async fn test_verify_user_password_disabled() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = seed_user(db, "alice", "student").await;
        update_user(db, &hierarchy(), &user.subject, Some(false), None, None, None)
            .await
            .unwrap();

        let result = verify_user_password(db, "alice", "password123")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_user_role() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = seed_user(db, "alice", "student").await;

        let updated = update_user(
            db,
            &hierarchy(),
            &user.subject,
            None,
            Some("teacher".into()),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(updated.role, "teacher");

        let err = update_user(
            db,
            &hierarchy(),
            &user.subject,
            None,
            Some("janitor".into()),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    // ============================================================================
    // Session Tests
    // ============================================================================

    #[tokio::test]
    async fn test_session_lifecycle() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = seed_user(db, "alice", "student").await;
        let session = create_session(db, &user.subject, 3600, None, None)
            .await
            .unwrap();

        let found = get_session(db, &session.session_id)
            .await
            .unwrap()
            .expect("Session not found");
        assert_eq!(found.subject, user.subject);

        delete_session(db, &session.session_id).await.unwrap();
        assert!(get_session(db, &session.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_not_returned() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = seed_user(db, "alice", "student").await;
        // negative ttl -> already expired
        let session = create_session(db, &user.subject, -10, None, None)
            .await
            .unwrap();

        assert!(get_session(db, &session.session_id).await.unwrap().is_none());

        let removed = cleanup_expired_sessions(db).await.unwrap();
        assert_eq!(removed, 1);
    }

    // ============================================================================
    // Module & Schedule Tests
    // ============================================================================

    async fn seed_module(db: &DatabaseConnection, code: &str) -> Module {
        create_module(
            db,
            NewModule {
                code: code.to_string(),
                name: format!("Module {code}"),
                description: None,
                teacher_subject: None,
            },
        )
        .await
        .expect("Failed to create module")
    }

    #[tokio::test]
    async fn test_module_crud() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let module = seed_module(db, "MATH-101").await;
        assert_eq!(module.code, "MATH-101");

        let found = get_module_by_code(db, "MATH-101").await.unwrap().unwrap();
        assert_eq!(found.id, module.id);

        let updated = update_module(db, module.id, Some("Algebra".into()), None, None)
            .await
            .unwrap();
        assert_eq!(updated.name, "Algebra");

        seed_module(db, "BIO-201").await;
        let all = list_modules(db).await.unwrap();
        assert_eq!(all.len(), 2);
        // ordered by code
        assert_eq!(all[0].code, "BIO-201");

        delete_module(db, module.id).await.unwrap();
        assert!(get_module(db, module.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_module_code_rejected() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        seed_module(db, "MATH-101").await;
        let err = create_module(
            db,
            NewModule {
                code: "MATH-101".into(),
                name: "Other".into(),
                description: None,
                teacher_subject: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_schedule_entries_ordered() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let module = seed_module(db, "MATH-101").await;

        add_schedule_entry(
            db,
            module.id,
            NewScheduleEntry {
                weekday: 2,
                start_minute: 600,
                end_minute: 660,
                room: Some("B12".into()),
            },
        )
        .await
        .unwrap();
        add_schedule_entry(
            db,
            module.id,
            NewScheduleEntry {
                weekday: 0,
                start_minute: 480,
                end_minute: 540,
                room: None,
            },
        )
        .await
        .unwrap();

        let entries = list_schedule(db, module.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].weekday, 0);
        assert_eq!(entries[1].weekday, 2);
    }

    #[tokio::test]
    async fn test_schedule_entry_validation() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let module = seed_module(db, "MATH-101").await;

        // bad weekday
        let err = add_schedule_entry(
            db,
            module.id,
            NewScheduleEntry {
                weekday: 7,
                start_minute: 480,
                end_minute: 540,
                room: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));

        // start after end
        let err = add_schedule_entry(
            db,
            module.id,
            NewScheduleEntry {
                weekday: 1,
                start_minute: 540,
                end_minute: 480,
                room: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));

        // unknown module
        let err = add_schedule_entry(
            db,
            9999,
            NewScheduleEntry {
                weekday: 1,
                start_minute: 480,
                end_minute: 540,
                room: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampanileError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_module_removes_schedule() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let module = seed_module(db, "MATH-101").await;
        add_schedule_entry(
            db,
            module.id,
            NewScheduleEntry {
                weekday: 1,
                start_minute: 480,
                end_minute: 540,
                room: None,
            },
        )
        .await
        .unwrap();

        delete_module(db, module.id).await.unwrap();
        assert!(list_schedule(db, module.id).await.unwrap().is_empty());
    }

    // ============================================================================
    // Appointment Tests
    // ============================================================================

    #[tokio::test]
    async fn test_appointment_lifecycle() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let student = seed_user(db, "alice", "student").await;
        let teacher = seed_user(db, "bob", "teacher").await;

        let now = Utc::now().timestamp();
        let appt = create_appointment(
            db,
            &student.subject,
            NewAppointment {
                attendee_subject: teacher.subject.clone(),
                title: "Progress review".into(),
                notes: None,
                starts_at: now + 3600,
                ends_at: now + 5400,
            },
        )
        .await
        .unwrap();
        assert_eq!(appt.status, "pending");

        let confirmed = set_appointment_status(db, appt.id, "confirmed").await.unwrap();
        assert_eq!(confirmed.status, "confirmed");

        // both participants see it
        assert_eq!(list_appointments_for(db, &student.subject).await.unwrap().len(), 1);
        assert_eq!(list_appointments_for(db, &teacher.subject).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_appointment_invalid_transitions() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let student = seed_user(db, "alice", "student").await;
        let teacher = seed_user(db, "bob", "teacher").await;

        let now = Utc::now().timestamp();
        let appt = create_appointment(
            db,
            &student.subject,
            NewAppointment {
                attendee_subject: teacher.subject.clone(),
                title: "Review".into(),
                notes: None,
                starts_at: now,
                ends_at: now + 600,
            },
        )
        .await
        .unwrap();

        set_appointment_status(db, appt.id, "declined").await.unwrap();

        // a declined appointment cannot be confirmed or cancelled
        for status in ["confirmed", "cancelled"] {
            let err = set_appointment_status(db, appt.id, status).await.unwrap_err();
            assert!(matches!(err, CampanileError::BadRequest(_)));
        }

        // unknown status
        let err = set_appointment_status(db, appt.id, "rescheduled").await.unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_appointment_starts_before_ends() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let student = seed_user(db, "alice", "student").await;

        let err = create_appointment(
            db,
            &student.subject,
            NewAppointment {
                attendee_subject: student.subject.clone(),
                title: "Backwards".into(),
                notes: None,
                starts_at: 100,
                ends_at: 100,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_purge_past_appointments() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let student = seed_user(db, "alice", "student").await;
        let teacher = seed_user(db, "bob", "teacher").await;

        let now = Utc::now().timestamp();
        // long over
        create_appointment(
            db,
            &student.subject,
            NewAppointment {
                attendee_subject: teacher.subject.clone(),
                title: "Ancient".into(),
                notes: None,
                starts_at: now - 200_000,
                ends_at: now - 190_000,
            },
        )
        .await
        .unwrap();
        // upcoming
        create_appointment(
            db,
            &student.subject,
            NewAppointment {
                attendee_subject: teacher.subject.clone(),
                title: "Soon".into(),
                notes: None,
                starts_at: now + 3600,
                ends_at: now + 7200,
            },
        )
        .await
        .unwrap();

        let purged = purge_past_appointments(db, 86_400).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(list_appointments_for(db, &student.subject).await.unwrap().len(), 1);
    }

    // ============================================================================
    // Article Tests
    // ============================================================================

    #[tokio::test]
    async fn test_article_publish_flow() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let teacher = seed_user(db, "bob", "teacher").await;

        let article = create_article(db, &teacher.subject, "Sports day", "Bring shoes.")
            .await
            .unwrap();
        assert_eq!(article.published, 0);

        // drafts are hidden from the public listing
        assert!(list_articles(db, false).await.unwrap().is_empty());
        assert_eq!(list_articles(db, true).await.unwrap().len(), 1);

        publish_article(db, article.id).await.unwrap();
        let published = list_articles(db, false).await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].title, "Sports day");
    }

    #[tokio::test]
    async fn test_article_update_and_delete() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let teacher = seed_user(db, "bob", "teacher").await;
        let article = create_article(db, &teacher.subject, "Draft", "v1").await.unwrap();

        let updated = update_article(db, article.id, None, Some("v2".into()))
            .await
            .unwrap();
        assert_eq!(updated.body, "v2");
        assert_eq!(updated.title, "Draft");

        delete_article(db, article.id).await.unwrap();
        assert!(get_article(db, article.id).await.unwrap().is_none());

        let err = delete_article(db, article.id).await.unwrap_err();
        assert!(matches!(err, CampanileError::NotFound(_)));
    }

    // ============================================================================
    // Messaging Tests
    // ============================================================================

    #[tokio::test]
    async fn test_messaging_flow() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let alice = seed_user(db, "alice", "student").await;
        let bob = seed_user(db, "bob", "teacher").await;

        send_message(db, &alice.subject, &bob.subject, "Question about homework")
            .await
            .unwrap();
        let msg = send_message(db, &alice.subject, &bob.subject, "Never mind!")
            .await
            .unwrap();

        let inbox = list_inbox(db, &bob.subject).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(unread_count(db, &bob.subject).await.unwrap(), 2);

        assert!(mark_message_read(db, msg.id, &bob.subject).await.unwrap());
        assert_eq!(unread_count(db, &bob.subject).await.unwrap(), 1);

        // only the recipient can mark a message read
        assert!(!mark_message_read(db, msg.id, &alice.subject).await.unwrap());

        let sent = list_sent(db, &alice.subject).await.unwrap();
        assert_eq!(sent.len(), 2);
        assert!(list_inbox(db, &alice.subject).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_unknown_recipient() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let alice = seed_user(db, "alice", "student").await;
        let err = send_message(db, &alice.subject, "no-such-subject", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, CampanileError::NotFound(_)));
    }

    // ============================================================================
    // Stored File Tests
    // ============================================================================

    #[tokio::test]
    async fn test_stored_file_metadata() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let teacher = seed_user(db, "bob", "teacher").await;

        let id = new_file_id();
        let file = create_stored_file(
            db,
            &id,
            &teacher.subject,
            "syllabus.pdf",
            "application/pdf",
            1234,
            "deadbeef",
        )
        .await
        .unwrap();
        assert_eq!(file.file_name, "syllabus.pdf");

        let found = get_stored_file(db, &id).await.unwrap().unwrap();
        assert_eq!(found.size, 1234);

        let owned = list_files_for_owner(db, &teacher.subject).await.unwrap();
        assert_eq!(owned.len(), 1);

        delete_stored_file(db, &id).await.unwrap();
        assert!(get_stored_file(db, &id).await.unwrap().is_none());
    }
}
