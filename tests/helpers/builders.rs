use campanile::storage;
use sea_orm::DatabaseConnection;

use super::db::school_hierarchy;

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    password: String,
    role: String,
    display_name: Option<String>,
    email: Option<String>,
    enabled: bool,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: "password123".to_string(),
            role: "student".to_string(),
            display_name: None,
            email: None,
            enabled: true,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> storage::User {
        let hierarchy = school_hierarchy();
        let user = storage::create_user(
            db,
            &hierarchy,
            storage::NewUser {
                username: self.username,
                password: self.password,
                role: self.role,
                display_name: self.display_name,
                email: self.email,
            },
        )
        .await
        .expect("Failed to create test user");

        if !self.enabled {
            storage::update_user(db, &hierarchy, &user.subject, Some(false), None, None, None)
                .await
                .expect("Failed to disable user")
        } else {
            user
        }
    }
}

/// Builder for creating test modules
pub struct ModuleBuilder {
    code: String,
    name: String,
    description: Option<String>,
    teacher_subject: Option<String>,
}

impl ModuleBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: format!("Module {code}"),
            description: None,
            teacher_subject: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_teacher(mut self, subject: &str) -> Self {
        self.teacher_subject = Some(subject.to_string());
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> storage::Module {
        storage::create_module(
            db,
            storage::NewModule {
                code: self.code,
                name: self.name,
                description: self.description,
                teacher_subject: self.teacher_subject,
            },
        )
        .await
        .expect("Failed to create test module")
    }
}

/// Builder for creating test appointments
pub struct AppointmentBuilder {
    organizer_subject: String,
    attendee_subject: String,
    title: String,
    starts_at: i64,
    ends_at: i64,
}

impl AppointmentBuilder {
    pub fn new(organizer_subject: &str, attendee_subject: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            organizer_subject: organizer_subject.to_string(),
            attendee_subject: attendee_subject.to_string(),
            title: "Meeting".to_string(),
            starts_at: now + 3600,
            ends_at: now + 5400,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn at(mut self, starts_at: i64, ends_at: i64) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> storage::Appointment {
        storage::create_appointment(
            db,
            &self.organizer_subject,
            storage::NewAppointment {
                attendee_subject: self.attendee_subject,
                title: self.title,
                notes: None,
                starts_at: self.starts_at,
                ends_at: self.ends_at,
            },
        )
        .await
        .expect("Failed to create test appointment")
    }
}
