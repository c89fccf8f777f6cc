use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Backend-specific auto-increment primary key: SQLite wants INTEGER for
/// rowid aliasing, Postgres gets a bigserial.
fn auto_id<T: IntoIden>(manager: &SchemaManager<'_>, name: T) -> ColumnDef {
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(name)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(name)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Subject)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_uniq(Users::Username))
                    .col(string(Users::PasswordHash))
                    .col(string(Users::Role))
                    .col(string_null(Users::DisplayName))
                    .col(string_null(Users::Email))
                    .col(big_integer(Users::CreatedAt))
                    .col(
                        ColumnDef::new(Users::Enabled)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // Create sessions table
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::SessionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Sessions::Subject))
                    .col(big_integer(Sessions::CreatedAt))
                    .col(big_integer(Sessions::ExpiresAt))
                    .col(string_null(Sessions::UserAgent))
                    .col(string_null(Sessions::IpAddress))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_expires")
                    .table(Sessions::Table)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Create modules table
        manager
            .create_table(
                Table::create()
                    .table(Modules::Table)
                    .if_not_exists()
                    .col(auto_id(manager, Modules::Id))
                    .col(string_uniq(Modules::Code))
                    .col(string(Modules::Name))
                    .col(string_null(Modules::Description))
                    .col(string_null(Modules::TeacherSubject))
                    .col(big_integer(Modules::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create schedule_entries table
        manager
            .create_table(
                Table::create()
                    .table(ScheduleEntries::Table)
                    .if_not_exists()
                    .col(auto_id(manager, ScheduleEntries::Id))
                    .col(big_integer(ScheduleEntries::ModuleId))
                    .col(big_integer(ScheduleEntries::Weekday))
                    .col(big_integer(ScheduleEntries::StartMinute))
                    .col(big_integer(ScheduleEntries::EndMinute))
                    .col(string_null(ScheduleEntries::Room))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_schedule_entries_module")
                    .table(ScheduleEntries::Table)
                    .col(ScheduleEntries::ModuleId)
                    .to_owned(),
            )
            .await?;

        // Create appointments table
        manager
            .create_table(
                Table::create()
                    .table(Appointments::Table)
                    .if_not_exists()
                    .col(auto_id(manager, Appointments::Id))
                    .col(string(Appointments::OrganizerSubject))
                    .col(string(Appointments::AttendeeSubject))
                    .col(string(Appointments::Title))
                    .col(string_null(Appointments::Notes))
                    .col(big_integer(Appointments::StartsAt))
                    .col(big_integer(Appointments::EndsAt))
                    .col(string(Appointments::Status))
                    .col(big_integer(Appointments::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_appointments_ends")
                    .table(Appointments::Table)
                    .col(Appointments::EndsAt)
                    .to_owned(),
            )
            .await?;

        // Create articles table
        manager
            .create_table(
                Table::create()
                    .table(Articles::Table)
                    .if_not_exists()
                    .col(auto_id(manager, Articles::Id))
                    .col(string(Articles::AuthorSubject))
                    .col(string(Articles::Title))
                    .col(text(Articles::Body))
                    .col(
                        ColumnDef::new(Articles::Published)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(big_integer(Articles::CreatedAt))
                    .col(big_integer(Articles::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Create messages table
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(auto_id(manager, Messages::Id))
                    .col(string(Messages::SenderSubject))
                    .col(string(Messages::RecipientSubject))
                    .col(text(Messages::Body))
                    .col(big_integer(Messages::SentAt))
                    .col(big_integer_null(Messages::ReadAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_messages_recipient")
                    .table(Messages::Table)
                    .col(Messages::RecipientSubject)
                    .to_owned(),
            )
            .await?;

        // Create stored_files table
        manager
            .create_table(
                Table::create()
                    .table(StoredFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StoredFiles::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(StoredFiles::OwnerSubject))
                    .col(string(StoredFiles::FileName))
                    .col(string(StoredFiles::ContentType))
                    .col(big_integer(StoredFiles::Size))
                    .col(string(StoredFiles::Sha256))
                    .col(big_integer(StoredFiles::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create job_executions table
        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(auto_id(manager, JobExecutions::Id))
                    .col(string(JobExecutions::JobName))
                    .col(big_integer(JobExecutions::StartedAt))
                    .col(big_integer_null(JobExecutions::CompletedAt))
                    .col(big_integer_null(JobExecutions::Success))
                    .col(string_null(JobExecutions::ErrorMessage))
                    .col(big_integer_null(JobExecutions::RecordsProcessed))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_executions_started")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StoredFiles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Articles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Appointments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScheduleEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Modules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Subject,
    Username,
    PasswordHash,
    Role,
    DisplayName,
    Email,
    CreatedAt,
    Enabled,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
    Subject,
    CreatedAt,
    ExpiresAt,
    UserAgent,
    IpAddress,
}

#[derive(DeriveIden)]
enum Modules {
    Table,
    Id,
    Code,
    Name,
    Description,
    TeacherSubject,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ScheduleEntries {
    Table,
    Id,
    ModuleId,
    Weekday,
    StartMinute,
    EndMinute,
    Room,
}

#[derive(DeriveIden)]
enum Appointments {
    Table,
    Id,
    OrganizerSubject,
    AttendeeSubject,
    Title,
    Notes,
    StartsAt,
    EndsAt,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Articles {
    Table,
    Id,
    AuthorSubject,
    Title,
    Body,
    Published,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    SenderSubject,
    RecipientSubject,
    Body,
    SentAt,
    ReadAt,
}

#[derive(DeriveIden)]
enum StoredFiles {
    Table,
    Id,
    OwnerSubject,
    FileName,
    ContentType,
    Size,
    Sha256,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobName,
    StartedAt,
    CompletedAt,
    Success,
    ErrorMessage,
    RecordsProcessed,
}
