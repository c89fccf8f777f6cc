use crate::entities;
use crate::errors::CampanileError;
use crate::storage;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter, Set};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// How long finished appointments are kept before the purge job drops them.
const APPOINTMENT_RETENTION_SECS: i64 = 90 * 24 * 3600;

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(db: DatabaseConnection) -> Result<JobScheduler, CampanileError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| CampanileError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let db_clone = db.clone();

    // Cleanup expired sessions job - runs every hour
    let cleanup_sessions_job = Job::new_async("0 0 * * * *", move |_uuid, _l| {
        let db = db_clone.clone();
        Box::pin(async move {
            info!("Running cleanup_expired_sessions job");
            let execution_id = start_job_execution(&db, "cleanup_expired_sessions")
                .await
                .ok();

            match storage::cleanup_expired_sessions(&db).await {
                Ok(count) => {
                    info!("Cleaned up {} expired sessions", count);
                    if let Some(id) = execution_id {
                        let _ =
                            complete_job_execution(&db, id, true, None, Some(count as i64)).await;
                    }
                }
                Err(e) => {
                    error!("Failed to cleanup expired sessions: {}", e);
                    if let Some(id) = execution_id {
                        let _ =
                            complete_job_execution(&db, id, false, Some(e.to_string()), None).await;
                    }
                }
            }
        })
    })
    .map_err(|e| CampanileError::Other(format!("Failed to create cleanup sessions job: {}", e)))?;

    sched
        .add(cleanup_sessions_job)
        .await
        .map_err(|e| CampanileError::Other(format!("Failed to add cleanup sessions job: {}", e)))?;

    let db_clone = db.clone();

    // Purge long-past appointments - runs daily at 03:30
    let purge_appointments_job = Job::new_async("0 30 3 * * *", move |_uuid, _l| {
        let db = db_clone.clone();
        Box::pin(async move {
            info!("Running purge_past_appointments job");
            let execution_id = start_job_execution(&db, "purge_past_appointments")
                .await
                .ok();

            match storage::purge_past_appointments(&db, APPOINTMENT_RETENTION_SECS).await {
                Ok(count) => {
                    info!("Purged {} past appointments", count);
                    if let Some(id) = execution_id {
                        let _ =
                            complete_job_execution(&db, id, true, None, Some(count as i64)).await;
                    }
                }
                Err(e) => {
                    error!("Failed to purge past appointments: {}", e);
                    if let Some(id) = execution_id {
                        let _ =
                            complete_job_execution(&db, id, false, Some(e.to_string()), None).await;
                    }
                }
            }
        })
    })
    .map_err(|e| {
        CampanileError::Other(format!("Failed to create purge appointments job: {}", e))
    })?;

    sched.add(purge_appointments_job).await.map_err(|e| {
        CampanileError::Other(format!("Failed to add purge appointments job: {}", e))
    })?;

    // Start the scheduler
    sched
        .start()
        .await
        .map_err(|e| CampanileError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started with {} jobs", 2);

    Ok(sched)
}

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, CampanileError> {
    use entities::job_execution;

    let now = Utc::now().timestamp();

    let execution = job_execution::ActiveModel {
        job_name: Set(job_name.to_string()),
        started_at: Set(now),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
        ..Default::default()
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), CampanileError> {
    use entities::job_execution::{Column, Entity};

    let now = Utc::now().timestamp();

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}

/// Manually trigger a job by name (useful for the admin surface)
pub async fn trigger_job_manually(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<(), CampanileError> {
    info!("Manually triggering job: {}", job_name);
    let execution_id = start_job_execution(db, job_name).await?;

    let result = match job_name {
        "cleanup_expired_sessions" => storage::cleanup_expired_sessions(db).await,
        "purge_past_appointments" => {
            storage::purge_past_appointments(db, APPOINTMENT_RETENTION_SECS).await
        }
        _ => {
            return Err(CampanileError::BadRequest(format!(
                "Unknown job name: {}",
                job_name
            )));
        }
    };

    match result {
        Ok(count) => {
            info!(
                "Manually triggered job {} completed: {} records",
                job_name, count
            );
            complete_job_execution(db, execution_id, true, None, Some(count as i64)).await?;
        }
        Err(e) => {
            error!("Manually triggered job {} failed: {}", job_name, e);
            complete_job_execution(db, execution_id, false, Some(e.to_string()), None).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;
    use tempfile::NamedTempFile;

    async fn test_db() -> (DatabaseConnection, NamedTempFile) {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_url = format!("sqlite://{}?mode=rwc", temp_file.path().display());
        let db = Database::connect(&db_url).await.expect("connect failed");
        migration::Migrator::up(&db, None).await.expect("migrations failed");
        (db, temp_file)
    }

    #[tokio::test]
    async fn test_job_execution_bookkeeping() {
        let (db, _f) = test_db().await;

        let id = start_job_execution(&db, "cleanup_expired_sessions")
            .await
            .unwrap();
        complete_job_execution(&db, id, true, None, Some(3)).await.unwrap();

        let row = entities::JobExecution::find_by_id(id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.success, Some(1));
        assert_eq!(row.records_processed, Some(3));
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_trigger_unknown_job() {
        let (db, _f) = test_db().await;
        let err = trigger_job_manually(&db, "defragment_chalkboard").await.unwrap_err();
        assert!(matches!(err, CampanileError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_trigger_known_jobs() {
        let (db, _f) = test_db().await;
        trigger_job_manually(&db, "cleanup_expired_sessions").await.unwrap();
        trigger_job_manually(&db, "purge_past_appointments").await.unwrap();

        let rows = entities::JobExecution::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.success == Some(1)));
    }
}
