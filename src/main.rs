use campanile::authz::{PolicyEvaluator, RoleHierarchy};
use campanile::files::FileStore;
use campanile::web::{AppState, Policies};
use campanile::{jobs, settings, storage, web};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "campanile", version, about = "School-management backend")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // role hierarchy and per-surface requirements; bad role configuration
    // aborts here, before anything binds
    let hierarchy = RoleHierarchy::new(settings.authz.hierarchy.clone())?;
    let evaluator = Arc::new(PolicyEvaluator::new(hierarchy));
    let policies = Policies::new(&evaluator)?;
    tracing::info!(roles = ?evaluator.hierarchy().roles(), "Role hierarchy loaded");

    // init storage (database) and apply migrations
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    // on-disk store for uploads
    let files = FileStore::new(settings.files.dir.clone())?;

    // ensure a direction account exists
    ensure_direction_account(&db, &evaluator).await?;

    // start background jobs
    let _scheduler = jobs::init_scheduler(db.clone()).await?;

    // start web server
    let state = AppState {
        settings: Arc::new(settings),
        db,
        evaluator,
        policies,
        files,
    };
    web::serve(state).await?;
    Ok(())
}

async fn ensure_direction_account(
    db: &sea_orm::DatabaseConnection,
    evaluator: &PolicyEvaluator,
) -> Result<()> {
    if storage::get_user_by_username(db, "direction")
        .await
        .into_diagnostic()?
        .is_none()
    {
        let role = evaluator
            .hierarchy()
            .name_of(evaluator.hierarchy().highest())
            .to_string();
        storage::create_user(
            db,
            evaluator.hierarchy(),
            storage::NewUser {
                username: "direction".to_string(),
                password: "password123".to_string(),
                role,
                display_name: Some("School direction".to_string()),
                email: None,
            },
        )
        .await
        .into_diagnostic()?;
        tracing::warn!(
            "Created default direction user (username: direction, password: password123) - change it"
        );
    }
    Ok(())
}
