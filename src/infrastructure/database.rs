use crate::entities::upload_sessions;
use anyhow::Context;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    info!("📂 Database: {}", describe_database_url(&db_url));

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Backend and host of a connection URL, without credentials or path.
fn describe_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        // sqlite::memory: and similar have no authority part
        return url.split(':').next().unwrap_or_default().to_string();
    };
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if host.is_empty() {
        scheme.to_string()
    } else {
        format!("{}://{}", scheme, host)
    }
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    let table = schema
        .create_table_from_entity(upload_sessions::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&table)).await?;
    info!("   - Table 'upload_sessions' checked/created");

    // Expiry sweeps scan by status and deadline
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_upload_sessions_status ON upload_sessions(status)",
        "CREATE INDEX IF NOT EXISTS idx_upload_sessions_expires_at ON upload_sessions(expires_at)",
    ];

    for query in indexes {
        match db
            .execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await
        {
            Ok(_) => info!("   - Executed schema update: {}", query),
            Err(e) => tracing::warn!("   - Schema update warning: {} -> {}", query, e),
        }
    }

    Ok(())
}
