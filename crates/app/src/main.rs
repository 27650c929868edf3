use std::sync::Arc;

use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "bankroll={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let Some(server) = settings.server else {
        tracing::warn!("no [server] settings found, nothing to run");
        return Ok(());
    };

    tracing::info!(policy = ?settings.access, "Found server settings...");
    let db = parse_database(&server.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .trial_days(server.trial_days)
        .session_ttl_hours(server.session_ttl_hours)
        .build()
        .await?;
    let engine = Arc::new(engine);

    if let Some(period) = server.purge_interval() {
        let engine = engine.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match engine.purge_expired_sessions(Utc::now()).await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "expired sessions removed"),
                    Err(err) => tracing::warn!("session purge failed: {err}"),
                }
            }
        });
    }

    let state = server::ServerState::new(engine, settings.access);
    let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
    let port = server.port;
    tasks.spawn(async move {
        if let Err(err) = server::run(state, &bind, port).await {
            tracing::error!("server failed: {err}");
        }
    });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
