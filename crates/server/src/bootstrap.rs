use std::sync::Arc;

use orgflow_core::config::{AppConfig, ConfigError};
use orgflow_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::state::AppServices;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: Arc<AppServices>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Connects, migrates and wires services for an already loaded config.
/// The config is validated again since callers may have edited it.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let services = Arc::new(AppServices::new(&config, db_pool.clone())?);

    Ok(Application { config, db_pool, services })
}

#[cfg(test)]
mod tests {
    use orgflow_core::config::AppConfig;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn config_for(url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = url.to_string();
        config
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_services() {
        let app = bootstrap_with_config(config_for("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('employee', 'approval_flow', 'scheduled_trigger', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(table_count, 4);

        let stats = app.services.hierarchy.stats(&Default::default()).await.expect("stats");
        assert_eq!(stats.total_employees, 0);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap_with_config(config_for("postgres://localhost/orgflow")).await;

        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}
