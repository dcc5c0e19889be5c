use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tracing::info;

use tripflow_core::config::{AppConfig, ConfigError, LoadOptions};
use tripflow_core::idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
use tripflow_db::{connect_with_settings, migrations, DbPool};
use tripflow_engine::{ApprovalService, AutomationEngine};

use crate::{health, idempotency, routes};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub approvals: ApprovalService,
    pub engine: AutomationEngine,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
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

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
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

    let state = AppState {
        db_pool: db_pool.clone(),
        approvals: ApprovalService::new(db_pool.clone()),
        engine: AutomationEngine::new(db_pool.clone(), config.automation),
        idempotency: Arc::new(InMemoryIdempotencyStore::new(config.idempotency.ttl_secs)),
    };

    Ok(Application { config, db_pool, state })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::approvals::router(state.clone()))
        .merge(routes::automation::router(state.clone()))
        .merge(health::router(state.db_pool.clone()))
        .layer(axum::middleware::from_fn_with_state(state, idempotency::idempotency_layer))
}

/// Per-test in-memory database: a single connection keeps the schema alive
/// for the pool's lifetime without sharing state across tests.
#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.database.max_connections = 1;
    config
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tripflow_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap, bootstrap_with_config, test_config, BootstrapError};

    #[tokio::test]
    async fn bootstrap_loads_config_through_the_standard_path() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap with overrides");
        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_surfaces_config_errors() {
        let error = bootstrap(LoadOptions {
            config_path: Some(PathBuf::from("missing-tripflow.toml")),
            require_file: true,
            ..LoadOptions::default()
        })
        .await
        .expect_err("missing required config file");
        assert!(matches!(error, BootstrapError::Config(_)));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_on_an_empty_database() {
        let app = bootstrap_with_config(test_config()).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('trips', 'tasks', 'notifications', 'approval_requests')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected workflow tables after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose the workflow tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_configuration() {
        let mut config = test_config();
        config.automation.quote_followup_days = 0;
        config.validate().expect_err("validation should fail");

        // A valid config loads cleanly through the same path.
        let app = bootstrap_with_config(test_config()).await.expect("bootstrap valid config");
        app.db_pool.close().await;
    }
}
