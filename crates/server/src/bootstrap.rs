use std::sync::Arc;

use axum::Router;
use routetracker_core::config::{AppConfig, ConfigError, LoadOptions};
use routetracker_core::notifications::{NoopDispatcher, NotificationDispatcher};
use routetracker_core::workflow::VoucherWorkflowEngine;
use routetracker_db::{
    connect_from_config, migrations, DbPool, SqlProfileDirectory, SqlRoleRegistry,
    SqlVoucherStore,
};
use thiserror::Error;
use tracing::info;

use crate::notify::{HttpEmailDispatcher, NotifierError};
use crate::{health, vouchers};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: VoucherWorkflowEngine,
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router(self.db_pool.clone()))
            .merge(vouchers::router(self.engine.clone()))
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
    #[error("notification dispatcher setup failed: {0}")]
    Notifier(#[from] NotifierError),
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

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let dispatcher: Arc<dyn NotificationDispatcher> = if config.notifications.enabled {
        Arc::new(HttpEmailDispatcher::from_config(&config.notifications)?)
    } else {
        Arc::new(NoopDispatcher)
    };
    info!(
        event_name = "system.bootstrap.notifications",
        correlation_id = "bootstrap",
        transport = if config.notifications.enabled { "http" } else { "noop" },
        "notification dispatcher initialized"
    );

    let engine = VoucherWorkflowEngine::new(
        Arc::new(SqlVoucherStore::new(db_pool.clone())),
        Arc::new(SqlRoleRegistry::new(db_pool.clone())),
        dispatcher,
        Arc::new(SqlProfileDirectory::new(db_pool.clone())),
    )
    .with_settings(config.workflow_settings());

    Ok(Application { config, db_pool, engine })
}
