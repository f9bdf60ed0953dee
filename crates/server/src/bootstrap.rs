use agentmart_core::config::{AppConfig, ConfigError, LoadOptions};
use agentmart_db::repositories::SqlAuthRepository;
use agentmart_db::{connect_from_config, migrations, ChangeBus, DbPool};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::webhook::WebhookLeadSink;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub changes: ChangeBus,
    pub lead_sink: WebhookLeadSink,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("lead webhook client could not be built: {0}")]
    WebhookClient(#[source] reqwest::Error),
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

    match SqlAuthRepository::new(db_pool.clone()).purge_expired_sessions(Utc::now()).await {
        Ok(purged) => info!(
            event_name = "system.bootstrap.sessions_purged",
            correlation_id = "bootstrap",
            purged,
            "expired admin sessions removed"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.sessions_purge_failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not purge expired sessions"
        ),
    }

    let lead_sink =
        WebhookLeadSink::from_config(&config.lead_webhook).map_err(BootstrapError::WebhookClient)?;

    Ok(Application { config, db_pool, changes: ChangeBus::default(), lead_sink })
}

#[cfg(test)]
mod tests {
    use agentmart_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str, webhook_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                lead_webhook_url: Some(webhook_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_invalid_webhook_url() {
        let result = bootstrap(overrides("sqlite::memory:", "not a url")).await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("lead_webhook.url"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations() {
        let app = bootstrap(overrides("sqlite::memory:", "https://hooks.example.com/lead"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('agents', 'key_features', 'users', 'sessions')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("foundation tables after bootstrap");
        assert_eq!(table_count, 4);
        assert_eq!(app.changes.active_subscriptions(), 0);

        app.db_pool.close().await;
    }
}
