mod admin;
mod bootstrap;
mod drafts;
mod health;
mod render;
mod site;
mod state;
mod viewer;
mod webhook;
mod wizard_sessions;

use std::time::Duration;

use agentmart_core::config::{AppConfig, LoadOptions};
use anyhow::Result;
use axum::Router;
use tokio::sync::oneshot;
use tower_http::services::ServeDir;

use crate::health::HealthState;
use crate::state::AppState;

fn init_logging(config: &AppConfig) {
    use agentmart_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(admin::router(state.clone()))
        .merge(site::router(state))
        .nest_service("/static", ServeDir::new("static"))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so its events are captured.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let templates = render::init_templates()?;
    let state = AppState::from_application(&app, templates);

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        HealthState::new(app.db_pool.clone(), app.changes.clone()),
    )
    .await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let router = app_router(state);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "agentmart-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "agentmart-server stopping"
    );

    let _ = stop_tx.send(());
    // Open catalog streams never finish on their own; the grace period caps the wait.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "connections still open after grace period; exiting"
        ),
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use agentmart_core::wizard::InMemoryLeadSink;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::app_router;
    use crate::state::testing::in_memory_state;

    #[tokio::test]
    async fn admin_and_site_routes_share_one_router() {
        let app = app_router(in_memory_state(InMemoryLeadSink::default()));

        let login = app
            .clone()
            .oneshot(Request::get("/admin/login").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let missing = app
            .oneshot(Request::get("/no/such/page").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(login.status(), StatusCode::OK);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
