//! Axum trigger surface for the sync pipeline.
//!
//! One externally-authenticated endpoint starts a run; the caller gets a
//! generic success or failure signal, never pipeline diagnostics.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use stint_feed::FeedClient;
use stint_pipeline::{SyncConfig, SyncPipeline};
use stint_store::PgStore;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "stint-web";

#[derive(Clone)]
pub struct AppState {
    pub cron_secret: String,
    pub pipeline: Arc<SyncPipeline>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/cron", get(cron_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let cron_secret = std::env::var("CRON_SECRET").unwrap_or_default();
    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    let feed = FeedClient::new(config.feed.clone())?;
    let pipeline = Arc::new(SyncPipeline::new(store, feed));

    if let Some(scheduler) = pipeline.maybe_build_scheduler(&config).await? {
        scheduler.start().await?;
        info!(cron = %config.sync_cron, "in-process sync scheduler started");
    }

    let port: u16 = std::env::var("STINT_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(
        listener,
        app(AppState {
            cron_secret,
            pipeline,
        }),
    )
    .await?;
    Ok(())
}

async fn index_handler() -> &'static str {
    "Hello, world!"
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn cron_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            !state.cron_secret.is_empty() && value == format!("Bearer {}", state.cron_secret)
        })
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    match state.pipeline.run_once().await {
        Ok(summary) => {
            info!(run_id = %summary.run_id, reconciled = summary.reconciled, "triggered sync complete");
            (StatusCode::OK, "sync complete").into_response()
        }
        // Details stay in the logs; the trigger caller gets a bare failure.
        Err(err) => {
            error!(error = %err, "triggered sync failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "sync failed").into_response()
        }
    }
}
