//! HTTP chart repository server

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use chartport_repo::Catalog;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

const INDEX_CONTENT_TYPE: &str = "application/x-yaml";
const CHART_CONTENT_TYPE: &str = "application/x-tar";

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<Catalog>,
}

/// Build the chart repository router
pub fn router(catalog: Arc<Catalog>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/index.yaml", get(index))
        .route("/charts/{name}", get(chart))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { catalog })
}

async fn root() -> &'static str {
    "Welcome to chartport, a Helm chart repository backed by an OCI registry\n"
}

async fn healthz() -> &'static str {
    "ok"
}

/// Rescan the registry and render `index.yaml`
async fn index(State(state): State<AppState>) -> Result<Response, ApiError> {
    let index = state.catalog.index().await?;
    let body = index.to_yaml()?;
    Ok(([(header::CONTENT_TYPE, INDEX_CONTENT_TYPE)], body).into_response())
}

/// Stream a chart archive
async fn chart(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let stream = state.catalog.open_chart(&name).await?;
    Ok((
        [(header::CONTENT_TYPE, CHART_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Rescan the registry every `interval`, keeping the cache on failure
pub fn spawn_refresh(catalog: Arc<Catalog>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial scan already ran
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match catalog.scan().await {
                Ok(records) => {
                    tracing::debug!(charts = records.len(), "Background refresh complete")
                }
                Err(e) => tracing::warn!(error = %e, "Background refresh failed"),
            }
        }
    })
}
