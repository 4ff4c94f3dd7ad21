//! HTTP interface for map and dashboard front ends.
//!
//! Provides:
//! - JSON endpoints for the composed event list, alert state and stats
//! - control endpoints for location refresh, policy, history and filter
//! - SSE (Server-Sent Events) pushing alert state after every change

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::cli::parse_type_filter;
use crate::coordinator::AlertPhase;
use crate::engine::{Engine, EngineConfig, HistoryStatus};
use crate::errors::{HazardError, Notice};
use crate::location::FixedLocation;
use crate::models::{AlertState, DisasterEvent};
use crate::proximity::ProximityPolicy;
use crate::stats::Stats;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub poll_interval: u64,
    pub engine: EngineConfig,
    pub location: FixedLocation,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    engine: Engine,
}

/// Alert state plus the context needed to render it.
#[derive(Debug, Serialize)]
pub struct AlertView {
    pub phase: AlertPhase,
    pub policy: ProximityPolicy,
    #[serde(flatten)]
    pub alert: AlertState,
}

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub mode: Option<String>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub days: Option<u32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    #[serde(rename = "type")]
    pub event_type: String,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub located: bool,
}

/// Rejected control request.
pub struct ApiError(HazardError);

impl From<HazardError> for ApiError {
    fn from(e: HazardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/events", get(events_handler))
        .route("/alert", get(alert_handler))
        .route("/stats", get(stats_handler))
        .route("/notices", get(notices_handler))
        .route("/stream", get(sse_handler))
        .route("/location/refresh", post(location_handler))
        .route("/policy", post(policy_handler))
        .route("/history", get(history_status_handler).post(history_handler))
        .route("/filter", post(filter_handler))
        .with_state(state)
}

/// Start the web server.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let engine = Engine::from_config(&config.engine, Arc::new(config.location))?;
    engine.start(config.engine.history_days).await?;

    // Spawn the background polling task
    let poll_engine = engine.clone();
    let interval = config.poll_interval;
    tokio::spawn(async move {
        poll_live(poll_engine, interval).await;
    });

    let app = create_router(AppState { engine });

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🌐 hazardtail API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Background task that re-fetches the live feed.
async fn poll_live(engine: Engine, interval_secs: u64) {
    loop {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        engine.refresh_live().await;
    }
}

async fn alert_view(engine: &Engine) -> AlertView {
    AlertView {
        phase: engine.phase().await,
        policy: engine.policy().await,
        alert: engine.alert_state().await,
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

async fn events_handler(State(state): State<AppState>) -> Json<Vec<DisasterEvent>> {
    Json(state.engine.composed_events().await)
}

async fn alert_handler(State(state): State<AppState>) -> Json<AlertView> {
    Json(alert_view(&state.engine).await)
}

async fn stats_handler(State(state): State<AppState>) -> Json<Stats> {
    Json(state.engine.stats().await)
}

async fn notices_handler(State(state): State<AppState>) -> Json<Vec<Notice>> {
    Json(state.engine.notices().await)
}

/// SSE stream of alert state changes.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let alert = result.ok()?;
        let json = serde_json::to_string(&alert).ok()?;
        Some(Ok(Event::default().event("alert").data(json)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn location_handler(State(state): State<AppState>) -> Json<LocationResponse> {
    let located = state.engine.refresh_user_location().await;
    Json(LocationResponse { located })
}

async fn policy_handler(
    State(state): State<AppState>,
    Json(req): Json<PolicyRequest>,
) -> Result<Json<AlertView>, ApiError> {
    match (req.mode.as_deref(), req.radius_km) {
        // Radius alone keeps the current mode
        (None, Some(radius_km)) => state.engine.set_radius(radius_km).await?,
        (None, None) => {
            return Err(HazardError::InvalidPolicy("expected mode or radius_km".into()).into());
        }
        (Some(mode), radius_km) => match ProximityPolicy::from_mode(mode, radius_km)? {
            // Bare "nearby" restores the last radius in use
            ProximityPolicy::Nearby { .. } if radius_km.is_none() => state.engine.use_nearby().await,
            policy => state.engine.set_policy(policy).await,
        },
    }
    Ok(Json(alert_view(&state.engine).await))
}

async fn history_status_handler(State(state): State<AppState>) -> Json<HistoryStatus> {
    Json(state.engine.history_status().await)
}

async fn history_handler(
    State(state): State<AppState>,
    Json(req): Json<HistoryRequest>,
) -> Result<Json<Vec<DisasterEvent>>, ApiError> {
    if let Some(days) = req.days {
        state.engine.set_history_window(days).await?;
    }
    if let Some(enabled) = req.enabled {
        state.engine.set_history_enabled(enabled).await;
    }
    Ok(Json(state.engine.composed_events().await))
}

async fn filter_handler(
    State(state): State<AppState>,
    Json(req): Json<FilterRequest>,
) -> Json<Vec<DisasterEvent>> {
    state
        .engine
        .set_type_filter(parse_type_filter(&req.event_type))
        .await;
    Json(state.engine.composed_events().await)
}
