use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service, post};
use chrono::{DateTime, Utc};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::aggregate::Resolution;
use crate::app::AppContext;
use crate::classify::Status;
use crate::config::LocationId;
use crate::export;
use crate::poller::{self, CURRENT_LOOP, HISTORY_LOOP, RefreshKind, TriggerOutcome};

const LOOP_NAMES: &[&str] = &[CURRENT_LOOP, HISTORY_LOOP];

pub fn create_router(ctx: AppContext) -> Router {
    let static_dir = ctx.config.http.static_dir.clone();
    let asset_service = get_service(ServeDir::new(static_dir));

    let api = Router::new()
        .route("/locations", get(get_locations))
        .route("/snapshot", get(get_snapshot))
        .route("/snapshot/:location", get(get_location))
        .route("/alerts", get(get_alerts))
        .route("/export/:location", get(get_export))
        .route("/refresh/:kind", post(post_refresh));

    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/metrics", get(get_metrics))
        .nest("/api/v1", api)
        .fallback_service(asset_service)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn get_healthz(State(ctx): State<AppContext>) -> StatusCode {
    // Ready once both loops have succeeded recently enough; three slow
    // intervals gives the history loop room for one failed attempt.
    let staleness = ctx.config.sample_intervals.history * 3;
    let staleness = staleness.max(Duration::from_secs(180));

    if ctx.state.is_ready(LOOP_NAMES, staleness).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn get_metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

#[derive(serde::Serialize)]
struct LocationSummary {
    id: LocationId,
    name: String,
    composite: Status,
    battery_level: u8,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    updated_at: Option<DateTime<Utc>>,
}

async fn get_locations(State(ctx): State<AppContext>) -> Json<Vec<LocationSummary>> {
    let snapshot = ctx.state.snapshot().await;
    let summaries = snapshot
        .locations
        .values()
        .map(|location| LocationSummary {
            id: location.id.clone(),
            name: location.name.clone(),
            composite: location.composite,
            battery_level: location.battery_level,
            updated_at: location.updated_at,
        })
        .collect();
    Json(summaries)
}

async fn get_snapshot(State(ctx): State<AppContext>) -> Json<crate::state::DashboardSnapshot> {
    Json(ctx.state.snapshot().await)
}

async fn get_location(
    State(ctx): State<AppContext>,
    Path(location): Path<String>,
) -> Result<Json<crate::state::LocationState>, StatusCode> {
    let id = LocationId::new(location).map_err(|_| StatusCode::BAD_REQUEST)?;
    match ctx.state.location(&id).await {
        Some(state) => Ok(Json(state)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_alerts(State(ctx): State<AppContext>) -> Json<Vec<crate::alerts::AlertEvent>> {
    Json(ctx.state.alerts().await)
}

/// CSV export for one location.
/// Query params:
///   ?resolution=hour | day | month | year (default day)
async fn get_export(
    State(ctx): State<AppContext>,
    Path(location): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, StatusCode> {
    let id = LocationId::new(location).map_err(|_| StatusCode::BAD_REQUEST)?;
    let resolution = match params.get("resolution") {
        Some(raw) => Resolution::parse(raw).ok_or(StatusCode::BAD_REQUEST)?,
        None => Resolution::Day,
    };

    let state = ctx.state.location(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    let csv = export::export_csv(&state, resolution, Utc::now());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}-{}.csv\"",
                    id,
                    resolution.as_str()
                ),
            ),
        ],
        csv,
    )
        .into_response())
}

/// Manual refresh trigger; `kind` is `current` or `history`. Returns 409
/// when a cycle of that kind is already in flight.
async fn post_refresh(
    State(ctx): State<AppContext>,
    Path(kind): Path<String>,
) -> Result<StatusCode, Response> {
    let kind = RefreshKind::parse(&kind)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "unknown refresh kind").into_response())?;

    match poller::trigger(&ctx, kind).await {
        Ok(TriggerOutcome::Completed) => Ok(StatusCode::OK),
        Ok(TriggerOutcome::Busy) => Ok(StatusCode::CONFLICT),
        Err(err) => {
            warn!(error = ?err, "manual refresh failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response())
        }
    }
}
