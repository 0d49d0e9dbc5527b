use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::db::Database;
use crate::live_feed::{CredentialPool, NormalizedMatch, SnapshotStore, Sport};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub pool: Arc<CredentialPool>,
    pub db: Database,
}

type ApiError = (StatusCode, String);

/// Build the feed router. Credential debug routes are only mounted when
/// `debug_routes` is set.
pub fn router(state: AppState, debug_routes: bool) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/live", get(live_handler))
        .route("/api/favorites", post(add_favorite_handler))
        .route("/api/favorites/:user_id", get(list_favorites_handler));

    if debug_routes {
        app = app
            .route("/api/debug/credentials", get(all_credentials_handler))
            .route("/api/debug/credentials/:sport", get(sport_credentials_handler))
            .route(
                "/api/debug/credentials/:sport/exhaust",
                post(exhaust_handler),
            );
    }

    app.layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/live
async fn live_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.store.read();
    Json(snapshot.as_ref().clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddFavorite {
    user_id: String,
    match_id: String,
    sport: String,
}

/// POST /api/favorites
async fn add_favorite_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddFavorite>,
) -> Result<impl IntoResponse, ApiError> {
    let sport = parse_sport(&body.sport)?;
    if body.user_id.trim().is_empty() || body.match_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "userId and matchId are required".to_string(),
        ));
    }
    let prefix = NormalizedMatch::match_id(sport, "");
    if !body.match_id.starts_with(&prefix) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("matchId must start with {}", prefix),
        ));
    }

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        db.add_favorite(body.user_id.trim(), &body.match_id, sport.as_str())
    })
    .await
    .map_err(internal)?
    .map_err(internal)?;
    Ok(StatusCode::CREATED)
}

/// GET /api/favorites/:user_id
async fn list_favorites_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.list_favorites(&user_id))
        .await
        .map_err(internal)?
        .map(Json)
        .map_err(internal)
}

/// GET /api/debug/credentials
async fn all_credentials_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report: BTreeMap<_, _> = Sport::ALL
        .into_iter()
        .map(|sport| (sport, state.pool.status_report(sport)))
        .collect();
    Json(report)
}

/// GET /api/debug/credentials/:sport
async fn sport_credentials_handler(
    State(state): State<Arc<AppState>>,
    Path(sport): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let sport = parse_sport(&sport)?;
    Ok(Json(state.pool.status_report(sport)))
}

#[derive(Debug, Deserialize)]
struct ExhaustParams {
    index: Option<usize>,
}

/// POST /api/debug/credentials/:sport/exhaust?index=n
async fn exhaust_handler(
    State(state): State<Arc<AppState>>,
    Path(sport): Path<String>,
    Query(params): Query<ExhaustParams>,
) -> Result<impl IntoResponse, ApiError> {
    let sport = parse_sport(&sport)?;
    let exhausted = state
        .pool
        .simulate_exhaustion(sport, params.index)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    warn!("[{}] Debug route exhausted {} key(s)", sport, exhausted);
    Ok(Json(json!({
        "sport": sport,
        "exhausted": exhausted,
        "credentials": state.pool.status_report(sport),
    })))
}

fn parse_sport(raw: &str) -> Result<Sport, ApiError> {
    Sport::parse(raw).ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown sport: {}", raw)))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
