use axum::{extract::State, routing::get, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use super::{LeaderboardEntry, ReportResponse, RoundAttempts};
use crate::shared::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/average-scores", get(average_scores))
        .route("/api/round-attempts", get(round_attempts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/average-scores
///
/// Top players by average score. Never fails; a store outage yields the
/// last good answer marked `stale`.
#[instrument(name = "average_scores", skip(state))]
pub async fn average_scores(
    State(state): State<AppState>,
) -> Json<ReportResponse<LeaderboardEntry>> {
    let response = state.reporting.leaderboard().await;
    info!(count = response.count, stale = response.stale, "Leaderboard served");
    Json(response)
}

/// GET /api/round-attempts
#[instrument(name = "round_attempts", skip(state))]
pub async fn round_attempts(
    State(state): State<AppState>,
) -> Json<ReportResponse<RoundAttempts>> {
    let response = state.reporting.round_attempts().await;
    info!(count = response.count, stale = response.stale, "Round attempts served");
    Json(response)
}
