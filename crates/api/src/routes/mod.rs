pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /letters/job                      get, save, discard (GET, PUT, DELETE)
/// /letters/job/followups            generate follow-up questions (POST)
/// /letters/job/research/start       start a research run (POST)
/// /letters/job/research/status      merged research status (GET)
/// /letters/job/research/cancel      request cancellation (POST)
///
/// /credits                          current balance (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/letters/job",
            get(handlers::letter::get_job)
                .put(handlers::letter::save_job)
                .delete(handlers::letter::discard_job),
        )
        .route(
            "/letters/job/followups",
            post(handlers::letter::generate_follow_ups),
        )
        .route(
            "/letters/job/research/start",
            post(handlers::research::start_research),
        )
        .route(
            "/letters/job/research/status",
            get(handlers::research::research_status),
        )
        .route(
            "/letters/job/research/cancel",
            post(handlers::research::cancel_research),
        )
        .route("/credits", get(handlers::credits::get_balance))
}
