use crate::state::AppState;
use axum::Router;
use axum::routing::get;

pub mod handlers;
pub mod responses;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/status", get(handlers::get_all_status))
        .route("/api/status/{sensor_id}", get(handlers::get_sensor_status))
        .route("/api/popular-times", get(handlers::get_popular_times))
        .route(
            "/api/popular-times/week",
            get(handlers::get_popular_times_week),
        )
        .route(
            "/api/popular-times/{day}",
            get(handlers::get_popular_times_for_day),
        )
        .with_state(state)
}
