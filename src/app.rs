use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/roster", get(handlers::get_roster))
        .route("/api/logs", get(handlers::list_logs).post(handlers::save_log))
        .route("/api/logs/:user/:date", delete(handlers::delete_log))
        .route("/api/summary", get(handlers::get_summary))
        .route("/api/leaderboard", get(handlers::get_leaderboard))
        .route("/api/alerts", get(handlers::get_alerts))
        .route("/api/audit", get(handlers::get_audit))
        .route("/api/export.csv", get(handlers::export_csv))
        .route("/api/import", post(handlers::import_csv))
        .with_state(state)
}
