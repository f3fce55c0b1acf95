use crate::alerts::InactivityAlert;
use crate::errors::{AppError, TrackerError, TrackerResult};
use crate::models::{
    AlertQuery, AuditEntry, ImportReport, LogRecord, RosterResponse, SaveLogRequest,
    SummaryQuery, SummaryResponse,
};
use crate::state::AppState;
use crate::summary::{DateWindow, UserSummary};
use crate::tracker::Tracker;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{Datelike, Local, NaiveDate};
use std::sync::Arc;

pub async fn get_roster(State(state): State<AppState>) -> Json<RosterResponse> {
    let config = state.tracker.config();
    Json(RosterResponse {
        users: config.users.clone(),
        tasks: config.tasks.clone(),
        roles: config.roles.clone(),
    })
}

pub async fn list_logs(State(state): State<AppState>) -> Result<Json<Vec<LogRecord>>, AppError> {
    let records = run(&state, |tracker| tracker.all()).await?;
    Ok(Json(records))
}

pub async fn save_log(
    State(state): State<AppState>,
    Json(payload): Json<SaveLogRequest>,
) -> Result<Json<LogRecord>, AppError> {
    let today = today();
    let record = run(&state, move |tracker| {
        let date = tracker.resolve_entry_date(payload.date, payload.backfill, today)?;
        tracker.upsert(payload.user.trim(), date, payload.completed)
    })
    .await?;
    Ok(Json(record))
}

pub async fn delete_log(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, NaiveDate)>,
) -> Result<StatusCode, AppError> {
    run(&state, move |tracker| tracker.delete(&user, date)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    let (window, reference) = resolve_window(&query, today())?;
    let users = run(&state, move |tracker| tracker.summaries(window, reference)).await?;

    let config = state.tracker.config();
    Ok(Json(SummaryResponse {
        window,
        reference,
        basis: config.accounting,
        task_count: config.task_count(),
        users,
    }))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let (window, reference) = resolve_window(&query, today())?;
    let board = run(&state, move |tracker| tracker.leaderboard(window, reference)).await?;
    Ok(Json(board))
}

pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<Vec<InactivityAlert>>, AppError> {
    let reference = query.reference.unwrap_or_else(today);
    let alerts = run(&state, move |tracker| tracker.inactivity_alerts(reference)).await?;
    Ok(Json(alerts))
}

pub async fn get_audit(State(state): State<AppState>) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let entries = run(&state, |tracker| tracker.audit_trail()).await?;
    Ok(Json(entries))
}

pub async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = run(&state, |tracker| tracker.export_csv()).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"task_logs.csv\"",
            ),
        ],
        body,
    ))
}

pub async fn import_csv(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportReport>, AppError> {
    let report = run(&state, move |tracker| tracker.import_csv(&body)).await?;
    Ok(Json(report))
}

/// Store access is blocking, so it runs off the async workers.
async fn run<T, F>(state: &AppState, job: F) -> Result<T, AppError>
where
    F: FnOnce(&Tracker) -> TrackerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let tracker = Arc::clone(&state.tracker);
    tokio::task::spawn_blocking(move || job(tracker.as_ref()))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}

/// Explicit `start`/`end` win; otherwise the calendar month given by
/// `year`/`month`, defaulting to the reference date's month.
fn resolve_window(query: &SummaryQuery, today: NaiveDate) -> Result<(DateWindow, NaiveDate), AppError> {
    let reference = query.reference.unwrap_or(today);
    let window = match (query.start, query.end) {
        (Some(start), Some(end)) => DateWindow::new(start, end)?,
        (None, None) => DateWindow::month(
            query.year.unwrap_or(reference.year()),
            query.month.unwrap_or(reference.month()),
        )?,
        _ => {
            return Err(TrackerError::validation("start and end must be given together").into());
        }
    };
    Ok((window, reference))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
