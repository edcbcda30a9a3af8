use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Local;
use goal_insight_schemas::{Diagnosis, DiagnosisId, ErrorResponse, UserId};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::batch::BatchRunner;
use crate::database::Database;
use crate::error::AnalysisError;
use crate::period::AnalysisPeriod;

const DEFAULT_HISTORY_MONTHS: usize = 6;
const MAX_HISTORY_MONTHS: usize = 60;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub runner: Arc<BatchRunner>,
    /// Trigger secret; `None` rejects every trigger call
    pub cron_secret: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Scheduled trigger
        .route(
            "/api/cron/monthly-analysis",
            get(run_monthly_analysis).post(run_monthly_analysis),
        )
        // Read views
        .route("/diagnoses/:subject_id/history", get(get_history))
        .route("/diagnoses/:subject_id/:year/:month", get(get_diagnosis))
        .route("/questions/:diagnosis_id", get(get_questions))
        .route("/trainers/:trainer_id/diagnoses", get(get_trainer_diagnoses))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", secret))
        .unwrap_or(false)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "goal-insight",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn run_monthly_analysis(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&headers, state.cron_secret.as_deref()) {
        warn!("Rejected unauthorized monthly analysis trigger");
        return error_json(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    info!("Monthly analysis triggered");
    match state.runner.run().await {
        Ok(report) => Json(report.tally).into_response(),
        Err(e)
            if matches!(
                e.downcast_ref::<AnalysisError>(),
                Some(AnalysisError::AlreadyRunning)
            ) =>
        {
            error_json(StatusCode::CONFLICT, "Analysis already running")
        }
        Err(e) => {
            error!("Monthly analysis failed: {:#}", e);
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn get_diagnosis(
    State(state): State<AppState>,
    Path((subject_id, year, month)): Path<(String, i32, u32)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let period = AnalysisPeriod::new(year, month)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid month {}", month)))?;

    let db = state.db.lock().await;
    let diagnosis = db
        .get_diagnosis(&UserId(subject_id), period.year(), period.month())
        .map_err(|e| {
            error!("Failed to load diagnosis: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    match diagnosis {
        Some(d) => Ok(Json(d)),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("no diagnosis for {}", period),
        )),
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    months: Option<usize>,
}

async fn get_history(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let months = params
        .months
        .unwrap_or(DEFAULT_HISTORY_MONTHS)
        .min(MAX_HISTORY_MONTHS);

    let periods = AnalysisPeriod::recent(&Local::now(), months);
    let (Some(from), Some(to)) = (periods.first(), periods.last()) else {
        return Ok(Json(Vec::<Diagnosis>::new()));
    };

    let db = state.db.lock().await;
    let history = db
        .diagnosis_history(&UserId(subject_id), *from, *to)
        .map_err(|e| {
            error!("Failed to load diagnosis history: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(history))
}

async fn get_questions(
    State(state): State<AppState>,
    Path(diagnosis_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let diagnosis_id = DiagnosisId(diagnosis_id);
    let db = state.db.lock().await;

    let exists = db
        .get_diagnosis_by_id(&diagnosis_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .is_some();
    if !exists {
        return Err((
            StatusCode::NOT_FOUND,
            format!("diagnosis {} not found", diagnosis_id),
        ));
    }

    let suggestions = db.suggestions_for(&diagnosis_id).map_err(|e| {
        error!("Failed to load suggestions: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(suggestions))
}

async fn get_trainer_diagnoses(
    State(state): State<AppState>,
    Path(trainer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let db = state.db.lock().await;
    let view = db
        .latest_diagnoses_for_trainer(&UserId(trainer_id))
        .map_err(|e| {
            error!("Failed to load trainer view: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(view))
}
