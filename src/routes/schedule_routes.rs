// src/routes/schedule_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    booking::service::TherapistSchedule,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, TimeBlock},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/therapists/{therapist_id}/schedule", get(get_schedule))
        .route("/therapists/{therapist_id}/time_blocks", post(open_time_blocks))
}

/// Inclusive day range, `YYYY-MM-DD`. Missing bounds mean the current month.
#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenTimeBlocksBody {
    pub date_times: Vec<String>,
}

pub async fn get_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(therapist_id): Path<Uuid>,
    Query(q): Query<ScheduleQuery>,
) -> Result<Json<ApiOk<TherapistSchedule>>, ApiError> {
    auth.require_staff()?;
    let schedule = state
        .booking
        .therapist_schedule(therapist_id, q.start.as_deref(), q.end.as_deref())
        .await?;
    Ok(Json(ApiOk { data: schedule }))
}

pub async fn open_time_blocks(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(therapist_id): Path<Uuid>,
    Json(body): Json<OpenTimeBlocksBody>,
) -> Result<Json<ApiOk<Vec<TimeBlock>>>, ApiError> {
    let caller = auth.require_staff()?;
    if body.date_times.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "date_times must not be empty".into(),
        ));
    }
    let created = state
        .booking
        .open_slots(therapist_id, body.date_times, caller)
        .await?;
    Ok(Json(ApiOk { data: created }))
}
