// src/routes/package_routes.rs

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    booking::service::PatientBookings,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Appointment, TreatmentPlan},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients/{patient_id}/packages", get(patient_packages))
        .route("/patients/{patient_id}/bookings", get(patient_bookings))
        .route("/packages/{plan_id}/appointments", get(package_appointments))
        .route("/packages/{plan_id}/paid", post(set_paid).delete(clear_paid))
        .route("/packages/{plan_id}/referral", put(assign_referral))
        .route("/packages/{plan_id}", delete(remove_package))
}

#[derive(Debug, Default, Deserialize)]
pub struct PaidBody {
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralBody {
    pub referral_id: Option<Uuid>,
    #[serde(default)]
    pub discount_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct RemovedPackage {
    pub treatment_plan_id: Uuid,
    pub appointments_removed: usize,
}

pub async fn patient_packages(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<TreatmentPlan>>>, ApiError> {
    auth.require_staff()?;
    let plans = state.booking.patient_packages(patient_id).await?;
    Ok(Json(ApiOk { data: plans }))
}

// Public: the booking page shows a patient their own requests and visits.
pub async fn patient_bookings(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<PatientBookings>>, ApiError> {
    let bookings = state.booking.patient_bookings(patient_id).await?;
    Ok(Json(ApiOk { data: bookings }))
}

pub async fn package_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    auth.require_staff()?;
    let rows = state.booking.package_appointments(plan_id).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn set_paid(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(plan_id): Path<Uuid>,
    body: Option<Json<PaidBody>>,
) -> Result<Json<ApiOk<TreatmentPlan>>, ApiError> {
    auth.require_staff()?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let plan = state
        .booking
        .set_package_paid(plan_id, body.payment_method)
        .await?;
    Ok(Json(ApiOk { data: plan }))
}

pub async fn clear_paid(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<ApiOk<TreatmentPlan>>, ApiError> {
    auth.require_staff()?;
    let plan = state.booking.clear_package_paid(plan_id).await?;
    Ok(Json(ApiOk { data: plan }))
}

pub async fn assign_referral(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(plan_id): Path<Uuid>,
    Json(body): Json<ReferralBody>,
) -> Result<Json<ApiOk<TreatmentPlan>>, ApiError> {
    auth.require_staff()?;
    let plan = state
        .booking
        .assign_referral(plan_id, body.referral_id, body.discount_percent)
        .await?;
    Ok(Json(ApiOk { data: plan }))
}

pub async fn remove_package(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<ApiOk<RemovedPackage>>, ApiError> {
    auth.require_staff()?;
    let removed = state.booking.remove_package(plan_id).await?;
    Ok(Json(ApiOk {
        data: RemovedPackage {
            treatment_plan_id: plan_id,
            appointments_removed: removed,
        },
    }))
}
