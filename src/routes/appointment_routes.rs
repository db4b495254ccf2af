// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    booking::service::{AcceptExtras, AcceptedAppointment, PackageSelection, RegisteredPackage, SubmitRequest},
    error::ApiError,
    middleware::auth_context::{caller_of, AuthContext},
    models::{ApiOk, AppState, Appointment, AppointmentRequest, Patient, TreatmentPlan},
};

/*
Request lifecycle:
  submit (public) -> [verify phone] -> accept | reject (staff)
An accepted request becomes an appointment on a reserved time block.
*/

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests", post(submit_request).get(list_requests))
        .route("/requests/{request_id}/verify", post(verify_request))
        .route("/requests/{request_id}/accept", post(accept_request))
        .route("/requests/{request_id}/reject", post(reject_request))
        .route("/appointments/unassigned", get(list_unassigned))
        .route("/appointments/{appointment_id}/package", post(register_package))
        .route(
            "/appointments/{appointment_id}/complete",
            post(mark_completed).delete(unmark_completed),
        )
        .route("/time_blocks/{time_block_id}", delete(remove_appointment))
}

/* -------------------------
   DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct RemovedBlock {
    pub time_block_id: Uuid,
    pub appointment: Option<Appointment>,
}

/* -------------------------
   Requests
--------------------------*/

pub async fn submit_request(
    State(state): State<AppState>,
    auth: Option<AuthContext>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<ApiOk<AppointmentRequest>>, ApiError> {
    let caller = caller_of(auth.as_ref());
    let request = state.booking.submit_request(body, caller).await?;
    Ok(Json(ApiOk { data: request }))
}

pub async fn verify_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<ApiOk<Patient>>, ApiError> {
    let patient = state
        .booking
        .verify_patient_phone(request_id, &body.otp)
        .await?;
    Ok(Json(ApiOk { data: patient }))
}

pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentRequest>>>, ApiError> {
    let caller = auth.require_staff()?;
    let rows = state.booking.list_pending_requests(caller).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn accept_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
    body: Option<Json<AcceptExtras>>,
) -> Result<Json<ApiOk<AcceptedAppointment>>, ApiError> {
    auth.require_staff()?;
    let extras = body.map(|Json(b)| b).unwrap_or_default();
    let accepted = state.booking.accept_request(request_id, extras).await?;
    Ok(Json(ApiOk { data: accepted }))
}

pub async fn reject_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentRequest>>, ApiError> {
    auth.require_staff()?;
    let request = state.booking.reject_request(request_id).await?;
    Ok(Json(ApiOk { data: request }))
}

/* -------------------------
   Appointments
--------------------------*/

pub async fn list_unassigned(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let caller = auth.require_staff()?;
    let rows = state.booking.list_unassigned_appointments(caller).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn register_package(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(body): Json<PackageSelection>,
) -> Result<Json<ApiOk<RegisteredPackage>>, ApiError> {
    auth.require_staff()?;
    let registered = state.booking.register_package(appointment_id, body).await?;
    Ok(Json(ApiOk { data: registered }))
}

pub async fn mark_completed(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<TreatmentPlan>>, ApiError> {
    auth.require_staff()?;
    let plan = state.booking.mark_completed(appointment_id).await?;
    Ok(Json(ApiOk { data: plan }))
}

pub async fn unmark_completed(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<TreatmentPlan>>, ApiError> {
    auth.require_staff()?;
    let plan = state.booking.unmark_completed(appointment_id).await?;
    Ok(Json(ApiOk { data: plan }))
}

pub async fn remove_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(time_block_id): Path<Uuid>,
) -> Result<Json<ApiOk<RemovedBlock>>, ApiError> {
    auth.require_staff()?;
    let appointment = state.booking.remove_appointment(time_block_id).await?;
    Ok(Json(ApiOk {
        data: RemovedBlock {
            time_block_id,
            appointment,
        },
    }))
}
