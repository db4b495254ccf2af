// src/routes/catalog_routes.rs

use axum::{extract::State, routing::get, Json, Router};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, NewReferral, NewTemplate, Referral, SuperTreatmentPlan},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/treatments", get(list_treatments).post(create_treatment))
        .route("/referrals", get(list_referrals).post(create_referral))
}

pub async fn list_treatments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<SuperTreatmentPlan>>>, ApiError> {
    let caller = auth.require_staff()?;
    let rows = state.booking.list_templates(caller).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn create_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<NewTemplate>,
) -> Result<Json<ApiOk<SuperTreatmentPlan>>, ApiError> {
    let caller = auth.require_staff()?;
    let template = state.booking.add_template(body, caller).await?;
    Ok(Json(ApiOk { data: template }))
}

pub async fn list_referrals(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Referral>>>, ApiError> {
    let caller = auth.require_staff()?;
    let rows = state.booking.list_referrals(caller).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn create_referral(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<NewReferral>,
) -> Result<Json<ApiOk<Referral>>, ApiError> {
    let caller = auth.require_staff()?;
    let referral = state.booking.add_referral(body, caller).await?;
    Ok(Json(ApiOk { data: referral }))
}
