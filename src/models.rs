use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::booking::{BookingService, SlotDateTime};
use crate::notify::LiveRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub booking: Arc<BookingService>,
    pub live: Arc<LiveRegistry>,
}

/* -------------------------
   API envelopes
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub patient_id: Uuid,
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub otp: String,
    #[serde(skip_serializing)]
    pub otp_attempts: i32,
    pub is_verified: bool,
    pub clinic_group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Therapist {
    pub therapist_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub phone: Option<String>,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub schedule_id: Uuid,
    pub therapist_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeBlock {
    pub time_block_id: Uuid,
    pub schedule_id: Uuid,
    pub date_time: String,
    #[serde(skip_serializing)]
    pub slot_at: NaiveDateTime,
    pub is_available: bool,
    pub clinic_group_id: Option<Uuid>,
}

/// A time block together with its booked appointment, if any.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub block: TimeBlock,
    pub appointment: Option<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AppointmentRequest {
    pub request_id: Uuid,
    pub date_time: String,
    #[serde(skip_serializing)]
    pub slot_at: NaiveDateTime,
    pub therapist_id: Uuid,
    pub therapist_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub phone_number: String,
    pub super_treatment_plan_description: Option<String>,
    pub clinic_group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub time_block_id: Uuid,
    pub date_time: String,
    #[serde(skip_serializing)]
    pub slot_at: NaiveDateTime,
    pub therapist_id: Uuid,
    pub therapist_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub price_cents: i64,
    pub is_completed: bool,
    pub is_paid: bool,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub treatment_plan_id: Option<Uuid>,
    pub reminder_sent: bool,
    pub clinic_group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Catalogue template a package is bought from.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SuperTreatmentPlan {
    pub super_treatment_plan_id: Uuid,
    pub description: String,
    pub sessions_count: i32,
    pub price_cents: i64,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Referral {
    pub referral_id: Uuid,
    pub name: String,
    pub cashback_percent: f64,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TreatmentPlan {
    pub treatment_plan_id: Uuid,
    pub super_treatment_plan_id: Uuid,
    pub patient_id: Uuid,
    pub remaining: i32,
    pub discount_percent: f64,
    pub total_price_cents: i64,
    pub referral_id: Option<Uuid>,
    pub referral_cashback_cents: i64,
    pub is_paid: bool,
    pub payment_method: Option<String>,
    pub clinic_group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/* -------------------------
   Insert models
--------------------------*/

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub phone: String,
    pub otp: String,
    pub is_verified: bool,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewTimeBlock {
    pub schedule_id: Uuid,
    pub date_time: SlotDateTime,
    pub is_available: bool,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewAppointmentRequest {
    pub date_time: SlotDateTime,
    pub therapist_id: Uuid,
    pub therapist_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub phone_number: String,
    pub super_treatment_plan_description: Option<String>,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub date_time: SlotDateTime,
    pub therapist_id: Uuid,
    pub therapist_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub price_cents: i64,
    pub is_paid: bool,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub reminder_sent: bool,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewTreatmentPlan {
    pub super_treatment_plan_id: Uuid,
    pub patient_id: Uuid,
    pub remaining: i32,
    pub discount_percent: f64,
    pub total_price_cents: i64,
    pub referral_id: Option<Uuid>,
    pub referral_cashback_cents: i64,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub description: String,
    pub sessions_count: i32,
    pub price_cents: i64,
    #[serde(default)]
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReferral {
    pub name: String,
    pub cashback_percent: f64,
    #[serde(default)]
    pub clinic_group_id: Option<Uuid>,
}

/* -------------------------
   Helpers
--------------------------*/

/// Role mapping of `app_user.roles`:
/// 0 patient, 1 admin, 2 manager, 3 therapist, 4 secretary
pub fn role_is_staff(role: i16) -> bool {
    matches!(role, 1..=4)
}
