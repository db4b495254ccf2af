//! Persistence seams. Each entity has its own repository trait; a
//! [`UnitOfWork`] bundles them over one transaction and is rolled back when
//! dropped without [`UnitOfWork::commit`].

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::booking::{BookingResult, GroupScope};
use crate::models::{
    Appointment, AppointmentRequest, NewAppointment, NewAppointmentRequest, NewPatient,
    NewReferral, NewTemplate, NewTimeBlock, NewTreatmentPlan, Patient, Referral, Schedule,
    SlotView, SuperTreatmentPlan, Therapist, TimeBlock, TreatmentPlan,
};

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> BookingResult<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait PatientRepository {
    async fn find_patient(&mut self, patient_id: Uuid) -> BookingResult<Option<Patient>>;
    async fn find_patient_by_phone(&mut self, phone: &str) -> BookingResult<Option<Patient>>;
    async fn insert_patient(&mut self, new: NewPatient) -> BookingResult<Patient>;
    /// Sets `is_verified` and spends the code.
    async fn mark_patient_verified(&mut self, patient_id: Uuid) -> BookingResult<()>;
    /// Stores the failed-attempt count; `clear_code` empties the stored code.
    async fn record_otp_failure(&mut self, patient_id: Uuid, attempts: i32, clear_code: bool) -> BookingResult<()>;
}

#[async_trait]
pub trait ScheduleRepository {
    async fn find_therapist(&mut self, therapist_id: Uuid) -> BookingResult<Option<Therapist>>;
    /// Returns the therapist's schedule, creating it on first access.
    async fn schedule_for(&mut self, therapist: &Therapist) -> BookingResult<Schedule>;
    async fn find_slot(&mut self, schedule_id: Uuid, date_time: &str) -> BookingResult<Option<TimeBlock>>;
    async fn find_time_block(&mut self, time_block_id: Uuid) -> BookingResult<Option<TimeBlock>>;
    /// Blocks with `from <= slot_at < until`, ordered by `slot_at`.
    async fn list_slots(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> BookingResult<Vec<SlotView>>;
    /// Fails with `Conflict` when `(schedule_id, date_time)` already exists.
    async fn insert_time_block(&mut self, new: NewTimeBlock) -> BookingResult<TimeBlock>;
    /// Deletes the block and its appointment. Returns whether a row existed.
    async fn delete_time_block(&mut self, time_block_id: Uuid) -> BookingResult<bool>;
}

#[async_trait]
pub trait RequestRepository {
    async fn insert_request(&mut self, new: NewAppointmentRequest) -> BookingResult<AppointmentRequest>;
    async fn find_request(&mut self, request_id: Uuid) -> BookingResult<Option<AppointmentRequest>>;
    async fn delete_request(&mut self, request_id: Uuid) -> BookingResult<bool>;
    async fn pending_request_exists(&mut self, therapist_id: Uuid, date_time: &str) -> BookingResult<bool>;
    /// Every pending request in scope, oldest slot first.
    async fn list_pending_requests(&mut self, scope: GroupScope) -> BookingResult<Vec<AppointmentRequest>>;
    /// Pending requests plus appointments held by the patient on `day`.
    async fn count_patient_bookings_on(&mut self, patient_id: Uuid, day: NaiveDate) -> BookingResult<i64>;
    async fn requests_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<AppointmentRequest>>;
}

#[async_trait]
pub trait AppointmentRepository {
    async fn insert_appointment(&mut self, time_block_id: Uuid, new: NewAppointment) -> BookingResult<Appointment>;
    async fn find_appointment(&mut self, appointment_id: Uuid) -> BookingResult<Option<Appointment>>;
    async fn find_appointment_by_block(&mut self, time_block_id: Uuid) -> BookingResult<Option<Appointment>>;
    async fn set_appointment_plan(&mut self, appointment_id: Uuid, plan_id: Uuid) -> BookingResult<()>;
    async fn set_appointment_completed(&mut self, appointment_id: Uuid, completed: bool) -> BookingResult<()>;
    async fn set_reminder_sent(&mut self, appointment_id: Uuid) -> BookingResult<()>;
    async fn appointments_for_plan(&mut self, plan_id: Uuid) -> BookingResult<Vec<Appointment>>;
    async fn appointments_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<Appointment>>;
    async fn list_unassigned(&mut self, scope: GroupScope) -> BookingResult<Vec<Appointment>>;
    /// Not completed, reminder not sent, `from <= slot_at <= until`.
    async fn reminder_candidates(
        &mut self,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> BookingResult<Vec<Appointment>>;
}

#[async_trait]
pub trait PlanRepository {
    async fn find_template(&mut self, template_id: Uuid) -> BookingResult<Option<SuperTreatmentPlan>>;
    async fn insert_template(&mut self, new: NewTemplate) -> BookingResult<SuperTreatmentPlan>;
    async fn list_templates(&mut self, scope: GroupScope) -> BookingResult<Vec<SuperTreatmentPlan>>;
    async fn find_referral(&mut self, referral_id: Uuid) -> BookingResult<Option<Referral>>;
    async fn insert_referral(&mut self, new: NewReferral) -> BookingResult<Referral>;
    async fn list_referrals(&mut self, scope: GroupScope) -> BookingResult<Vec<Referral>>;
    async fn insert_plan(&mut self, new: NewTreatmentPlan) -> BookingResult<TreatmentPlan>;
    async fn find_plan(&mut self, plan_id: Uuid) -> BookingResult<Option<TreatmentPlan>>;
    async fn update_plan_remaining(&mut self, plan_id: Uuid, remaining: i32) -> BookingResult<()>;
    async fn update_plan_payment(
        &mut self,
        plan_id: Uuid,
        is_paid: bool,
        payment_method: Option<String>,
    ) -> BookingResult<()>;
    async fn update_plan_pricing(
        &mut self,
        plan_id: Uuid,
        referral_id: Option<Uuid>,
        discount_percent: f64,
        total_price_cents: i64,
        referral_cashback_cents: i64,
    ) -> BookingResult<()>;
    async fn plans_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<TreatmentPlan>>;
    async fn delete_plan(&mut self, plan_id: Uuid) -> BookingResult<bool>;
}

#[async_trait]
pub trait DeviceTokenRepository {
    /// Push tokens of every active staff user visible in `scope`.
    async fn staff_device_tokens(&mut self, scope: GroupScope) -> BookingResult<Vec<String>>;
}

#[async_trait]
pub trait UnitOfWork:
    PatientRepository
    + ScheduleRepository
    + RequestRepository
    + AppointmentRepository
    + PlanRepository
    + DeviceTokenRepository
    + Send
{
    async fn commit(self: Box<Self>) -> BookingResult<()>;
}
