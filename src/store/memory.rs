// src/store/memory.rs
//
// In-process store used by the test suite, built with `cfg(test)` or the
// `test-util` feature. A unit of work holds the store lock for its whole
// lifetime and edits a private copy of the state; commit writes the copy
// back, drop discards it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    AppointmentRepository, BookingStore, DeviceTokenRepository, PatientRepository,
    PlanRepository, RequestRepository, ScheduleRepository, UnitOfWork,
};
use crate::booking::{BookingError, BookingResult, GroupScope};
use crate::models::{
    Appointment, AppointmentRequest, NewAppointment, NewAppointmentRequest, NewPatient,
    NewReferral, NewTemplate, NewTimeBlock, NewTreatmentPlan, Patient, Referral, Schedule,
    SlotView, SuperTreatmentPlan, Therapist, TimeBlock, TreatmentPlan,
};

#[derive(Debug, Clone)]
pub struct StaffDevice {
    pub value: String,
    pub clinic_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct MemState {
    pub patients: HashMap<Uuid, Patient>,
    pub therapists: HashMap<Uuid, Therapist>,
    pub schedules: HashMap<Uuid, Schedule>,
    pub time_blocks: HashMap<Uuid, TimeBlock>,
    pub requests: HashMap<Uuid, AppointmentRequest>,
    pub appointments: HashMap<Uuid, Appointment>,
    pub templates: HashMap<Uuid, SuperTreatmentPlan>,
    pub referrals: HashMap<Uuid, Referral>,
    pub plans: HashMap<Uuid, TreatmentPlan>,
    pub staff_devices: Vec<StaffDevice>,
}

impl MemState {
    pub fn blocks_on(&self, schedule_id: Uuid) -> Vec<&TimeBlock> {
        let mut out: Vec<&TimeBlock> = self
            .time_blocks
            .values()
            .filter(|b| b.schedule_id == schedule_id)
            .collect();
        out.sort_by(|a, b| a.slot_at.cmp(&b.slot_at).then_with(|| a.date_time.cmp(&b.date_time)));
        out
    }

    pub fn schedule_of(&self, therapist_id: Uuid) -> Option<&Schedule> {
        self.schedules.values().find(|s| s.therapist_id == therapist_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
    faults: Arc<std::sync::Mutex<HashSet<&'static str>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call to the repository method named `op` fail with
    /// a storage error. `"commit"` targets the commit itself.
    pub fn fail_on(&self, op: &'static str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// Committed state as seen by a fresh unit of work.
    pub async fn snapshot(&self) -> MemState {
        self.state.lock().await.clone()
    }

    pub async fn seed_therapist(&self, name: &str, clinic_group_id: Option<Uuid>) -> Therapist {
        let therapist = Therapist {
            therapist_id: Uuid::new_v4(),
            user_id: None,
            name: name.to_string(),
            phone: None,
            clinic_group_id,
        };
        self.state
            .lock()
            .await
            .therapists
            .insert(therapist.therapist_id, therapist.clone());
        therapist
    }

    pub async fn seed_patient(&self, name: &str, phone: &str, is_verified: bool) -> Patient {
        let patient = Patient {
            patient_id: Uuid::new_v4(),
            name: name.to_string(),
            phone: phone.to_string(),
            otp: "000000".to_string(),
            otp_attempts: 0,
            is_verified,
            clinic_group_id: None,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .patients
            .insert(patient.patient_id, patient.clone());
        patient
    }

    pub async fn seed_template(
        &self,
        description: &str,
        sessions_count: i32,
        price_cents: i64,
    ) -> SuperTreatmentPlan {
        let template = SuperTreatmentPlan {
            super_treatment_plan_id: Uuid::new_v4(),
            description: description.to_string(),
            sessions_count,
            price_cents,
            clinic_group_id: None,
        };
        self.state
            .lock()
            .await
            .templates
            .insert(template.super_treatment_plan_id, template.clone());
        template
    }

    pub async fn seed_referral(&self, name: &str, cashback_percent: f64) -> Referral {
        let referral = Referral {
            referral_id: Uuid::new_v4(),
            name: name.to_string(),
            cashback_percent,
            clinic_group_id: None,
        };
        self.state
            .lock()
            .await
            .referrals
            .insert(referral.referral_id, referral.clone());
        referral
    }

    pub async fn seed_staff_device(&self, value: &str, clinic_group_id: Option<Uuid>) {
        self.state.lock().await.staff_devices.push(StaffDevice {
            value: value.to_string(),
            clinic_group_id,
        });
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> BookingResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            work,
            faults: self.faults.clone(),
        }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemState>,
    work: MemState,
    faults: Arc<std::sync::Mutex<HashSet<&'static str>>>,
}

impl MemoryUnitOfWork {
    fn check(&self, op: &'static str) -> BookingResult<()> {
        let injected = self
            .faults
            .lock()
            .map(|f| f.contains(op))
            .unwrap_or(false);
        if injected {
            return Err(BookingError::Storage(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> BookingResult<()> {
        self.check("commit")?;
        let MemoryUnitOfWork {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl PatientRepository for MemoryUnitOfWork {
    async fn find_patient(&mut self, patient_id: Uuid) -> BookingResult<Option<Patient>> {
        self.check("find_patient")?;
        Ok(self.work.patients.get(&patient_id).cloned())
    }

    async fn find_patient_by_phone(&mut self, phone: &str) -> BookingResult<Option<Patient>> {
        self.check("find_patient_by_phone")?;
        Ok(self.work.patients.values().find(|p| p.phone == phone).cloned())
    }

    async fn insert_patient(&mut self, new: NewPatient) -> BookingResult<Patient> {
        self.check("insert_patient")?;
        if self.work.patients.values().any(|p| p.phone == new.phone) {
            return Err(BookingError::conflict("patient phone already registered"));
        }
        let patient = Patient {
            patient_id: Uuid::new_v4(),
            name: new.name,
            phone: new.phone,
            otp: new.otp,
            otp_attempts: 0,
            is_verified: new.is_verified,
            clinic_group_id: new.clinic_group_id,
            created_at: Utc::now(),
        };
        self.work.patients.insert(patient.patient_id, patient.clone());
        Ok(patient)
    }

    async fn mark_patient_verified(&mut self, patient_id: Uuid) -> BookingResult<()> {
        self.check("mark_patient_verified")?;
        if let Some(p) = self.work.patients.get_mut(&patient_id) {
            p.is_verified = true;
            p.otp.clear();
            p.otp_attempts = 0;
        }
        Ok(())
    }

    async fn record_otp_failure(&mut self, patient_id: Uuid, attempts: i32, clear_code: bool) -> BookingResult<()> {
        self.check("record_otp_failure")?;
        if let Some(p) = self.work.patients.get_mut(&patient_id) {
            p.otp_attempts = attempts;
            if clear_code {
                p.otp.clear();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for MemoryUnitOfWork {
    async fn find_therapist(&mut self, therapist_id: Uuid) -> BookingResult<Option<Therapist>> {
        self.check("find_therapist")?;
        Ok(self.work.therapists.get(&therapist_id).cloned())
    }

    async fn schedule_for(&mut self, therapist: &Therapist) -> BookingResult<Schedule> {
        self.check("schedule_for")?;
        if let Some(s) = self.work.schedule_of(therapist.therapist_id) {
            return Ok(s.clone());
        }
        let schedule = Schedule {
            schedule_id: Uuid::new_v4(),
            therapist_id: therapist.therapist_id,
        };
        self.work.schedules.insert(schedule.schedule_id, schedule.clone());
        Ok(schedule)
    }

    async fn find_slot(&mut self, schedule_id: Uuid, date_time: &str) -> BookingResult<Option<TimeBlock>> {
        self.check("find_slot")?;
        Ok(self
            .work
            .time_blocks
            .values()
            .find(|b| b.schedule_id == schedule_id && b.date_time == date_time)
            .cloned())
    }

    async fn find_time_block(&mut self, time_block_id: Uuid) -> BookingResult<Option<TimeBlock>> {
        self.check("find_time_block")?;
        Ok(self.work.time_blocks.get(&time_block_id).cloned())
    }

    async fn list_slots(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> BookingResult<Vec<SlotView>> {
        self.check("list_slots")?;
        Ok(self
            .work
            .blocks_on(schedule_id)
            .into_iter()
            .filter(|b| b.slot_at >= from && b.slot_at < until)
            .map(|b| SlotView {
                block: b.clone(),
                appointment: self
                    .work
                    .appointments
                    .values()
                    .find(|a| a.time_block_id == b.time_block_id)
                    .cloned(),
            })
            .collect())
    }

    async fn insert_time_block(&mut self, new: NewTimeBlock) -> BookingResult<TimeBlock> {
        self.check("insert_time_block")?;
        let taken = self
            .work
            .time_blocks
            .values()
            .any(|b| b.schedule_id == new.schedule_id && b.date_time == new.date_time.as_str());
        if taken {
            return Err(BookingError::conflict(format!(
                "time block already exists for {}",
                new.date_time
            )));
        }
        let block = TimeBlock {
            time_block_id: Uuid::new_v4(),
            schedule_id: new.schedule_id,
            slot_at: new.date_time.at(),
            date_time: new.date_time.into_string(),
            is_available: new.is_available,
            clinic_group_id: new.clinic_group_id,
        };
        self.work.time_blocks.insert(block.time_block_id, block.clone());
        Ok(block)
    }

    async fn delete_time_block(&mut self, time_block_id: Uuid) -> BookingResult<bool> {
        self.check("delete_time_block")?;
        let existed = self.work.time_blocks.remove(&time_block_id).is_some();
        self.work
            .appointments
            .retain(|_, a| a.time_block_id != time_block_id);
        Ok(existed)
    }
}

#[async_trait]
impl RequestRepository for MemoryUnitOfWork {
    async fn insert_request(&mut self, new: NewAppointmentRequest) -> BookingResult<AppointmentRequest> {
        self.check("insert_request")?;
        if self
            .work
            .requests
            .values()
            .any(|r| r.therapist_id == new.therapist_id && r.date_time == new.date_time.as_str())
        {
            return Err(BookingError::conflict(format!(
                "the slot {} already has a pending request",
                new.date_time
            )));
        }
        let request = AppointmentRequest {
            request_id: Uuid::new_v4(),
            slot_at: new.date_time.at(),
            date_time: new.date_time.into_string(),
            therapist_id: new.therapist_id,
            therapist_name: new.therapist_name,
            patient_id: new.patient_id,
            patient_name: new.patient_name,
            phone_number: new.phone_number,
            super_treatment_plan_description: new.super_treatment_plan_description,
            clinic_group_id: new.clinic_group_id,
            created_at: Utc::now(),
        };
        self.work.requests.insert(request.request_id, request.clone());
        Ok(request)
    }

    async fn find_request(&mut self, request_id: Uuid) -> BookingResult<Option<AppointmentRequest>> {
        self.check("find_request")?;
        Ok(self.work.requests.get(&request_id).cloned())
    }

    async fn delete_request(&mut self, request_id: Uuid) -> BookingResult<bool> {
        self.check("delete_request")?;
        Ok(self.work.requests.remove(&request_id).is_some())
    }

    async fn pending_request_exists(&mut self, therapist_id: Uuid, date_time: &str) -> BookingResult<bool> {
        self.check("pending_request_exists")?;
        Ok(self
            .work
            .requests
            .values()
            .any(|r| r.therapist_id == therapist_id && r.date_time == date_time))
    }

    async fn list_pending_requests(&mut self, scope: GroupScope) -> BookingResult<Vec<AppointmentRequest>> {
        self.check("list_pending_requests")?;
        let mut out: Vec<AppointmentRequest> = self
            .work
            .requests
            .values()
            .filter(|r| scope.admits(r.clinic_group_id))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.slot_at);
        Ok(out)
    }

    async fn count_patient_bookings_on(&mut self, patient_id: Uuid, day: NaiveDate) -> BookingResult<i64> {
        self.check("count_patient_bookings_on")?;
        let requests = self
            .work
            .requests
            .values()
            .filter(|r| r.patient_id == patient_id && r.slot_at.date() == day)
            .count();
        let appointments = self
            .work
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id && a.slot_at.date() == day)
            .count();
        Ok((requests + appointments) as i64)
    }

    async fn requests_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<AppointmentRequest>> {
        self.check("requests_for_patient")?;
        let mut out: Vec<AppointmentRequest> = self
            .work
            .requests
            .values()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.slot_at);
        Ok(out)
    }
}

#[async_trait]
impl AppointmentRepository for MemoryUnitOfWork {
    async fn insert_appointment(&mut self, time_block_id: Uuid, new: NewAppointment) -> BookingResult<Appointment> {
        self.check("insert_appointment")?;
        if !self.work.time_blocks.contains_key(&time_block_id) {
            return Err(BookingError::not_found("time block not found"));
        }
        if self
            .work
            .appointments
            .values()
            .any(|a| a.time_block_id == time_block_id)
        {
            return Err(BookingError::conflict("time block already has an appointment"));
        }
        let appointment = Appointment {
            appointment_id: Uuid::new_v4(),
            time_block_id,
            slot_at: new.date_time.at(),
            date_time: new.date_time.into_string(),
            therapist_id: new.therapist_id,
            therapist_name: new.therapist_name,
            patient_id: new.patient_id,
            patient_name: new.patient_name,
            price_cents: new.price_cents,
            is_completed: false,
            is_paid: new.is_paid,
            payment_method: new.payment_method,
            notes: new.notes,
            treatment_plan_id: None,
            reminder_sent: new.reminder_sent,
            clinic_group_id: new.clinic_group_id,
            created_at: Utc::now(),
        };
        self.work
            .appointments
            .insert(appointment.appointment_id, appointment.clone());
        Ok(appointment)
    }

    async fn find_appointment(&mut self, appointment_id: Uuid) -> BookingResult<Option<Appointment>> {
        self.check("find_appointment")?;
        Ok(self.work.appointments.get(&appointment_id).cloned())
    }

    async fn find_appointment_by_block(&mut self, time_block_id: Uuid) -> BookingResult<Option<Appointment>> {
        self.check("find_appointment_by_block")?;
        Ok(self
            .work
            .appointments
            .values()
            .find(|a| a.time_block_id == time_block_id)
            .cloned())
    }

    async fn set_appointment_plan(&mut self, appointment_id: Uuid, plan_id: Uuid) -> BookingResult<()> {
        self.check("set_appointment_plan")?;
        if let Some(a) = self.work.appointments.get_mut(&appointment_id) {
            a.treatment_plan_id = Some(plan_id);
        }
        Ok(())
    }

    async fn set_appointment_completed(&mut self, appointment_id: Uuid, completed: bool) -> BookingResult<()> {
        self.check("set_appointment_completed")?;
        if let Some(a) = self.work.appointments.get_mut(&appointment_id) {
            a.is_completed = completed;
        }
        Ok(())
    }

    async fn set_reminder_sent(&mut self, appointment_id: Uuid) -> BookingResult<()> {
        self.check("set_reminder_sent")?;
        if let Some(a) = self.work.appointments.get_mut(&appointment_id) {
            a.reminder_sent = true;
        }
        Ok(())
    }

    async fn appointments_for_plan(&mut self, plan_id: Uuid) -> BookingResult<Vec<Appointment>> {
        self.check("appointments_for_plan")?;
        let mut out: Vec<Appointment> = self
            .work
            .appointments
            .values()
            .filter(|a| a.treatment_plan_id == Some(plan_id))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.slot_at);
        Ok(out)
    }

    async fn appointments_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<Appointment>> {
        self.check("appointments_for_patient")?;
        let mut out: Vec<Appointment> = self
            .work
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.slot_at);
        Ok(out)
    }

    async fn list_unassigned(&mut self, scope: GroupScope) -> BookingResult<Vec<Appointment>> {
        self.check("list_unassigned")?;
        let mut out: Vec<Appointment> = self
            .work
            .appointments
            .values()
            .filter(|a| a.treatment_plan_id.is_none() && scope.admits(a.clinic_group_id))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.slot_at);
        Ok(out)
    }

    async fn reminder_candidates(
        &mut self,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> BookingResult<Vec<Appointment>> {
        self.check("reminder_candidates")?;
        let mut out: Vec<Appointment> = self
            .work
            .appointments
            .values()
            .filter(|a| !a.is_completed && !a.reminder_sent)
            .filter(|a| a.slot_at >= from && a.slot_at <= until)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.slot_at);
        Ok(out)
    }
}

#[async_trait]
impl PlanRepository for MemoryUnitOfWork {
    async fn find_template(&mut self, template_id: Uuid) -> BookingResult<Option<SuperTreatmentPlan>> {
        self.check("find_template")?;
        Ok(self.work.templates.get(&template_id).cloned())
    }

    async fn insert_template(&mut self, new: NewTemplate) -> BookingResult<SuperTreatmentPlan> {
        self.check("insert_template")?;
        let template = SuperTreatmentPlan {
            super_treatment_plan_id: Uuid::new_v4(),
            description: new.description,
            sessions_count: new.sessions_count,
            price_cents: new.price_cents,
            clinic_group_id: new.clinic_group_id,
        };
        self.work
            .templates
            .insert(template.super_treatment_plan_id, template.clone());
        Ok(template)
    }

    async fn list_templates(&mut self, scope: GroupScope) -> BookingResult<Vec<SuperTreatmentPlan>> {
        self.check("list_templates")?;
        let mut out: Vec<SuperTreatmentPlan> = self
            .work
            .templates
            .values()
            .filter(|t| scope.admits(t.clinic_group_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.description.cmp(&b.description));
        Ok(out)
    }

    async fn find_referral(&mut self, referral_id: Uuid) -> BookingResult<Option<Referral>> {
        self.check("find_referral")?;
        Ok(self.work.referrals.get(&referral_id).cloned())
    }

    async fn insert_referral(&mut self, new: NewReferral) -> BookingResult<Referral> {
        self.check("insert_referral")?;
        let referral = Referral {
            referral_id: Uuid::new_v4(),
            name: new.name,
            cashback_percent: new.cashback_percent,
            clinic_group_id: new.clinic_group_id,
        };
        self.work.referrals.insert(referral.referral_id, referral.clone());
        Ok(referral)
    }

    async fn list_referrals(&mut self, scope: GroupScope) -> BookingResult<Vec<Referral>> {
        self.check("list_referrals")?;
        let mut out: Vec<Referral> = self
            .work
            .referrals
            .values()
            .filter(|r| scope.admits(r.clinic_group_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn insert_plan(&mut self, new: NewTreatmentPlan) -> BookingResult<TreatmentPlan> {
        self.check("insert_plan")?;
        let plan = TreatmentPlan {
            treatment_plan_id: Uuid::new_v4(),
            super_treatment_plan_id: new.super_treatment_plan_id,
            patient_id: new.patient_id,
            remaining: new.remaining,
            discount_percent: new.discount_percent,
            total_price_cents: new.total_price_cents,
            referral_id: new.referral_id,
            referral_cashback_cents: new.referral_cashback_cents,
            is_paid: false,
            payment_method: None,
            clinic_group_id: new.clinic_group_id,
            created_at: Utc::now(),
        };
        self.work.plans.insert(plan.treatment_plan_id, plan.clone());
        Ok(plan)
    }

    async fn find_plan(&mut self, plan_id: Uuid) -> BookingResult<Option<TreatmentPlan>> {
        self.check("find_plan")?;
        Ok(self.work.plans.get(&plan_id).cloned())
    }

    async fn update_plan_remaining(&mut self, plan_id: Uuid, remaining: i32) -> BookingResult<()> {
        self.check("update_plan_remaining")?;
        if let Some(p) = self.work.plans.get_mut(&plan_id) {
            p.remaining = remaining;
        }
        Ok(())
    }

    async fn update_plan_payment(
        &mut self,
        plan_id: Uuid,
        is_paid: bool,
        payment_method: Option<String>,
    ) -> BookingResult<()> {
        self.check("update_plan_payment")?;
        if let Some(p) = self.work.plans.get_mut(&plan_id) {
            p.is_paid = is_paid;
            p.payment_method = payment_method;
        }
        Ok(())
    }

    async fn update_plan_pricing(
        &mut self,
        plan_id: Uuid,
        referral_id: Option<Uuid>,
        discount_percent: f64,
        total_price_cents: i64,
        referral_cashback_cents: i64,
    ) -> BookingResult<()> {
        self.check("update_plan_pricing")?;
        if let Some(p) = self.work.plans.get_mut(&plan_id) {
            p.referral_id = referral_id;
            p.discount_percent = discount_percent;
            p.total_price_cents = total_price_cents;
            p.referral_cashback_cents = referral_cashback_cents;
        }
        Ok(())
    }

    async fn plans_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<TreatmentPlan>> {
        self.check("plans_for_patient")?;
        let mut out: Vec<TreatmentPlan> = self
            .work
            .plans
            .values()
            .filter(|p| p.patient_id == patient_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.created_at);
        Ok(out)
    }

    async fn delete_plan(&mut self, plan_id: Uuid) -> BookingResult<bool> {
        self.check("delete_plan")?;
        let existed = self.work.plans.remove(&plan_id).is_some();
        for a in self.work.appointments.values_mut() {
            if a.treatment_plan_id == Some(plan_id) {
                a.treatment_plan_id = None;
            }
        }
        Ok(existed)
    }
}

#[async_trait]
impl DeviceTokenRepository for MemoryUnitOfWork {
    async fn staff_device_tokens(&mut self, scope: GroupScope) -> BookingResult<Vec<String>> {
        self.check("staff_device_tokens")?;
        let mut out: Vec<String> = self
            .work
            .staff_devices
            .iter()
            .filter(|d| scope.admits(d.clinic_group_id))
            .map(|d| d.value.clone())
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}
