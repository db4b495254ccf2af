// src/booking/service.rs

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::datetime::resolve_range;
use super::phone::normalize_phone;
use super::{ledger, slots, BookingError, BookingResult, Caller, Clock, GroupScope, SlotDateTime};
use crate::models::{
    Appointment, AppointmentRequest, NewAppointment, NewAppointmentRequest, NewPatient,
    NewReferral, NewTemplate, Patient, Referral, SlotView, SuperTreatmentPlan, TimeBlock,
    TreatmentPlan,
};
use crate::notify::{templates, ChangeNotifier};
use crate::store::{
    AppointmentRepository, BookingStore, DeviceTokenRepository, PatientRepository,
    PlanRepository, RequestRepository, ScheduleRepository, UnitOfWork,
};

/* -------------------------
   Inputs
--------------------------*/

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub date_time: String,
    pub therapist_id: Uuid,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub is_existing: bool,
    /// Staff only: book for a known patient without phone matching.
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub super_treatment_plan_description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptExtras {
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Either an existing package, or a template to buy a new one from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageSelection {
    #[serde(default)]
    pub treatment_plan_id: Option<Uuid>,
    #[serde(default)]
    pub super_treatment_plan_id: Option<Uuid>,
    #[serde(default)]
    pub discount_percent: f64,
    #[serde(default)]
    pub referral_id: Option<Uuid>,
}

/* -------------------------
   Outputs
--------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedAppointment {
    pub time_block: TimeBlock,
    pub appointment: Appointment,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredPackage {
    pub plan: TreatmentPlan,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientBookings {
    pub requests: Vec<AppointmentRequest>,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TherapistSchedule {
    pub schedule_id: Uuid,
    pub therapist_id: Uuid,
    pub therapist_name: String,
    pub slots: Vec<SlotView>,
}

const OTP_LENGTH: usize = 6;
pub const MAX_OTP_ATTEMPTS: i32 = 5;

fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Drives requests, appointments and packages through their transitions.
/// Each operation is one unit of work; notifications go out after commit.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
    horizon: Duration,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: ChangeNotifier,
        clock: Arc<dyn Clock>,
        horizon_days: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            horizon: Duration::try_days(horizon_days).unwrap_or(Duration::MAX),
        }
    }

    async fn begin(&self) -> BookingResult<Box<dyn UnitOfWork>> {
        self.store.begin().await
    }

    /* -------------------------
       Requests
    --------------------------*/

    pub async fn submit_request(
        &self,
        input: SubmitRequest,
        caller: Caller,
    ) -> BookingResult<AppointmentRequest> {
        let date_time = SlotDateTime::parse(&input.date_time)?;
        let staff_patient = input.patient_id.filter(|_| caller.is_staff);
        let phone = match staff_patient {
            Some(_) => None,
            None => Some(normalize_phone(&input.phone_number)?),
        };

        let mut uow = self.begin().await?;

        let therapist = uow
            .find_therapist(input.therapist_id)
            .await?
            .ok_or_else(|| BookingError::not_found("therapist not found"))?;

        let mut otp_for_new_patient = None;
        let patient = match (staff_patient, phone) {
            (Some(patient_id), _) => uow
                .find_patient(patient_id)
                .await?
                .ok_or_else(|| BookingError::not_found("patient not found"))?,
            (None, Some(phone)) => {
                match (uow.find_patient_by_phone(&phone).await?, input.is_existing) {
                    (Some(existing), true) => existing,
                    (Some(_), false) => {
                        return Err(BookingError::conflict(
                            "phone already registered, request as an existing patient",
                        ));
                    }
                    (None, true) => {
                        return Err(BookingError::not_found(
                            "phone number not registered, register as a new patient",
                        ));
                    }
                    (None, false) => {
                        let name = input.patient_name.trim();
                        if name.is_empty() {
                            return Err(BookingError::validation("patient_name is required"));
                        }
                        let otp = generate_otp();
                        let patient = uow
                            .insert_patient(NewPatient {
                                name: name.to_string(),
                                phone,
                                otp: otp.clone(),
                                is_verified: true,
                                clinic_group_id: caller.clinic_group_id.or(therapist.clinic_group_id),
                            })
                            .await?;
                        if !caller.is_staff {
                            otp_for_new_patient = Some(otp);
                        }
                        patient
                    }
                }
            }
            (None, None) => return Err(BookingError::validation("phone_number is required")),
        };

        let now = self.clock.now();
        let beyond_horizon = now
            .checked_add_signed(self.horizon)
            .is_some_and(|limit| date_time.at() > limit);
        if !caller.is_staff && beyond_horizon {
            return Err(BookingError::policy(format!(
                "cannot book more than {} days ahead",
                self.horizon.num_days()
            )));
        }

        if uow
            .count_patient_bookings_on(patient.patient_id, date_time.day())
            .await?
            > 0
        {
            return Err(BookingError::conflict(
                "patient can only book one appointment per day",
            ));
        }

        let schedule = uow.schedule_for(&therapist).await?;
        slots::ensure_slot_free(uow.as_mut(), schedule.schedule_id, &date_time).await?;
        if uow
            .pending_request_exists(therapist.therapist_id, date_time.as_str())
            .await?
        {
            return Err(BookingError::conflict(format!(
                "the slot {date_time} already has a pending request"
            )));
        }

        let request = uow
            .insert_request(NewAppointmentRequest {
                date_time,
                therapist_id: therapist.therapist_id,
                therapist_name: therapist.name.clone(),
                patient_id: patient.patient_id,
                patient_name: patient.name.clone(),
                phone_number: patient.phone.clone(),
                super_treatment_plan_description: input
                    .super_treatment_plan_description
                    .filter(|d| !d.trim().is_empty()),
                clinic_group_id: therapist.clinic_group_id.or(caller.clinic_group_id),
            })
            .await?;

        uow.commit().await?;
        info!(
            request_id = %request.request_id,
            patient_id = %request.patient_id,
            date_time = %request.date_time,
            "appointment requested"
        );

        if let Some(otp) = otp_for_new_patient {
            self.notifier
                .message_patient(&patient.phone, &format!("Your verification code is: {otp}"))
                .await;
        }
        self.notifier.publish_refresh().await;
        Ok(request)
    }

    /// Confirms the patient's phone with the code they were sent. The code is
    /// spent on success; after `MAX_OTP_ATTEMPTS` wrong guesses it is
    /// discarded and verification stays locked.
    pub async fn verify_patient_phone(&self, request_id: Uuid, otp: &str) -> BookingResult<Patient> {
        let mut uow = self.begin().await?;
        let request = uow
            .find_request(request_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment request not found"))?;
        let mut patient = uow
            .find_patient(request.patient_id)
            .await?
            .ok_or_else(|| BookingError::not_found("patient not found"))?;

        if patient.otp.is_empty() {
            return Err(BookingError::policy("no verification code is outstanding"));
        }
        if patient.otp != otp.trim() {
            let attempts = patient.otp_attempts + 1;
            let locked = attempts >= MAX_OTP_ATTEMPTS;
            uow.record_otp_failure(patient.patient_id, attempts, locked).await?;
            uow.commit().await?;
            warn!(patient_id = %patient.patient_id, attempts, locked, "incorrect verification code");
            return Err(if locked {
                BookingError::policy("too many incorrect codes, verification is locked")
            } else {
                BookingError::validation("incorrect verification code")
            });
        }
        uow.mark_patient_verified(patient.patient_id).await?;
        uow.commit().await?;
        patient.is_verified = true;
        patient.otp.clear();
        patient.otp_attempts = 0;

        info!(patient_id = %patient.patient_id, "patient phone verified");
        self.notifier.publish_refresh().await;
        Ok(patient)
    }

    pub async fn accept_request(
        &self,
        request_id: Uuid,
        extras: AcceptExtras,
    ) -> BookingResult<AcceptedAppointment> {
        let mut uow = self.begin().await?;

        let request = uow
            .find_request(request_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment request not found"))?;
        let therapist = uow
            .find_therapist(request.therapist_id)
            .await?
            .ok_or_else(|| BookingError::not_found("therapist not found"))?;
        let schedule = uow.schedule_for(&therapist).await?;

        let date_time = SlotDateTime::parse(&request.date_time)?;
        let in_future = date_time.is_after(self.clock.now());

        let (time_block, appointment) = slots::reserve_slot(
            uow.as_mut(),
            schedule.schedule_id,
            NewAppointment {
                date_time,
                therapist_id: request.therapist_id,
                therapist_name: request.therapist_name.clone(),
                patient_id: request.patient_id,
                patient_name: request.patient_name.clone(),
                price_cents: extras.price_cents,
                is_paid: extras.is_paid,
                payment_method: extras.payment_method,
                notes: extras.notes,
                reminder_sent: in_future,
                clinic_group_id: request.clinic_group_id,
            },
        )
        .await?;

        if !uow.delete_request(request_id).await? {
            return Err(BookingError::not_found("appointment request not found"));
        }
        let tokens = uow
            .staff_device_tokens(GroupScope::within_group(request.clinic_group_id))
            .await?;
        uow.commit().await?;

        info!(
            request_id = %request_id,
            appointment_id = %appointment.appointment_id,
            time_block_id = %time_block.time_block_id,
            "appointment request accepted"
        );

        self.notifier.publish_refresh().await;
        if in_future {
            self.notifier
                .message_patient(
                    &request.phone_number,
                    &templates::confirmation(&request.date_time, &request.therapist_name),
                )
                .await;
        }
        self.notifier
            .notify(
                &tokens,
                templates::TITLE_ACCEPTED,
                &templates::accepted_push(&request.date_time, &request.patient_name),
            )
            .await;

        Ok(AcceptedAppointment {
            time_block,
            appointment,
        })
    }

    pub async fn reject_request(&self, request_id: Uuid) -> BookingResult<AppointmentRequest> {
        let mut uow = self.begin().await?;
        let request = uow
            .find_request(request_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment request not found"))?;
        uow.delete_request(request_id).await?;
        let tokens = uow
            .staff_device_tokens(GroupScope::within_group(request.clinic_group_id))
            .await?;
        uow.commit().await?;

        info!(request_id = %request_id, "appointment request rejected");

        self.notifier
            .notify(
                &tokens,
                templates::TITLE_REJECTED,
                &templates::rejected_push(&request.date_time, &request.patient_name),
            )
            .await;
        self.notifier.publish_refresh().await;
        if request.slot_at > self.clock.now() {
            self.notifier
                .message_patient(&request.phone_number, &templates::rejection())
                .await;
        }
        Ok(request)
    }

    pub async fn list_pending_requests(&self, caller: Caller) -> BookingResult<Vec<AppointmentRequest>> {
        let mut uow = self.begin().await?;
        uow.list_pending_requests(GroupScope::within_group(caller.clinic_group_id))
            .await
    }

    /* -------------------------
       Appointments
    --------------------------*/

    pub async fn list_unassigned_appointments(&self, caller: Caller) -> BookingResult<Vec<Appointment>> {
        let mut uow = self.begin().await?;
        uow.list_unassigned(GroupScope::within_group(caller.clinic_group_id))
            .await
    }

    pub async fn register_package(
        &self,
        appointment_id: Uuid,
        selection: PackageSelection,
    ) -> BookingResult<RegisteredPackage> {
        let mut uow = self.begin().await?;
        let appointment = uow
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment not found"))?;
        if appointment.treatment_plan_id.is_some() {
            return Err(BookingError::conflict(
                "appointment is already registered under a package",
            ));
        }

        let (plan, template) = match selection.treatment_plan_id {
            Some(plan_id) => {
                let plan = uow
                    .find_plan(plan_id)
                    .await?
                    .ok_or_else(|| BookingError::not_found("treatment plan not found"))?;
                if plan.patient_id != appointment.patient_id {
                    return Err(BookingError::policy(
                        "package belongs to a different patient",
                    ));
                }
                (plan, None)
            }
            None => {
                let template_id = selection.super_treatment_plan_id.ok_or_else(|| {
                    BookingError::validation(
                        "either treatment_plan_id or super_treatment_plan_id is required",
                    )
                })?;
                let template = uow
                    .find_template(template_id)
                    .await?
                    .ok_or_else(|| BookingError::not_found("treatment template not found"))?;
                let referral = match selection.referral_id {
                    Some(id) => Some(
                        uow.find_referral(id)
                            .await?
                            .ok_or_else(|| BookingError::not_found("referral not found"))?,
                    ),
                    None => None,
                };
                let new = ledger::instantiate(
                    &template,
                    appointment.patient_id,
                    selection.discount_percent,
                    referral.as_ref(),
                    appointment.clinic_group_id,
                )?;
                (uow.insert_plan(new).await?, Some(template))
            }
        };

        uow.set_appointment_plan(appointment_id, plan.treatment_plan_id)
            .await?;
        let tokens = match template {
            Some(_) => {
                uow.staff_device_tokens(GroupScope::within_group(appointment.clinic_group_id))
                    .await?
            }
            None => Vec::new(),
        };
        uow.commit().await?;

        info!(
            appointment_id = %appointment_id,
            plan_id = %plan.treatment_plan_id,
            created = template.is_some(),
            "package registered"
        );

        self.notifier.publish_refresh().await;
        if let Some(template) = &template {
            self.notifier
                .notify(
                    &tokens,
                    templates::TITLE_PACKAGE,
                    &templates::package_push(
                        &appointment.patient_name,
                        &template.description,
                        plan.total_price_cents,
                    ),
                )
                .await;
        }

        Ok(RegisteredPackage {
            created: template.is_some(),
            plan,
        })
    }

    /// Cancels the appointment booked on `time_block_id` by deleting the block.
    pub async fn remove_appointment(&self, time_block_id: Uuid) -> BookingResult<Option<Appointment>> {
        let mut uow = self.begin().await?;
        uow.find_time_block(time_block_id)
            .await?
            .ok_or_else(|| BookingError::not_found("time block not found"))?;
        let appointment = uow.find_appointment_by_block(time_block_id).await?;
        let patient = match &appointment {
            Some(a) => uow.find_patient(a.patient_id).await?,
            None => None,
        };
        slots::release_slot(uow.as_mut(), time_block_id).await?;
        let tokens = match &appointment {
            Some(a) => {
                uow.staff_device_tokens(GroupScope::within_group(a.clinic_group_id))
                    .await?
            }
            None => Vec::new(),
        };
        uow.commit().await?;

        info!(time_block_id = %time_block_id, "time block removed");
        self.notifier.publish_refresh().await;

        if let Some(a) = &appointment {
            let patient_name = patient.as_ref().map_or(a.patient_name.as_str(), |p| p.name.as_str());
            self.notifier
                .notify(
                    &tokens,
                    templates::TITLE_CANCELLED,
                    &templates::cancelled_push(patient_name, &a.date_time),
                )
                .await;
            if let Some(p) = patient.as_ref().filter(|p| !p.phone.is_empty()) {
                if a.slot_at > self.clock.now() {
                    self.notifier
                        .message_patient(&p.phone, &templates::cancellation())
                        .await;
                }
            }
        }
        Ok(appointment)
    }

    pub async fn mark_completed(&self, appointment_id: Uuid) -> BookingResult<TreatmentPlan> {
        let mut uow = self.begin().await?;
        let appointment = uow
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment not found"))?;
        let plan = ledger::mark_completed(uow.as_mut(), &appointment).await?;
        uow.commit().await?;

        info!(appointment_id = %appointment_id, remaining = plan.remaining, "appointment completed");
        self.notifier.publish_refresh().await;
        Ok(plan)
    }

    pub async fn unmark_completed(&self, appointment_id: Uuid) -> BookingResult<TreatmentPlan> {
        let mut uow = self.begin().await?;
        let appointment = uow
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment not found"))?;
        let plan = ledger::unmark_completed(uow.as_mut(), &appointment).await?;
        uow.commit().await?;

        info!(appointment_id = %appointment_id, remaining = plan.remaining, "appointment completion undone");
        self.notifier.publish_refresh().await;
        Ok(plan)
    }

    /* -------------------------
       Packages
    --------------------------*/

    /// Deletes the package and every appointment booked under it, including
    /// their time blocks. Returns the number of appointments removed.
    pub async fn remove_package(&self, plan_id: Uuid) -> BookingResult<usize> {
        let mut uow = self.begin().await?;
        uow.find_plan(plan_id)
            .await?
            .ok_or_else(|| BookingError::not_found("treatment plan not found"))?;
        let appointments = uow.appointments_for_plan(plan_id).await?;
        for a in &appointments {
            slots::release_slot(uow.as_mut(), a.time_block_id).await?;
        }
        uow.delete_plan(plan_id).await?;
        uow.commit().await?;

        info!(plan_id = %plan_id, appointments = appointments.len(), "package removed");
        self.notifier.publish_refresh().await;
        Ok(appointments.len())
    }

    pub async fn set_package_paid(
        &self,
        plan_id: Uuid,
        payment_method: Option<String>,
    ) -> BookingResult<TreatmentPlan> {
        let mut uow = self.begin().await?;
        let plan = ledger::set_paid(uow.as_mut(), plan_id, payment_method).await?;
        uow.commit().await?;
        info!(plan_id = %plan_id, "package marked paid");
        self.notifier.publish_refresh().await;
        Ok(plan)
    }

    pub async fn clear_package_paid(&self, plan_id: Uuid) -> BookingResult<TreatmentPlan> {
        let mut uow = self.begin().await?;
        let plan = ledger::clear_paid(uow.as_mut(), plan_id).await?;
        uow.commit().await?;
        info!(plan_id = %plan_id, "package marked unpaid");
        self.notifier.publish_refresh().await;
        Ok(plan)
    }

    pub async fn assign_referral(
        &self,
        plan_id: Uuid,
        referral_id: Option<Uuid>,
        discount_percent: f64,
    ) -> BookingResult<TreatmentPlan> {
        let mut uow = self.begin().await?;
        let plan = ledger::assign_referral(uow.as_mut(), plan_id, referral_id, discount_percent).await?;
        uow.commit().await?;
        info!(plan_id = %plan_id, total_price_cents = plan.total_price_cents, "package re-priced");
        self.notifier.publish_refresh().await;
        Ok(plan)
    }

    pub async fn patient_packages(&self, patient_id: Uuid) -> BookingResult<Vec<TreatmentPlan>> {
        let mut uow = self.begin().await?;
        uow.find_patient(patient_id)
            .await?
            .ok_or_else(|| BookingError::not_found("patient not found"))?;
        uow.plans_for_patient(patient_id).await
    }

    pub async fn package_appointments(&self, plan_id: Uuid) -> BookingResult<Vec<Appointment>> {
        let mut uow = self.begin().await?;
        uow.find_plan(plan_id)
            .await?
            .ok_or_else(|| BookingError::not_found("treatment plan not found"))?;
        uow.appointments_for_plan(plan_id).await
    }

    pub async fn patient_bookings(&self, patient_id: Uuid) -> BookingResult<PatientBookings> {
        let mut uow = self.begin().await?;
        uow.find_patient(patient_id)
            .await?
            .ok_or_else(|| BookingError::not_found("patient not found"))?;
        Ok(PatientBookings {
            requests: uow.requests_for_patient(patient_id).await?,
            appointments: uow.appointments_for_patient(patient_id).await?,
        })
    }

    /* -------------------------
       Schedules
    --------------------------*/

    pub async fn open_slots(
        &self,
        therapist_id: Uuid,
        date_times: Vec<String>,
        caller: Caller,
    ) -> BookingResult<Vec<TimeBlock>> {
        let parsed = date_times
            .iter()
            .map(|s| SlotDateTime::parse(s))
            .collect::<BookingResult<Vec<_>>>()?;

        let mut uow = self.begin().await?;
        let therapist = uow
            .find_therapist(therapist_id)
            .await?
            .ok_or_else(|| BookingError::not_found("therapist not found"))?;
        let schedule = uow.schedule_for(&therapist).await?;
        let created = slots::create_empty_slots(
            uow.as_mut(),
            schedule.schedule_id,
            parsed,
            therapist.clinic_group_id.or(caller.clinic_group_id),
        )
        .await?;
        uow.commit().await?;

        info!(therapist_id = %therapist_id, count = created.len(), "time blocks opened");
        self.notifier.publish_refresh().await;
        Ok(created)
    }

    /// Slots in the inclusive day range, defaulting to the current month.
    pub async fn therapist_schedule(
        &self,
        therapist_id: Uuid,
        start: Option<&str>,
        end: Option<&str>,
    ) -> BookingResult<TherapistSchedule> {
        let (from, until) = resolve_range(start, end, self.clock.now().date())?;

        let mut uow = self.begin().await?;
        let therapist = uow
            .find_therapist(therapist_id)
            .await?
            .ok_or_else(|| BookingError::not_found("therapist not found"))?;
        let schedule = uow.schedule_for(&therapist).await?;
        let slots = slots::list_slots(uow.as_mut(), schedule.schedule_id, from, until).await?;
        uow.commit().await?;

        Ok(TherapistSchedule {
            schedule_id: schedule.schedule_id,
            therapist_id,
            therapist_name: therapist.name,
            slots,
        })
    }

    /* -------------------------
       Catalogue
    --------------------------*/

    pub async fn add_template(&self, mut new: NewTemplate, caller: Caller) -> BookingResult<SuperTreatmentPlan> {
        ledger::validate_template(&new)?;
        new.description = new.description.trim().to_string();
        new.clinic_group_id = new.clinic_group_id.or(caller.clinic_group_id);

        let mut uow = self.begin().await?;
        let template = uow.insert_template(new).await?;
        uow.commit().await?;
        info!(template_id = %template.super_treatment_plan_id, "treatment template added");
        Ok(template)
    }

    pub async fn list_templates(&self, caller: Caller) -> BookingResult<Vec<SuperTreatmentPlan>> {
        let mut uow = self.begin().await?;
        uow.list_templates(GroupScope::within_group(caller.clinic_group_id))
            .await
    }

    pub async fn add_referral(&self, mut new: NewReferral, caller: Caller) -> BookingResult<Referral> {
        ledger::validate_referral(&new)?;
        new.name = new.name.trim().to_string();
        new.clinic_group_id = new.clinic_group_id.or(caller.clinic_group_id);

        let mut uow = self.begin().await?;
        let referral = uow.insert_referral(new).await?;
        uow.commit().await?;
        info!(referral_id = %referral.referral_id, "referral added");
        Ok(referral)
    }

    pub async fn list_referrals(&self, caller: Caller) -> BookingResult<Vec<Referral>> {
        let mut uow = self.begin().await?;
        uow.list_referrals(GroupScope::within_group(caller.clinic_group_id))
            .await
    }
}
