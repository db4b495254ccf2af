// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgPool, Postgres, Transaction};
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

const PATIENT_COLS: &str =
    "patient_id, name, phone, otp, otp_attempts, is_verified, clinic_group_id, created_at";
const TIME_BLOCK_COLS: &str =
    "time_block_id, schedule_id, date_time, slot_at, is_available, clinic_group_id";
const REQUEST_COLS: &str = "request_id, date_time, slot_at, therapist_id, therapist_name, \
     patient_id, patient_name, phone_number, super_treatment_plan_description, \
     clinic_group_id, created_at";
const APPOINTMENT_COLS: &str = "appointment_id, time_block_id, date_time, slot_at, \
     therapist_id, therapist_name, patient_id, patient_name, price_cents, is_completed, \
     is_paid, payment_method, notes, treatment_plan_id, reminder_sent, clinic_group_id, created_at";
const PLAN_COLS: &str = "treatment_plan_id, super_treatment_plan_id, patient_id, remaining, \
     discount_percent, total_price_cents, referral_id, referral_cashback_cents, is_paid, \
     payment_method, clinic_group_id, created_at";
const TEMPLATE_COLS: &str =
    "super_treatment_plan_id, description, sessions_count, price_cents, clinic_group_id";
const REFERRAL_COLS: &str = "referral_id, name, cashback_percent, clinic_group_id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn begin(&self) -> BookingResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// One Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> BookingResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PatientRepository for PgUnitOfWork {
    async fn find_patient(&mut self, patient_id: Uuid) -> BookingResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLS} FROM patient WHERE patient_id = $1");
        Ok(sqlx::query_as::<_, Patient>(&sql)
            .bind(patient_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn find_patient_by_phone(&mut self, phone: &str) -> BookingResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLS} FROM patient WHERE phone = $1");
        Ok(sqlx::query_as::<_, Patient>(&sql)
            .bind(phone)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_patient(&mut self, new: NewPatient) -> BookingResult<Patient> {
        let sql = format!(
            r#"
            INSERT INTO patient (name, phone, otp, is_verified, clinic_group_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PATIENT_COLS}
            "#
        );
        Ok(sqlx::query_as::<_, Patient>(&sql)
            .bind(&new.name)
            .bind(&new.phone)
            .bind(&new.otp)
            .bind(new.is_verified)
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn mark_patient_verified(&mut self, patient_id: Uuid) -> BookingResult<()> {
        sqlx::query(
            "UPDATE patient SET is_verified = TRUE, otp = '', otp_attempts = 0 WHERE patient_id = $1",
        )
        .bind(patient_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn record_otp_failure(&mut self, patient_id: Uuid, attempts: i32, clear_code: bool) -> BookingResult<()> {
        sqlx::query(
            r#"
            UPDATE patient
            SET otp_attempts = $2,
                otp = CASE WHEN $3 THEN '' ELSE otp END
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .bind(attempts)
        .bind(clear_code)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for PgUnitOfWork {
    async fn find_therapist(&mut self, therapist_id: Uuid) -> BookingResult<Option<Therapist>> {
        Ok(sqlx::query_as::<_, Therapist>(
            r#"
            SELECT therapist_id, user_id, name, phone, clinic_group_id
            FROM therapist
            WHERE therapist_id = $1
            "#,
        )
        .bind(therapist_id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn schedule_for(&mut self, therapist: &Therapist) -> BookingResult<Schedule> {
        sqlx::query(
            r#"
            INSERT INTO schedule (therapist_id)
            VALUES ($1)
            ON CONFLICT (therapist_id) DO NOTHING
            "#,
        )
        .bind(therapist.therapist_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(sqlx::query_as::<_, Schedule>(
            "SELECT schedule_id, therapist_id FROM schedule WHERE therapist_id = $1",
        )
        .bind(therapist.therapist_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn find_slot(&mut self, schedule_id: Uuid, date_time: &str) -> BookingResult<Option<TimeBlock>> {
        let sql = format!(
            "SELECT {TIME_BLOCK_COLS} FROM time_block WHERE schedule_id = $1 AND date_time = $2 FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, TimeBlock>(&sql)
            .bind(schedule_id)
            .bind(date_time)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn find_time_block(&mut self, time_block_id: Uuid) -> BookingResult<Option<TimeBlock>> {
        let sql = format!("SELECT {TIME_BLOCK_COLS} FROM time_block WHERE time_block_id = $1");
        Ok(sqlx::query_as::<_, TimeBlock>(&sql)
            .bind(time_block_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn list_slots(
        &mut self,
        schedule_id: Uuid,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> BookingResult<Vec<SlotView>> {
        let sql = format!(
            r#"
            SELECT {TIME_BLOCK_COLS}
            FROM time_block
            WHERE schedule_id = $1
              AND slot_at >= $2
              AND slot_at <  $3
            ORDER BY slot_at ASC, date_time ASC
            "#
        );
        let blocks = sqlx::query_as::<_, TimeBlock>(&sql)
            .bind(schedule_id)
            .bind(from)
            .bind(until)
            .fetch_all(&mut *self.tx)
            .await?;

        let ids: Vec<Uuid> = blocks.iter().map(|b| b.time_block_id).collect();
        let sql = format!("SELECT {APPOINTMENT_COLS} FROM appointment WHERE time_block_id = ANY($1)");
        let mut appointments = sqlx::query_as::<_, Appointment>(&sql)
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(blocks
            .into_iter()
            .map(|block| {
                let appointment = appointments
                    .iter()
                    .position(|a| a.time_block_id == block.time_block_id)
                    .map(|i| appointments.swap_remove(i));
                SlotView { block, appointment }
            })
            .collect())
    }

    async fn insert_time_block(&mut self, new: NewTimeBlock) -> BookingResult<TimeBlock> {
        let sql = format!(
            r#"
            INSERT INTO time_block (schedule_id, date_time, slot_at, is_available, clinic_group_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TIME_BLOCK_COLS}
            "#
        );
        sqlx::query_as::<_, TimeBlock>(&sql)
            .bind(new.schedule_id)
            .bind(new.date_time.as_str())
            .bind(new.date_time.at())
            .bind(new.is_available)
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match BookingError::from(e) {
                BookingError::Conflict(_) => {
                    BookingError::conflict(format!("time block already exists for {}", new.date_time))
                }
                other => other,
            })
    }

    async fn delete_time_block(&mut self, time_block_id: Uuid) -> BookingResult<bool> {
        // appointment.time_block_id is ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM time_block WHERE time_block_id = $1")
            .bind(time_block_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl RequestRepository for PgUnitOfWork {
    async fn insert_request(&mut self, new: NewAppointmentRequest) -> BookingResult<AppointmentRequest> {
        let sql = format!(
            r#"
            INSERT INTO appointment_request (
              date_time, slot_at, therapist_id, therapist_name, patient_id,
              patient_name, phone_number, super_treatment_plan_description, clinic_group_id
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING {REQUEST_COLS}
            "#
        );
        sqlx::query_as::<_, AppointmentRequest>(&sql)
            .bind(new.date_time.as_str())
            .bind(new.date_time.at())
            .bind(new.therapist_id)
            .bind(&new.therapist_name)
            .bind(new.patient_id)
            .bind(&new.patient_name)
            .bind(&new.phone_number)
            .bind(new.super_treatment_plan_description.as_deref())
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match BookingError::from(e) {
                BookingError::Conflict(_) => BookingError::conflict(format!(
                    "the slot {} already has a pending request",
                    new.date_time
                )),
                other => other,
            })
    }

    async fn find_request(&mut self, request_id: Uuid) -> BookingResult<Option<AppointmentRequest>> {
        let sql = format!("SELECT {REQUEST_COLS} FROM appointment_request WHERE request_id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, AppointmentRequest>(&sql)
            .bind(request_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn delete_request(&mut self, request_id: Uuid) -> BookingResult<bool> {
        let res = sqlx::query("DELETE FROM appointment_request WHERE request_id = $1")
            .bind(request_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn pending_request_exists(&mut self, therapist_id: Uuid, date_time: &str) -> BookingResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
              SELECT 1 FROM appointment_request
              WHERE therapist_id = $1 AND date_time = $2
            )
            "#,
        )
        .bind(therapist_id)
        .bind(date_time)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn list_pending_requests(&mut self, scope: GroupScope) -> BookingResult<Vec<AppointmentRequest>> {
        let sql = format!(
            r#"
            SELECT {REQUEST_COLS}
            FROM appointment_request
            WHERE ($1::uuid IS NULL OR clinic_group_id = $1)
            ORDER BY slot_at ASC
            "#
        );
        Ok(sqlx::query_as::<_, AppointmentRequest>(&sql)
            .bind(scope.group_id())
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn count_patient_bookings_on(&mut self, patient_id: Uuid, day: NaiveDate) -> BookingResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT
              (SELECT COUNT(*) FROM appointment_request WHERE patient_id = $1 AND slot_at::date = $2)
            + (SELECT COUNT(*) FROM appointment WHERE patient_id = $1 AND slot_at::date = $2)
            "#,
        )
        .bind(patient_id)
        .bind(day)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn requests_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<AppointmentRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLS} FROM appointment_request WHERE patient_id = $1 ORDER BY slot_at ASC"
        );
        Ok(sqlx::query_as::<_, AppointmentRequest>(&sql)
            .bind(patient_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }
}

#[async_trait]
impl AppointmentRepository for PgUnitOfWork {
    async fn insert_appointment(&mut self, time_block_id: Uuid, new: NewAppointment) -> BookingResult<Appointment> {
        let sql = format!(
            r#"
            INSERT INTO appointment (
              time_block_id, date_time, slot_at, therapist_id, therapist_name,
              patient_id, patient_name, price_cents, is_paid, payment_method,
              notes, reminder_sent, clinic_group_id
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            RETURNING {APPOINTMENT_COLS}
            "#
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(time_block_id)
            .bind(new.date_time.as_str())
            .bind(new.date_time.at())
            .bind(new.therapist_id)
            .bind(&new.therapist_name)
            .bind(new.patient_id)
            .bind(&new.patient_name)
            .bind(new.price_cents)
            .bind(new.is_paid)
            .bind(new.payment_method.as_deref())
            .bind(new.notes.as_deref())
            .bind(new.reminder_sent)
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn find_appointment(&mut self, appointment_id: Uuid) -> BookingResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLS} FROM appointment WHERE appointment_id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn find_appointment_by_block(&mut self, time_block_id: Uuid) -> BookingResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLS} FROM appointment WHERE time_block_id = $1");
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(time_block_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn set_appointment_plan(&mut self, appointment_id: Uuid, plan_id: Uuid) -> BookingResult<()> {
        sqlx::query("UPDATE appointment SET treatment_plan_id = $2 WHERE appointment_id = $1")
            .bind(appointment_id)
            .bind(plan_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_appointment_completed(&mut self, appointment_id: Uuid, completed: bool) -> BookingResult<()> {
        sqlx::query("UPDATE appointment SET is_completed = $2 WHERE appointment_id = $1")
            .bind(appointment_id)
            .bind(completed)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_reminder_sent(&mut self, appointment_id: Uuid) -> BookingResult<()> {
        sqlx::query("UPDATE appointment SET reminder_sent = TRUE WHERE appointment_id = $1")
            .bind(appointment_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn appointments_for_plan(&mut self, plan_id: Uuid) -> BookingResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLS} FROM appointment WHERE treatment_plan_id = $1 ORDER BY slot_at ASC"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(plan_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn appointments_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLS} FROM appointment WHERE patient_id = $1 ORDER BY slot_at ASC"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(patient_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn list_unassigned(&mut self, scope: GroupScope) -> BookingResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {APPOINTMENT_COLS}
            FROM appointment
            WHERE treatment_plan_id IS NULL
              AND ($1::uuid IS NULL OR clinic_group_id = $1)
            ORDER BY slot_at ASC
            "#
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(scope.group_id())
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn reminder_candidates(
        &mut self,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> BookingResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {APPOINTMENT_COLS}
            FROM appointment
            WHERE is_completed = FALSE
              AND reminder_sent = FALSE
              AND slot_at BETWEEN $1 AND $2
            ORDER BY slot_at ASC
            "#
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(from)
            .bind(until)
            .fetch_all(&mut *self.tx)
            .await?)
    }
}

#[async_trait]
impl PlanRepository for PgUnitOfWork {
    async fn find_template(&mut self, template_id: Uuid) -> BookingResult<Option<SuperTreatmentPlan>> {
        let sql = format!("SELECT {TEMPLATE_COLS} FROM super_treatment_plan WHERE super_treatment_plan_id = $1");
        Ok(sqlx::query_as::<_, SuperTreatmentPlan>(&sql)
            .bind(template_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_template(&mut self, new: NewTemplate) -> BookingResult<SuperTreatmentPlan> {
        let sql = format!(
            r#"
            INSERT INTO super_treatment_plan (description, sessions_count, price_cents, clinic_group_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {TEMPLATE_COLS}
            "#
        );
        Ok(sqlx::query_as::<_, SuperTreatmentPlan>(&sql)
            .bind(&new.description)
            .bind(new.sessions_count)
            .bind(new.price_cents)
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn list_templates(&mut self, scope: GroupScope) -> BookingResult<Vec<SuperTreatmentPlan>> {
        let sql = format!(
            r#"
            SELECT {TEMPLATE_COLS}
            FROM super_treatment_plan
            WHERE ($1::uuid IS NULL OR clinic_group_id = $1)
            ORDER BY description ASC
            "#
        );
        Ok(sqlx::query_as::<_, SuperTreatmentPlan>(&sql)
            .bind(scope.group_id())
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn find_referral(&mut self, referral_id: Uuid) -> BookingResult<Option<Referral>> {
        let sql = format!("SELECT {REFERRAL_COLS} FROM referral WHERE referral_id = $1");
        Ok(sqlx::query_as::<_, Referral>(&sql)
            .bind(referral_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_referral(&mut self, new: NewReferral) -> BookingResult<Referral> {
        let sql = format!(
            r#"
            INSERT INTO referral (name, cashback_percent, clinic_group_id)
            VALUES ($1, $2, $3)
            RETURNING {REFERRAL_COLS}
            "#
        );
        Ok(sqlx::query_as::<_, Referral>(&sql)
            .bind(&new.name)
            .bind(new.cashback_percent)
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn list_referrals(&mut self, scope: GroupScope) -> BookingResult<Vec<Referral>> {
        let sql = format!(
            r#"
            SELECT {REFERRAL_COLS}
            FROM referral
            WHERE ($1::uuid IS NULL OR clinic_group_id = $1)
            ORDER BY name ASC
            "#
        );
        Ok(sqlx::query_as::<_, Referral>(&sql)
            .bind(scope.group_id())
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn insert_plan(&mut self, new: NewTreatmentPlan) -> BookingResult<TreatmentPlan> {
        let sql = format!(
            r#"
            INSERT INTO treatment_plan (
              super_treatment_plan_id, patient_id, remaining, discount_percent,
              total_price_cents, referral_id, referral_cashback_cents, clinic_group_id
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            RETURNING {PLAN_COLS}
            "#
        );
        Ok(sqlx::query_as::<_, TreatmentPlan>(&sql)
            .bind(new.super_treatment_plan_id)
            .bind(new.patient_id)
            .bind(new.remaining)
            .bind(new.discount_percent)
            .bind(new.total_price_cents)
            .bind(new.referral_id)
            .bind(new.referral_cashback_cents)
            .bind(new.clinic_group_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn find_plan(&mut self, plan_id: Uuid) -> BookingResult<Option<TreatmentPlan>> {
        let sql = format!("SELECT {PLAN_COLS} FROM treatment_plan WHERE treatment_plan_id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, TreatmentPlan>(&sql)
            .bind(plan_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn update_plan_remaining(&mut self, plan_id: Uuid, remaining: i32) -> BookingResult<()> {
        sqlx::query("UPDATE treatment_plan SET remaining = $2 WHERE treatment_plan_id = $1")
            .bind(plan_id)
            .bind(remaining)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_plan_payment(
        &mut self,
        plan_id: Uuid,
        is_paid: bool,
        payment_method: Option<String>,
    ) -> BookingResult<()> {
        sqlx::query(
            r#"
            UPDATE treatment_plan
            SET is_paid = $2, payment_method = $3
            WHERE treatment_plan_id = $1
            "#,
        )
        .bind(plan_id)
        .bind(is_paid)
        .bind(payment_method)
        .execute(&mut *self.tx)
        .await?;
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
        sqlx::query(
            r#"
            UPDATE treatment_plan
            SET referral_id = $2,
                discount_percent = $3,
                total_price_cents = $4,
                referral_cashback_cents = $5
            WHERE treatment_plan_id = $1
            "#,
        )
        .bind(plan_id)
        .bind(referral_id)
        .bind(discount_percent)
        .bind(total_price_cents)
        .bind(referral_cashback_cents)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn plans_for_patient(&mut self, patient_id: Uuid) -> BookingResult<Vec<TreatmentPlan>> {
        let sql = format!(
            "SELECT {PLAN_COLS} FROM treatment_plan WHERE patient_id = $1 ORDER BY created_at ASC"
        );
        Ok(sqlx::query_as::<_, TreatmentPlan>(&sql)
            .bind(patient_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn delete_plan(&mut self, plan_id: Uuid) -> BookingResult<bool> {
        let res = sqlx::query("DELETE FROM treatment_plan WHERE treatment_plan_id = $1")
            .bind(plan_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl DeviceTokenRepository for PgUnitOfWork {
    async fn staff_device_tokens(&mut self, scope: GroupScope) -> BookingResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT dt.value
            FROM device_token dt
            JOIN app_user u ON u.user_id = dt.user_id
            WHERE u.is_active = TRUE
              AND u.roles BETWEEN 1 AND 4
              AND ($1::uuid IS NULL OR u.clinic_group_id = $1)
            "#,
        )
        .bind(scope.group_id())
        .fetch_all(&mut *self.tx)
        .await?)
    }
}
