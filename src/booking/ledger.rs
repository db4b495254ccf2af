//! Package pricing and session bookkeeping.
//!
//! An appointment's `is_completed` flag decides whether its session has been
//! consumed; the plan counter only ever moves together with that flag.

use tracing::warn;
use uuid::Uuid;

use super::{BookingError, BookingResult};
use crate::models::{
    Appointment, NewReferral, NewTemplate, NewTreatmentPlan, Referral, SuperTreatmentPlan,
    TreatmentPlan,
};
use crate::store::{AppointmentRepository, PlanRepository, UnitOfWork};

fn validate_percent(field: &str, value: f64) -> BookingResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(BookingError::validation(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

/// `price * (100 - discount) / 100`, rounded to the cent.
pub fn price_for(template: &SuperTreatmentPlan, discount_percent: f64) -> BookingResult<i64> {
    validate_percent("discount_percent", discount_percent)?;
    Ok((template.price_cents as f64 * (100.0 - discount_percent) / 100.0).round() as i64)
}

/// Referral payout on a package total. Reporting only.
pub fn cashback_for(total_price_cents: i64, referral: Option<&Referral>) -> i64 {
    match referral {
        Some(r) => (total_price_cents as f64 * r.cashback_percent / 100.0).round() as i64,
        None => 0,
    }
}

pub fn validate_template(new: &NewTemplate) -> BookingResult<()> {
    let description = new.description.trim();
    if description.is_empty() {
        return Err(BookingError::validation("description is required"));
    }
    if description.chars().count() > 255 {
        return Err(BookingError::validation("description must be at most 255 characters"));
    }
    if new.sessions_count <= 0 {
        return Err(BookingError::validation("sessions_count must be greater than 0"));
    }
    if new.price_cents < 0 {
        return Err(BookingError::validation("price cannot be negative"));
    }
    Ok(())
}

pub fn validate_referral(new: &NewReferral) -> BookingResult<()> {
    if new.name.trim().is_empty() {
        return Err(BookingError::validation("name is required"));
    }
    validate_percent("cashback_percent", new.cashback_percent)
}

pub fn instantiate(
    template: &SuperTreatmentPlan,
    patient_id: Uuid,
    discount_percent: f64,
    referral: Option<&Referral>,
    clinic_group_id: Option<Uuid>,
) -> BookingResult<NewTreatmentPlan> {
    let total_price_cents = price_for(template, discount_percent)?;
    Ok(NewTreatmentPlan {
        super_treatment_plan_id: template.super_treatment_plan_id,
        patient_id,
        remaining: template.sessions_count,
        discount_percent,
        total_price_cents,
        referral_id: referral.map(|r| r.referral_id),
        referral_cashback_cents: cashback_for(total_price_cents, referral),
        clinic_group_id,
    })
}

async fn plan_of(uow: &mut dyn UnitOfWork, appointment: &Appointment) -> BookingResult<TreatmentPlan> {
    let plan_id = appointment.treatment_plan_id.ok_or_else(|| {
        BookingError::policy("appointment is not registered under a package")
    })?;
    uow.find_plan(plan_id)
        .await?
        .ok_or_else(|| BookingError::not_found("treatment plan not found"))
}

/// Consumes one session. Already-completed appointments are left alone.
pub async fn mark_completed(
    uow: &mut dyn UnitOfWork,
    appointment: &Appointment,
) -> BookingResult<TreatmentPlan> {
    let mut plan = plan_of(uow, appointment).await?;
    if appointment.is_completed {
        return Ok(plan);
    }
    if plan.remaining <= 0 {
        return Err(BookingError::policy("no sessions remaining in this package"));
    }

    plan.remaining -= 1;
    uow.update_plan_remaining(plan.treatment_plan_id, plan.remaining).await?;
    uow.set_appointment_completed(appointment.appointment_id, true).await?;
    Ok(plan)
}

/// Gives one session back. Appointments that are not completed are left alone.
pub async fn unmark_completed(
    uow: &mut dyn UnitOfWork,
    appointment: &Appointment,
) -> BookingResult<TreatmentPlan> {
    let mut plan = plan_of(uow, appointment).await?;
    if !appointment.is_completed {
        return Ok(plan);
    }

    let ceiling = uow
        .find_template(plan.super_treatment_plan_id)
        .await?
        .map(|t| t.sessions_count);
    plan.remaining += 1;
    if let Some(max) = ceiling.filter(|max| plan.remaining > *max) {
        warn!(
            plan_id = %plan.treatment_plan_id,
            remaining = plan.remaining,
            max,
            "remaining sessions above package size, clamping"
        );
        plan.remaining = max;
    }

    uow.update_plan_remaining(plan.treatment_plan_id, plan.remaining).await?;
    uow.set_appointment_completed(appointment.appointment_id, false).await?;
    Ok(plan)
}

async fn load_plan(uow: &mut dyn UnitOfWork, plan_id: Uuid) -> BookingResult<TreatmentPlan> {
    uow.find_plan(plan_id)
        .await?
        .ok_or_else(|| BookingError::not_found("treatment plan not found"))
}

pub async fn set_paid(
    uow: &mut dyn UnitOfWork,
    plan_id: Uuid,
    payment_method: Option<String>,
) -> BookingResult<TreatmentPlan> {
    let mut plan = load_plan(uow, plan_id).await?;
    let method = payment_method
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    uow.update_plan_payment(plan_id, true, method.clone()).await?;
    plan.is_paid = true;
    plan.payment_method = method;
    Ok(plan)
}

pub async fn clear_paid(uow: &mut dyn UnitOfWork, plan_id: Uuid) -> BookingResult<TreatmentPlan> {
    let mut plan = load_plan(uow, plan_id).await?;
    uow.update_plan_payment(plan_id, false, None).await?;
    plan.is_paid = false;
    plan.payment_method = None;
    Ok(plan)
}

/// Re-prices a package for a (possibly removed) referral and discount.
pub async fn assign_referral(
    uow: &mut dyn UnitOfWork,
    plan_id: Uuid,
    referral_id: Option<Uuid>,
    discount_percent: f64,
) -> BookingResult<TreatmentPlan> {
    let mut plan = load_plan(uow, plan_id).await?;
    let template = uow
        .find_template(plan.super_treatment_plan_id)
        .await?
        .ok_or_else(|| BookingError::not_found("treatment template not found"))?;
    let referral = match referral_id {
        Some(id) => Some(
            uow.find_referral(id)
                .await?
                .ok_or_else(|| BookingError::not_found("referral not found"))?,
        ),
        None => None,
    };

    let total = price_for(&template, discount_percent)?;
    let cashback = cashback_for(total, referral.as_ref());
    uow.update_plan_pricing(plan_id, referral_id, discount_percent, total, cashback)
        .await?;

    plan.referral_id = referral_id;
    plan.discount_percent = discount_percent;
    plan.total_price_cents = total;
    plan.referral_cashback_cents = cashback;
    Ok(plan)
}
