// src/reminder.rs

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::booking::{BookingResult, Clock};
use crate::models::{Appointment, Patient};
use crate::notify::{templates, ChangeNotifier};
use crate::store::{AppointmentRepository, BookingStore, PatientRepository};

/// Reminders go out for appointments starting 2h53m to 3h7m from now.
pub const WINDOW_START_MINUTES: i64 = 2 * 60 + 53;
pub const WINDOW_END_MINUTES: i64 = 3 * 60 + 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub matched: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    store: Arc<dyn BookingStore>,
    notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn BookingStore>, notifier: ChangeNotifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// One scan. Each reminder is flagged in its own unit of work, and only
    /// after the message went out.
    pub async fn run_once(&self) -> BookingResult<ReminderReport> {
        let now = self.clock.now();
        let due: Vec<(Appointment, Option<Patient>)> = {
            let mut uow = self.store.begin().await?;
            let candidates = uow
                .reminder_candidates(
                    now + Duration::minutes(WINDOW_START_MINUTES),
                    now + Duration::minutes(WINDOW_END_MINUTES),
                )
                .await?;
            let mut due = Vec::with_capacity(candidates.len());
            for appointment in candidates {
                let patient = uow.find_patient(appointment.patient_id).await?;
                due.push((appointment, patient));
            }
            due
        };

        let mut report = ReminderReport {
            matched: due.len(),
            ..Default::default()
        };

        for (appointment, patient) in due {
            let Some(patient) = patient.filter(|p| p.is_verified && !p.phone.is_empty()) else {
                report.skipped += 1;
                continue;
            };

            let message = templates::reminder(
                &appointment.therapist_name,
                &appointment.slot_at.format("%-I:%M %p").to_string(),
            );
            if let Err(e) = self.notifier.send_direct_message(&patient.phone, &message).await {
                warn!(
                    appointment_id = %appointment.appointment_id,
                    error = %e,
                    "reminder not delivered, will retry next pass"
                );
                report.failed += 1;
                continue;
            }

            match self.flag_sent(&appointment).await {
                Ok(()) => {
                    report.sent += 1;
                    info!(
                        appointment_id = %appointment.appointment_id,
                        date_time = %appointment.date_time,
                        "reminder sent"
                    );
                }
                Err(e) => {
                    error!(
                        appointment_id = %appointment.appointment_id,
                        error = %e,
                        "reminder sent but flag not saved"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn flag_sent(&self, appointment: &Appointment) -> BookingResult<()> {
        let mut uow = self.store.begin().await?;
        uow.set_reminder_sent(appointment.appointment_id).await?;
        uow.commit().await
    }

    pub fn spawn(self: Arc<Self>, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Reminder scheduler started, interval {:?}", every);
            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(report) if report.matched > 0 => info!(?report, "reminder pass finished"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "reminder pass failed"),
                }
            }
        })
    }
}
