//! Time-block operations. Every function runs inside the caller's unit of
//! work; nothing here commits.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::{BookingError, BookingResult, SlotDateTime};
use crate::models::{Appointment, NewAppointment, NewTimeBlock, SlotView, TimeBlock};
use crate::store::{AppointmentRepository, ScheduleRepository, UnitOfWork};

/// Slots whose day lies in `start..=end`, oldest first.
pub async fn list_slots(
    uow: &mut dyn UnitOfWork,
    schedule_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> BookingResult<Vec<SlotView>> {
    let from = start.and_time(NaiveTime::MIN);
    let until = end
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::days(1))
        .unwrap_or(NaiveDateTime::MAX);
    uow.list_slots(schedule_id, from, until).await
}

/// Opens availability. The batch is checked as a whole before anything is
/// written, so one clash leaves the schedule untouched.
pub async fn create_empty_slots(
    uow: &mut dyn UnitOfWork,
    schedule_id: Uuid,
    date_times: Vec<SlotDateTime>,
    clinic_group_id: Option<Uuid>,
) -> BookingResult<Vec<TimeBlock>> {
    if date_times.is_empty() {
        return Err(BookingError::validation("at least one date_time is required"));
    }

    let mut seen = HashSet::new();
    for dt in &date_times {
        if !seen.insert(dt.as_str()) {
            return Err(BookingError::conflict(format!("{dt} appears twice in the batch")));
        }
        if uow.find_slot(schedule_id, dt.as_str()).await?.is_some() {
            return Err(BookingError::conflict(format!("a time block already exists at {dt}")));
        }
    }

    let mut created = Vec::with_capacity(date_times.len());
    for date_time in date_times {
        created.push(
            uow.insert_time_block(NewTimeBlock {
                schedule_id,
                date_time,
                is_available: true,
                clinic_group_id,
            })
            .await?,
        );
    }
    Ok(created)
}

/// Fails with `Conflict` when any block, open or reserved, already sits at
/// the exact date-time on the schedule.
pub async fn ensure_slot_free(
    uow: &mut dyn UnitOfWork,
    schedule_id: Uuid,
    date_time: &SlotDateTime,
) -> BookingResult<()> {
    match uow.find_slot(schedule_id, date_time.as_str()).await? {
        None => Ok(()),
        Some(_) => Err(BookingError::conflict(format!(
            "a time block already exists at {date_time}"
        ))),
    }
}

/// Creates an unavailable block at the appointment's date-time and binds the
/// appointment to it.
pub async fn reserve_slot(
    uow: &mut dyn UnitOfWork,
    schedule_id: Uuid,
    appointment: NewAppointment,
) -> BookingResult<(TimeBlock, Appointment)> {
    ensure_slot_free(uow, schedule_id, &appointment.date_time).await?;
    let block = uow
        .insert_time_block(NewTimeBlock {
            schedule_id,
            date_time: appointment.date_time.clone(),
            is_available: false,
            clinic_group_id: appointment.clinic_group_id,
        })
        .await?;
    let appointment = uow.insert_appointment(block.time_block_id, appointment).await?;
    Ok((block, appointment))
}

/// Deletes the block and its appointment. Missing blocks are fine.
pub async fn release_slot(uow: &mut dyn UnitOfWork, time_block_id: Uuid) -> BookingResult<bool> {
    uow.delete_time_block(time_block_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BookingStore, MemoryStore};

    fn dt(s: &str) -> SlotDateTime {
        SlotDateTime::parse(s).unwrap()
    }

    #[tokio::test]
    async fn batch_with_one_existing_entry_creates_nothing() {
        let store = MemoryStore::new();
        let therapist = store.seed_therapist("T1", None).await;
        let mut uow = store.begin().await.unwrap();
        let schedule = uow.schedule_for(&therapist).await.unwrap();

        create_empty_slots(uow.as_mut(), schedule.schedule_id, vec![dt("2025/06/10 & 10:00 AM")], None)
            .await
            .unwrap();

        let err = create_empty_slots(
            uow.as_mut(),
            schedule.schedule_id,
            vec![dt("2025/06/10 & 11:00 AM"), dt("2025/06/10 & 10:00 AM")],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let slots = list_slots(uow.as_mut(), schedule.schedule_id, day, day).await.unwrap();
        assert_eq!(slots.len(), 1, "11:00 must not have been created");
    }

    #[tokio::test]
    async fn duplicates_inside_batch_conflict() {
        let store = MemoryStore::new();
        let therapist = store.seed_therapist("T1", None).await;
        let mut uow = store.begin().await.unwrap();
        let schedule = uow.schedule_for(&therapist).await.unwrap();
        let err = create_empty_slots(
            uow.as_mut(),
            schedule.schedule_id,
            vec![dt("2025/06/10 & 10:00 AM"), dt("2025/06/10 & 10:00 AM")],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = create_empty_slots(uow.as_mut(), Uuid::new_v4(), vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn reserving_over_an_open_block_conflicts() {
        let store = MemoryStore::new();
        let therapist = store.seed_therapist("T1", None).await;
        let patient = store.seed_patient("P1", "+201000000001", true).await;
        let mut uow = store.begin().await.unwrap();
        let schedule = uow.schedule_for(&therapist).await.unwrap();
        create_empty_slots(uow.as_mut(), schedule.schedule_id, vec![dt("2025/06/10 & 10:00 AM")], None)
            .await
            .unwrap();

        let err = reserve_slot(
            uow.as_mut(),
            schedule.schedule_id,
            NewAppointment {
                date_time: dt("2025/06/10 & 10:00 AM"),
                therapist_id: therapist.therapist_id,
                therapist_name: therapist.name.clone(),
                patient_id: patient.patient_id,
                patient_name: patient.name.clone(),
                price_cents: 0,
                is_paid: false,
                payment_method: None,
                notes: None,
                reminder_sent: false,
                clinic_group_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let slots = list_slots(uow.as_mut(), schedule.schedule_id, day, day).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots[0].block.is_available);
        assert!(slots[0].appointment.is_none());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(!release_slot(uow.as_mut(), Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn list_range_is_inclusive_and_ordered() {
        let store = MemoryStore::new();
        let therapist = store.seed_therapist("T1", None).await;
        let mut uow = store.begin().await.unwrap();
        let schedule = uow.schedule_for(&therapist).await.unwrap();
        create_empty_slots(
            uow.as_mut(),
            schedule.schedule_id,
            vec![
                dt("2025/06/12 & 9:00 AM"),
                dt("2025/06/10 & 2:00 PM"),
                dt("2025/06/10 & 9:30 AM"),
                dt("2025/06/13 & 9:00 AM"),
            ],
            None,
        )
        .await
        .unwrap();

        let slots = list_slots(
            uow.as_mut(),
            schedule.schedule_id,
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 12).unwrap(),
        )
        .await
        .unwrap();
        let got: Vec<&str> = slots.iter().map(|s| s.block.date_time.as_str()).collect();
        assert_eq!(
            got,
            vec!["2025/06/10 & 9:30 AM", "2025/06/10 & 2:00 PM", "2025/06/12 & 9:00 AM"]
        );
    }
}
