mod common;

use std::sync::Arc;

use clinic_booking::booking::service::{
    AcceptExtras, PackageSelection, SubmitRequest, MAX_OTP_ATTEMPTS,
};
use clinic_booking::booking::{slots, BookingError, BookingService, Caller, SlotDateTime};
use clinic_booking::models::{Appointment, AppointmentRequest, NewAppointment, Patient};
use clinic_booking::notify::{templates, ChangeNotifier, REFRESH};
use clinic_booking::store::{BookingStore, ScheduleRepository};
use uuid::Uuid;

use common::{Harness, PHONE, SLOT};

fn new_patient_request(therapist_id: Uuid, phone: &str, date_time: &str) -> SubmitRequest {
    SubmitRequest {
        date_time: date_time.to_string(),
        therapist_id,
        patient_name: "Sara".to_string(),
        phone_number: phone.to_string(),
        is_existing: false,
        patient_id: None,
        super_treatment_plan_description: None,
    }
}

async fn submit(h: &Harness, phone: &str, date_time: &str) -> AppointmentRequest {
    h.service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, phone, date_time),
            Caller::public(),
        )
        .await
        .expect("request should be accepted for submission")
}

async fn seed_appointment(h: &Harness, patient: &Patient, date_time: &str, reminder_sent: bool) -> Appointment {
    let mut uow = h.store.begin().await.unwrap();
    let schedule = uow.schedule_for(&h.therapist).await.unwrap();
    let (_, appointment) = slots::reserve_slot(
        uow.as_mut(),
        schedule.schedule_id,
        NewAppointment {
            date_time: SlotDateTime::parse(date_time).unwrap(),
            therapist_id: h.therapist.therapist_id,
            therapist_name: h.therapist.name.clone(),
            patient_id: patient.patient_id,
            patient_name: patient.name.clone(),
            price_cents: 0,
            is_paid: false,
            payment_method: None,
            notes: None,
            reminder_sent,
            clinic_group_id: None,
        },
    )
    .await
    .unwrap();
    uow.commit().await.unwrap();
    appointment
}

fn template_package(template_id: Uuid, discount_percent: f64) -> PackageSelection {
    PackageSelection {
        super_treatment_plan_id: Some(template_id),
        discount_percent,
        ..Default::default()
    }
}

/* -------------------------
   Walkthrough
--------------------------*/

#[tokio::test]
async fn new_patient_request_creates_patient_and_pending_request() {
    let h = Harness::new().await;

    let request = submit(&h, PHONE, SLOT).await;

    let state = h.store.snapshot().await;
    assert_eq!(state.patients.len(), 1, "a new patient is registered");
    let patient = state.patients.values().next().unwrap();
    assert_eq!(patient.phone, PHONE);
    assert!(patient.is_verified, "new patients are registered as verified");
    assert_eq!(request.patient_id, patient.patient_id);
    assert_eq!(request.date_time, SLOT);
    assert_eq!(state.requests.len(), 1);

    let messages = h.gateway.messages();
    assert_eq!(messages.len(), 1, "the verification code is texted");
    assert_eq!(messages[0].0, PHONE);
    assert!(messages[0].1.ends_with(&patient.otp));
}

#[tokio::test]
async fn accepting_a_request_books_an_unavailable_block() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;

    let accepted = h
        .service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap();

    let state = h.store.snapshot().await;
    assert!(state.requests.is_empty(), "the request is consumed");

    let schedule = state.schedule_of(h.therapist.therapist_id).unwrap();
    let blocks = state.blocks_on(schedule.schedule_id);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].date_time, SLOT);
    assert!(!blocks[0].is_available);

    let appointment = state.appointments.get(&accepted.appointment.appointment_id).unwrap();
    assert_eq!(appointment.time_block_id, blocks[0].time_block_id);
    assert_eq!(appointment.treatment_plan_id, None);
    assert!(appointment.reminder_sent, "future appointments skip the reminder");

    let messages = h.gateway.messages();
    assert_eq!(messages.len(), 2, "verification code, then confirmation");
    assert_eq!(messages[1].1, templates::confirmation(SLOT, "Mona"));

    let pushes = h.push.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, vec!["staff-device-1".to_string()]);
    assert_eq!(pushes[0].1, templates::TITLE_ACCEPTED);
}

#[tokio::test]
async fn second_request_for_the_same_slot_conflicts() {
    let h = Harness::new().await;
    submit(&h, PHONE, SLOT).await;

    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, "+201111111111", SLOT),
            Caller::public(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Conflict(_)), "got {err:?}");
    let state = h.store.snapshot().await;
    assert_eq!(state.requests.len(), 1);
    assert_eq!(state.patients.len(), 1, "the rejected submission leaves no patient behind");
}

#[tokio::test]
async fn package_from_template_is_discounted() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Knee rehab", 6, 60_000).await;
    let request = submit(&h, PHONE, SLOT).await;
    let accepted = h
        .service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap();

    let registered = h
        .service
        .register_package(
            accepted.appointment.appointment_id,
            template_package(template.super_treatment_plan_id, 10.0),
        )
        .await
        .unwrap();

    assert!(registered.created);
    assert_eq!(registered.plan.remaining, 6);
    assert_eq!(registered.plan.total_price_cents, 54_000);

    let state = h.store.snapshot().await;
    let appointment = state.appointments.get(&accepted.appointment.appointment_id).unwrap();
    assert_eq!(appointment.treatment_plan_id, Some(registered.plan.treatment_plan_id));

    let pushes = h.push.pushes();
    assert_eq!(pushes.last().unwrap().1, templates::TITLE_PACKAGE);
    assert!(pushes.last().unwrap().2.contains("540.00"));
}

#[tokio::test]
async fn mark_then_unmark_restores_remaining() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Back care", 6, 60_000).await;
    let request = submit(&h, PHONE, SLOT).await;
    let accepted = h
        .service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap();
    let appointment_id = accepted.appointment.appointment_id;
    h.service
        .register_package(appointment_id, template_package(template.super_treatment_plan_id, 0.0))
        .await
        .unwrap();

    let after_mark = h.service.mark_completed(appointment_id).await.unwrap();
    assert_eq!(after_mark.remaining, 5);

    let after_unmark = h.service.unmark_completed(appointment_id).await.unwrap();
    assert_eq!(after_unmark.remaining, 6);

    let state = h.store.snapshot().await;
    assert!(!state.appointments.get(&appointment_id).unwrap().is_completed);
}

#[tokio::test]
async fn reminder_goes_out_once() {
    let h = Harness::new().await;
    let patient = h.store.seed_patient("Omar", PHONE, true).await;
    let appointment = seed_appointment(&h, &patient, SLOT, false).await;
    h.clock.set(common::at(2025, 6, 10, 7, 0));

    let reminders = h.reminders();
    let first = reminders.run_once().await.unwrap();
    assert_eq!(first.matched, 1);
    assert_eq!(first.sent, 1);

    let messages = h.gateway.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, PHONE);
    assert!(messages[0].1.contains("10:00 AM"));

    let state = h.store.snapshot().await;
    assert!(state.appointments.get(&appointment.appointment_id).unwrap().reminder_sent);

    let second = reminders.run_once().await.unwrap();
    assert_eq!(second.matched, 0);
    assert_eq!(h.gateway.messages().len(), 1, "no second reminder");
}

/* -------------------------
   Submission rules
--------------------------*/

#[tokio::test]
async fn horizon_allows_exactly_fourteen_days() {
    let h = Harness::new().await;
    // now is 2025-06-01 09:00
    submit(&h, PHONE, "2025/06/15 & 9:00 AM").await;

    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, "+201111111111", "2025/06/15 & 9:01 AM"),
            Caller::public(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "got {err:?}");
}

#[tokio::test]
async fn oversized_horizon_does_not_overflow() {
    let h = Harness::new().await;
    let service = BookingService::new(
        Arc::new(h.store.clone()),
        ChangeNotifier::new(h.live.clone(), h.push.clone(), h.gateway.clone()),
        Arc::new(h.clock.clone()),
        i64::MAX,
    );

    service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, PHONE, "2099/01/01 & 9:00 AM"),
            Caller::public(),
        )
        .await
        .expect("an unbounded horizon admits any date");
}

#[tokio::test]
async fn staff_are_not_bound_by_the_horizon() {
    let h = Harness::new().await;
    let request = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, PHONE, "2025/09/01 & 11:00 AM"),
            h.staff(),
        )
        .await
        .unwrap();

    let state = h.store.snapshot().await;
    assert!(state.patients.get(&request.patient_id).unwrap().is_verified);
    assert!(h.gateway.messages().is_empty(), "no verification code for staff bookings");
}

#[tokio::test]
async fn one_booking_per_patient_per_day() {
    let h = Harness::new().await;
    submit(&h, PHONE, SLOT).await;

    let mut again = new_patient_request(h.therapist.therapist_id, PHONE, "2025/06/10 & 2:00 PM");
    again.is_existing = true;
    let err = h
        .service
        .submit_request(again.clone(), Caller::public())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)), "got {err:?}");

    again.date_time = "2025/06/11 & 2:00 PM".to_string();
    h.service
        .submit_request(again, Caller::public())
        .await
        .expect("another day is fine");
}

#[tokio::test]
async fn existing_flag_must_match_the_phone_registry() {
    let h = Harness::new().await;

    let mut unknown = new_patient_request(h.therapist.therapist_id, PHONE, SLOT);
    unknown.is_existing = true;
    let err = h
        .service
        .submit_request(unknown, Caller::public())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)), "got {err:?}");

    h.store.seed_patient("Sara", "+201111111111", true).await;
    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, "01111111111", SLOT),
            Caller::public(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)), "national form matches too: {err:?}");
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let h = Harness::new().await;

    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, PHONE, "2025-06-10 10:00"),
            Caller::public(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)), "got {err:?}");

    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, "+20abc", SLOT),
            Caller::public(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn public_submission_is_on_the_pending_list_right_away() {
    let h = Harness::new().await;
    h.gateway.set_failing(true);

    let request = submit(&h, PHONE, SLOT).await;

    let pending = h.service.list_pending_requests(h.staff()).await.unwrap();
    assert_eq!(pending.len(), 1, "listing does not wait for the texted code");
    assert_eq!(pending[0].request_id, request.request_id);
    h.service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .expect("staff can accept before the phone is confirmed");
}

#[tokio::test]
async fn verification_code_is_spent_on_success() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;

    let err = h
        .service
        .verify_patient_phone(request.request_id, "not-the-code")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)), "got {err:?}");

    let otp = h.store.snapshot().await.patients.get(&request.patient_id).unwrap().otp.clone();
    let patient = h
        .service
        .verify_patient_phone(request.request_id, &otp)
        .await
        .unwrap();
    assert!(patient.is_verified);

    let stored = h.store.snapshot().await.patients.get(&request.patient_id).unwrap().clone();
    assert!(stored.otp.is_empty());
    assert_eq!(stored.otp_attempts, 0);

    let err = h
        .service
        .verify_patient_phone(request.request_id, &otp)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "a code works once: {err:?}");
}

#[tokio::test]
async fn repeated_wrong_codes_lock_verification() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;
    let otp = h.store.snapshot().await.patients.get(&request.patient_id).unwrap().otp.clone();
    let wrong = if otp == "000000" { "111111" } else { "000000" };

    for attempt in 1..MAX_OTP_ATTEMPTS {
        let err = h
            .service
            .verify_patient_phone(request.request_id, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)), "attempt {attempt}: {err:?}");
    }
    let err = h
        .service
        .verify_patient_phone(request.request_id, wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "last attempt locks: {err:?}");

    let stored = h.store.snapshot().await.patients.get(&request.patient_id).unwrap().clone();
    assert_eq!(stored.otp_attempts, MAX_OTP_ATTEMPTS);
    assert!(stored.otp.is_empty());

    let err = h
        .service
        .verify_patient_phone(request.request_id, &otp)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "the real code no longer works: {err:?}");
}

#[tokio::test]
async fn submission_publishes_a_refresh() {
    let h = Harness::new().await;
    let mut sub = h.live.register().await;

    submit(&h, PHONE, SLOT).await;

    assert_eq!(sub.receiver.recv().await.as_deref(), Some(REFRESH));
}

/* -------------------------
   Request lifecycle
--------------------------*/

#[tokio::test]
async fn a_request_is_accepted_or_rejected_only_once() {
    let h = Harness::new().await;
    let first = submit(&h, PHONE, SLOT).await;
    let second = submit(&h, "+201111111111", "2025/06/10 & 11:00 AM").await;

    h.service
        .accept_request(first.request_id, AcceptExtras::default())
        .await
        .unwrap();
    let err = h
        .service
        .accept_request(first.request_id, AcceptExtras::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)), "got {err:?}");

    h.service.reject_request(second.request_id).await.unwrap();
    let err = h
        .service
        .accept_request(second.request_id, AcceptExtras::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)), "got {err:?}");

    let state = h.store.snapshot().await;
    assert!(state.requests.is_empty());
    assert_eq!(state.appointments.len(), 1);
}

#[tokio::test]
async fn rejection_notifies_staff_and_patient() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;

    h.service.reject_request(request.request_id).await.unwrap();

    let messages = h.gateway.messages();
    assert_eq!(messages.last().unwrap().1, templates::rejection());
    let pushes = h.push.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].1, templates::TITLE_REJECTED);
}

#[tokio::test]
async fn opened_slot_cannot_be_requested() {
    let h = Harness::new().await;
    h.service
        .open_slots(h.therapist.therapist_id, vec![SLOT.to_string()], h.staff())
        .await
        .unwrap();

    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, PHONE, SLOT),
            Caller::public(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Conflict(_)), "got {err:?}");
    assert!(h.store.snapshot().await.requests.is_empty());
}

#[tokio::test]
async fn accepting_over_a_slot_opened_later_conflicts() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;
    let opened = h
        .service
        .open_slots(h.therapist.therapist_id, vec![SLOT.to_string()], h.staff())
        .await
        .unwrap();

    let err = h
        .service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)), "got {err:?}");

    let state = h.store.snapshot().await;
    assert_eq!(state.requests.len(), 1, "the request stays pending");
    assert!(state.appointments.is_empty());
    let block = state.time_blocks.get(&opened[0].time_block_id).unwrap();
    assert!(block.is_available, "the opened block is untouched");
}

#[tokio::test]
async fn booked_slot_cannot_be_requested_again() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;
    h.service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap();

    let err = h
        .service
        .submit_request(
            new_patient_request(h.therapist.therapist_id, "+201111111111", SLOT),
            Caller::public(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)), "got {err:?}");
}

/* -------------------------
   Atomicity
--------------------------*/

#[tokio::test]
async fn failed_accept_leaves_no_partial_state() {
    for step in [
        "find_slot",
        "insert_time_block",
        "insert_appointment",
        "delete_request",
        "staff_device_tokens",
        "commit",
    ] {
        let h = Harness::new().await;
        let request = submit(&h, PHONE, SLOT).await;
        let messages_before = h.gateway.messages().len();

        h.store.fail_on(step);
        let err = h
            .service
            .accept_request(request.request_id, AcceptExtras::default())
            .await
            .unwrap_err();
        h.store.clear_faults();

        assert!(matches!(err, BookingError::Storage(_)), "{step}: got {err:?}");
        let state = h.store.snapshot().await;
        assert!(state.requests.contains_key(&request.request_id), "{step}: request kept");
        assert!(state.time_blocks.is_empty(), "{step}: no block written");
        assert!(state.appointments.is_empty(), "{step}: no appointment written");
        assert_eq!(h.gateway.messages().len(), messages_before, "{step}: nothing sent");
        assert!(h.push.pushes().is_empty(), "{step}: nothing pushed");

        h.service
            .accept_request(request.request_id, AcceptExtras::default())
            .await
            .unwrap_or_else(|e| panic!("{step}: retry after fault should succeed: {e}"));
    }
}

#[tokio::test]
async fn failed_package_removal_keeps_everything() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Shoulder", 4, 40_000).await;
    let request = submit(&h, PHONE, SLOT).await;
    let accepted = h
        .service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap();
    let registered = h
        .service
        .register_package(
            accepted.appointment.appointment_id,
            template_package(template.super_treatment_plan_id, 0.0),
        )
        .await
        .unwrap();

    h.store.fail_on("delete_plan");
    let err = h
        .service
        .remove_package(registered.plan.treatment_plan_id)
        .await
        .unwrap_err();
    h.store.clear_faults();
    assert!(matches!(err, BookingError::Storage(_)));

    let state = h.store.snapshot().await;
    assert_eq!(state.plans.len(), 1);
    assert_eq!(state.appointments.len(), 1);
    assert_eq!(state.time_blocks.len(), 1);
}

/* -------------------------
   Packages and cancellations
--------------------------*/

#[tokio::test]
async fn removing_a_package_removes_its_appointments_and_blocks() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Shoulder", 4, 40_000).await;
    let patient = h.store.seed_patient("Omar", PHONE, true).await;
    let first = seed_appointment(&h, &patient, SLOT, true).await;
    let second = seed_appointment(&h, &patient, "2025/06/12 & 10:00 AM", true).await;
    let unrelated = seed_appointment(&h, &patient, "2025/06/13 & 10:00 AM", true).await;

    let registered = h
        .service
        .register_package(first.appointment_id, template_package(template.super_treatment_plan_id, 0.0))
        .await
        .unwrap();
    let plan_id = registered.plan.treatment_plan_id;
    let reused = h
        .service
        .register_package(
            second.appointment_id,
            PackageSelection {
                treatment_plan_id: Some(plan_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!reused.created);
    assert_eq!(h.service.package_appointments(plan_id).await.unwrap().len(), 2);

    let removed = h.service.remove_package(plan_id).await.unwrap();
    assert_eq!(removed, 2);

    let state = h.store.snapshot().await;
    assert!(state.plans.is_empty());
    assert_eq!(state.appointments.len(), 1);
    assert!(state.appointments.contains_key(&unrelated.appointment_id));
    assert_eq!(state.time_blocks.len(), 1);
}

#[tokio::test]
async fn package_of_another_patient_is_refused() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Shoulder", 4, 40_000).await;
    let omar = h.store.seed_patient("Omar", PHONE, true).await;
    let sara = h.store.seed_patient("Sara", "+201111111111", true).await;
    let omars = seed_appointment(&h, &omar, SLOT, true).await;
    let saras = seed_appointment(&h, &sara, "2025/06/11 & 10:00 AM", true).await;

    let plan = h
        .service
        .register_package(omars.appointment_id, template_package(template.super_treatment_plan_id, 0.0))
        .await
        .unwrap()
        .plan;

    let err = h
        .service
        .register_package(
            saras.appointment_id,
            PackageSelection {
                treatment_plan_id: Some(plan.treatment_plan_id),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "got {err:?}");

    let err = h
        .service
        .register_package(omars.appointment_id, template_package(template.super_treatment_plan_id, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)), "already registered: {err:?}");
}

#[tokio::test]
async fn discount_out_of_range_is_rejected() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Shoulder", 4, 40_000).await;
    let patient = h.store.seed_patient("Omar", PHONE, true).await;
    let appointment = seed_appointment(&h, &patient, SLOT, true).await;

    for discount in [-1.0, 100.5, f64::NAN] {
        let err = h
            .service
            .register_package(
                appointment.appointment_id,
                template_package(template.super_treatment_plan_id, discount),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)), "{discount}: got {err:?}");
    }
    assert!(h.store.snapshot().await.plans.is_empty());
}

#[tokio::test]
async fn sessions_cannot_go_below_zero() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Single visit", 1, 10_000).await;
    let patient = h.store.seed_patient("Omar", PHONE, true).await;
    let first = seed_appointment(&h, &patient, SLOT, true).await;
    let second = seed_appointment(&h, &patient, "2025/06/11 & 10:00 AM", true).await;
    let unassigned = seed_appointment(&h, &patient, "2025/06/12 & 10:00 AM", true).await;

    let plan_id = h
        .service
        .register_package(first.appointment_id, template_package(template.super_treatment_plan_id, 0.0))
        .await
        .unwrap()
        .plan
        .treatment_plan_id;
    h.service
        .register_package(
            second.appointment_id,
            PackageSelection {
                treatment_plan_id: Some(plan_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(h.service.mark_completed(first.appointment_id).await.unwrap().remaining, 0);
    // repeated mark is a no-op
    assert_eq!(h.service.mark_completed(first.appointment_id).await.unwrap().remaining, 0);

    let err = h.service.mark_completed(second.appointment_id).await.unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "got {err:?}");

    let err = h.service.mark_completed(unassigned.appointment_id).await.unwrap_err();
    assert!(matches!(err, BookingError::Policy(_)), "no package: {err:?}");

    let state = h.store.snapshot().await;
    assert!(!state.appointments.get(&second.appointment_id).unwrap().is_completed);
}

#[tokio::test]
async fn payment_and_referral_updates() {
    let h = Harness::new().await;
    let template = h.store.seed_template("Shoulder", 4, 60_000).await;
    let referral = h.store.seed_referral("Dr. Hany", 5.0).await;
    let patient = h.store.seed_patient("Omar", PHONE, true).await;
    let appointment = seed_appointment(&h, &patient, SLOT, true).await;
    let plan_id = h
        .service
        .register_package(appointment.appointment_id, template_package(template.super_treatment_plan_id, 0.0))
        .await
        .unwrap()
        .plan
        .treatment_plan_id;

    let paid = h
        .service
        .set_package_paid(plan_id, Some("cash".to_string()))
        .await
        .unwrap();
    assert!(paid.is_paid);
    assert_eq!(paid.payment_method.as_deref(), Some("cash"));

    let unpaid = h.service.clear_package_paid(plan_id).await.unwrap();
    assert!(!unpaid.is_paid);

    let repriced = h
        .service
        .assign_referral(plan_id, Some(referral.referral_id), 10.0)
        .await
        .unwrap();
    assert_eq!(repriced.total_price_cents, 54_000);
    assert_eq!(repriced.referral_cashback_cents, 2_700);
    assert_eq!(repriced.referral_id, Some(referral.referral_id));

    let packages = h.service.patient_packages(patient.patient_id).await.unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].total_price_cents, 54_000);
}

#[tokio::test]
async fn cancelling_an_appointment_notifies_and_frees_the_slot() {
    let h = Harness::new().await;
    let patient = h.store.seed_patient("Omar", PHONE, true).await;
    let appointment = seed_appointment(&h, &patient, SLOT, true).await;

    let removed = h
        .service
        .remove_appointment(appointment.time_block_id)
        .await
        .unwrap();
    assert_eq!(removed.map(|a| a.appointment_id), Some(appointment.appointment_id));

    let state = h.store.snapshot().await;
    assert!(state.time_blocks.is_empty());
    assert!(state.appointments.is_empty());

    assert_eq!(h.gateway.messages(), vec![(PHONE.to_string(), templates::cancellation())]);
    let pushes = h.push.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].1, templates::TITLE_CANCELLED);
    assert_eq!(pushes[0].2, templates::cancelled_push("Omar", SLOT));

    let err = h
        .service
        .remove_appointment(appointment.time_block_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)), "got {err:?}");

    h.service
        .submit_request(
            SubmitRequest {
                is_existing: true,
                ..new_patient_request(h.therapist.therapist_id, PHONE, SLOT)
            },
            Caller::public(),
        )
        .await
        .expect("the slot is free again");
}

#[tokio::test]
async fn patient_bookings_lists_requests_and_appointments() {
    let h = Harness::new().await;
    let request = submit(&h, PHONE, SLOT).await;
    let accepted = h
        .service
        .accept_request(request.request_id, AcceptExtras::default())
        .await
        .unwrap();
    let next = h
        .service
        .submit_request(
            SubmitRequest {
                is_existing: true,
                ..new_patient_request(h.therapist.therapist_id, PHONE, "2025/06/11 & 10:00 AM")
            },
            Caller::public(),
        )
        .await
        .unwrap();

    let bookings = h.service.patient_bookings(request.patient_id).await.unwrap();
    assert_eq!(bookings.appointments.len(), 1);
    assert_eq!(bookings.appointments[0].appointment_id, accepted.appointment.appointment_id);
    assert_eq!(bookings.requests.len(), 1);
    assert_eq!(bookings.requests[0].request_id, next.request_id);

    let unassigned = h.service.list_unassigned_appointments(h.staff()).await.unwrap();
    assert_eq!(unassigned.len(), 1);
}
