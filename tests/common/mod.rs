#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use clinic_booking::booking::datetime::ManualClock;
use clinic_booking::booking::{BookingService, Caller};
use clinic_booking::models::Therapist;
use clinic_booking::notify::{
    ChangeNotifier, LiveRegistry, MessageGateway, NotificationError, PushSender,
};
use clinic_booking::reminder::ReminderScheduler;
use clinic_booking::store::{BookingStore, MemoryStore};

pub const PHONE: &str = "+201234567890";
pub const SLOT: &str = "2025/06/10 & 10:00 AM";

/// Captures outbound text messages; can be switched to fail.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: AtomicBool,
}

impl RecordingGateway {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Rejected {
                status: 503,
                body: "gateway down".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(Vec<String>, String, String)>>,
}

impl RecordingPush {
    pub fn pushes(&self) -> Vec<(Vec<String>, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, tokens: &[String], title: &str, body: &str) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap()
            .push((tokens.to_vec(), title.to_string(), body.to_string()));
        Ok(())
    }
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|d| d.and_hms_opt(h, min, 0))
        .unwrap()
}

/// Service wired to an in-memory store, recording notifiers and a clock
/// pinned to 2025-06-01 09:00.
pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<RecordingGateway>,
    pub push: Arc<RecordingPush>,
    pub live: Arc<LiveRegistry>,
    pub clock: ManualClock,
    pub service: Arc<BookingService>,
    pub therapist: Therapist,
}

impl Harness {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let therapist = store.seed_therapist("Mona", None).await;
        store.seed_staff_device("staff-device-1", None).await;

        let gateway = Arc::new(RecordingGateway::default());
        let push = Arc::new(RecordingPush::default());
        let live = Arc::new(LiveRegistry::new(Duration::from_millis(50)));
        let clock = ManualClock::new(at(2025, 6, 1, 9, 0));

        let notifier = ChangeNotifier::new(live.clone(), push.clone(), gateway.clone());
        let service = Arc::new(BookingService::new(
            Arc::new(store.clone()),
            notifier,
            Arc::new(clock.clone()),
            14,
        ));

        Self {
            store,
            gateway,
            push,
            live,
            clock,
            service,
            therapist,
        }
    }

    pub fn reminders(&self) -> ReminderScheduler {
        let store: Arc<dyn BookingStore> = Arc::new(self.store.clone());
        ReminderScheduler::new(
            store,
            ChangeNotifier::new(self.live.clone(), self.push.clone(), self.gateway.clone()),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn staff(&self) -> Caller {
        Caller::staff(uuid::Uuid::new_v4(), None)
    }
}
