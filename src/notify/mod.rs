//! Fan-out of booking changes: live "refresh" tokens to connected staff
//! screens, push notifications to staff devices and direct text messages to
//! patients. Everything here runs after commit and never fails a booking.

pub mod live;
pub mod messaging;
pub mod push;
pub mod templates;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub use live::{LiveRegistry, Subscription, REFRESH};
pub use messaging::{DisabledGateway, HttpMessageGateway, MessageGateway};
pub use push::{DisabledPush, FcmPushClient, PushSender};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream rejected the message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{failed} of {total} push deliveries failed")]
    PartialDelivery { failed: usize, total: usize },
}

#[derive(Clone)]
pub struct ChangeNotifier {
    live: Arc<LiveRegistry>,
    push: Arc<dyn PushSender>,
    messages: Arc<dyn MessageGateway>,
}

impl ChangeNotifier {
    pub fn new(
        live: Arc<LiveRegistry>,
        push: Arc<dyn PushSender>,
        messages: Arc<dyn MessageGateway>,
    ) -> Self {
        Self {
            live,
            push,
            messages,
        }
    }

    pub async fn publish_refresh(&self) {
        let delivered = self.live.broadcast(REFRESH).await;
        debug!(delivered, "published refresh");
    }

    /// Push to staff devices. Failures are logged.
    pub async fn notify(&self, tokens: &[String], title: &str, body: &str) {
        if tokens.is_empty() {
            debug!(title, "no device tokens to notify");
            return;
        }
        if let Err(e) = self.push.send(tokens, title, body).await {
            warn!(error = %e, title, recipients = tokens.len(), "push notification failed");
        }
    }

    /// Sends a text message and reports the outcome.
    pub async fn send_direct_message(&self, phone: &str, body: &str) -> Result<(), NotificationError> {
        self.messages.send(phone, body).await
    }

    /// Fire-and-log variant used by booking transitions.
    pub async fn message_patient(&self, phone: &str, body: &str) {
        if let Err(e) = self.send_direct_message(phone, body).await {
            warn!(error = %e, phone, "direct message failed");
        }
    }
}
