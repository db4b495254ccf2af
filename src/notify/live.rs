// src/notify/live.rs

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

pub const REFRESH: &str = "refresh";

const SUBSCRIBER_BUFFER: usize = 16;

/// Live subscribers keyed by handle. Register, unregister and broadcast all
/// go through the one mutex.
pub struct LiveRegistry {
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<String>>>,
    send_timeout: Duration,
}

pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<String>,
}

impl LiveRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    pub async fn register(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.subscribers.lock().await.insert(id, tx);
        debug!("Registered live subscriber {}", id);
        Subscription { id, receiver }
    }

    pub async fn unregister(&self, id: Uuid) {
        if self.subscribers.lock().await.remove(&id).is_some() {
            debug!("Unregistered live subscriber {}", id);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Sends `token` to every subscriber. One that is gone, or does not take
    /// the token within the send timeout, is dropped. Returns how many
    /// subscribers received it.
    pub async fn broadcast(&self, token: &str) -> usize {
        let mut subscribers = self.subscribers.lock().await;

        let sends = subscribers.iter().map(|(id, tx)| {
            let id = *id;
            let tx = tx.clone();
            let token = token.to_string();
            async move {
                match timeout(self.send_timeout, tx.send(token)).await {
                    Ok(Ok(())) => (id, true),
                    _ => (id, false),
                }
            }
        });
        let results = join_all(sends).await;

        let mut delivered = 0;
        for (id, ok) in results {
            if ok {
                delivered += 1;
            } else {
                subscribers.remove(&id);
                debug!("Evicted unresponsive live subscriber {}", id);
            }
        }
        delivered
    }
}

impl Default for LiveRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
