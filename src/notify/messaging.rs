// src/notify/messaging.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use super::NotificationError;

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotificationError>;
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    phone: &'a str,
    message: &'a str,
}

/// Chat gateway reached over `POST {base_url}/send/message`.
pub struct HttpMessageGateway {
    client: Client,
    base_url: String,
}

impl HttpMessageGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MessageGateway for HttpMessageGateway {
    async fn send(&self, phone: &str, message: &str) -> Result<(), NotificationError> {
        let url = format!("{}/send/message", self.base_url);
        debug!("Sending direct message via {}", url);

        let response = self
            .client
            .post(&url)
            .json(&SendMessageBody { phone, message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(phone, "direct message sent");
        Ok(())
    }
}

/// Used when no gateway URL is configured.
pub struct DisabledGateway;

#[async_trait]
impl MessageGateway for DisabledGateway {
    async fn send(&self, _phone: &str, _message: &str) -> Result<(), NotificationError> {
        Err(NotificationError::NotConfigured("messaging gateway"))
    }
}
