// src/notify/push.rs

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::NotificationError;

pub const FCM_BASE_URL: &str = "https://fcm.googleapis.com";

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, tokens: &[String], title: &str, body: &str) -> Result<(), NotificationError>;
}

/// Firebase Cloud Messaging HTTP v1 client.
/// POST /v1/projects/{project_id}/messages:send, one message per device.
pub struct FcmPushClient {
    client: Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

impl FcmPushClient {
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::with_base_url(FCM_BASE_URL, project_id, access_token)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            access_token: access_token.into(),
        }
    }

    fn message(token: &str, title: &str, body: &str) -> Value {
        json!({
            "message": {
                "token": token,
                "notification": { "title": title, "body": body },
                "android": {
                    "priority": "high",
                    "notification": { "sound": "default" }
                },
                "apns": {
                    "headers": { "apns-priority": "10" },
                    "payload": {
                        "aps": {
                            "alert": { "title": title, "body": body },
                            "sound": "default"
                        }
                    }
                }
            }
        })
    }

    async fn send_one(&self, token: &str, title: &str, body: &str) -> Result<(), NotificationError> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&Self::message(token, title, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("FCM send failed: {} - {}", status, text);
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PushSender for FcmPushClient {
    async fn send(&self, tokens: &[String], title: &str, body: &str) -> Result<(), NotificationError> {
        match tokens {
            [] => Ok(()),
            [token] => {
                self.send_one(token, title, body).await?;
                info!(title, "push sent to 1 device");
                Ok(())
            }
            many => {
                let results = join_all(many.iter().map(|t| self.send_one(t, title, body))).await;
                let failed = results.iter().filter(|r| r.is_err()).count();
                debug!(title, total = many.len(), failed, "multicast push finished");
                if failed > 0 {
                    return Err(NotificationError::PartialDelivery {
                        failed,
                        total: many.len(),
                    });
                }
                info!(title, devices = many.len(), "push sent");
                Ok(())
            }
        }
    }
}

/// Used when FCM credentials are absent.
pub struct DisabledPush;

#[async_trait]
impl PushSender for DisabledPush {
    async fn send(&self, _tokens: &[String], _title: &str, _body: &str) -> Result<(), NotificationError> {
        Err(NotificationError::NotConfigured("push notifications"))
    }
}
