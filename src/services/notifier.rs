// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notification delivery.
//!
//! Production delivery goes through the FCM HTTP v1 API using the service's
//! ambient Google credentials. Local runs log notifications instead.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const FCM_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Title sent when a user's energy is full.
pub const ENERGY_FULL_TITLE: &str = "⚡ 에너지가 가득 찼어요!";
/// Body sent when a user's energy is full.
pub const ENERGY_FULL_BODY: &str = "이제 다시 게임을 즐길 준비가 되었어요!";

/// A visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

impl PushNotification {
    pub fn energy_full() -> Self {
        Self {
            title: ENERGY_FULL_TITLE.to_string(),
            body: ENERGY_FULL_BODY.to_string(),
        }
    }
}

/// Delivers a notification to one device.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<()>;
}

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: &'a PushNotification,
}

#[derive(Deserialize)]
struct FcmResponse {
    name: Option<String>,
}

/// Firebase Cloud Messaging (HTTP v1) client.
pub struct FcmNotifier {
    send_url: String,
    http_client: reqwest::Client,
    token_generator: gcloud_sdk::GoogleAuthTokenGenerator,
}

impl FcmNotifier {
    /// Create a client authenticated with Application Default Credentials.
    pub async fn new(project_id: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(FCM_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("FCM HTTP client error: {}", e)))?;

        let token_generator = gcloud_sdk::GoogleAuthTokenGenerator::new(
            gcloud_sdk::TokenSourceType::Default,
            vec![FCM_SCOPE.to_string()],
        )
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("FCM credentials error: {}", e)))?;

        tracing::info!(project = project_id, "FCM notifier initialized");

        Ok(Self {
            send_url: format!(
                "https://fcm.googleapis.com/v1/projects/{}/messages:send",
                project_id
            ),
            http_client,
            token_generator,
        })
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<()> {
        let token = self
            .token_generator
            .create_token()
            .await
            .map_err(|e| AppError::Notification(format!("Failed to get access token: {}", e)))?;

        let request = FcmRequest {
            message: FcmMessage {
                token: device_token,
                notification,
            },
        };

        let response = self
            .http_client
            .post(&self.send_url)
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("FCM request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!(
                "FCM returned {}: {}",
                status, body
            )));
        }

        let sent: FcmResponse = response
            .json()
            .await
            .map_err(|e| AppError::Notification(format!("Invalid FCM response: {}", e)))?;

        tracing::debug!(message = ?sent.name, "Push notification sent");
        Ok(())
    }
}

/// Notifier for local development: logs instead of delivering.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<()> {
        let prefix: String = device_token.chars().take(8).collect();
        tracing::info!(
            token_prefix = %prefix,
            title = %notification.title,
            body = %notification.body,
            "Push notification (not delivered, push disabled)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcm_request_shape() {
        let notification = PushNotification::energy_full();
        let request = FcmRequest {
            message: FcmMessage {
                token: "device-token",
                notification: &notification,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "message": {
                    "token": "device-token",
                    "notification": {
                        "title": "⚡ 에너지가 가득 찼어요!",
                        "body": "이제 다시 게임을 즐길 준비가 되었어요!"
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let result = LogNotifier
            .send("abcdefghijklmnop", &PushNotification::energy_full())
            .await;
        assert!(result.is_ok());
    }
}
