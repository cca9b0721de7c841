//! Notification server gateway
//!
//! Three endpoints, JSON camelCase on the wire:
//!
//! - `GET  /api/notifications/public-key` → `{ "publicKey": <base64url> }`
//! - `POST /api/notifications/subscribe`  ← `{ "userId", "subscription" }`
//! - `POST /api/notifications/send`       ← `{ "userId", "title", "body", "icon", "url" }`
//!
//! No retries, no backoff; a 2xx means the server accepted the request, not
//! that anything was delivered.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::push::platform::PushSubscription;
use crate::types::{CanopyError, Result};

// ============================================================================
// Types
// ============================================================================

/// Notification server configuration
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Base URL of the notification server, no trailing slash
    pub base_url: String,
    /// Icon path attached to outgoing notifications
    pub default_icon: String,
    /// Click-through URL attached to outgoing notifications
    pub default_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            default_icon: "/icon.png".to_string(),
            default_url: "/".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Response of the public-key endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// Body of the subscribe endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub user_id: String,
    pub subscription: PushSubscription,
}

/// Body of the send endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub url: String,
}

// ============================================================================
// Gateway Trait (for dependency injection)
// ============================================================================

/// Trait for the server side of the push lifecycle (allows mocking in tests)
#[async_trait::async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Fetch the server's public push key (URL-safe base64)
    async fn fetch_public_key(&self) -> Result<String>;

    /// Upsert a user's subscription; the server keys records by user, so
    /// repeating the call never creates duplicates
    async fn upsert_subscription(
        &self,
        user_id: &str,
        subscription: &PushSubscription,
    ) -> Result<()>;

    /// Ask the server to push a notification to a user
    async fn send_notification(&self, request: &SendRequest) -> Result<()>;
}

// ============================================================================
// HTTP Gateway
// ============================================================================

/// Gateway over HTTP, for production use
pub struct HttpNotificationApi {
    config: NotificationConfig,
    http_client: reqwest::Client,
}

impl HttpNotificationApi {
    pub fn new(config: NotificationConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(NotificationConfig::default())
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait::async_trait]
impl NotificationGateway for HttpNotificationApi {
    async fn fetch_public_key(&self) -> Result<String> {
        let url = self.url("/api/notifications/public-key");
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| CanopyError::Network(format!("public key fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CanopyError::Network(format!(
                "public key fetch returned {}",
                response.status()
            )));
        }

        let parsed: PublicKeyResponse = response
            .json()
            .await
            .map_err(|e| CanopyError::Network(format!("public key response malformed: {}", e)))?;
        debug!("Fetched push public key");
        Ok(parsed.public_key)
    }

    async fn upsert_subscription(
        &self,
        user_id: &str,
        subscription: &PushSubscription,
    ) -> Result<()> {
        let url = self.url("/api/notifications/subscribe");
        let request = SubscribeRequest {
            user_id: user_id.to_string(),
            subscription: subscription.clone(),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CanopyError::Network(format!("subscription upsert failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CanopyError::Subscription(format!(
                "server rejected subscription upsert: {}",
                response.status()
            )));
        }

        info!(user_id = %user_id, "Subscription registered with server");
        Ok(())
    }

    async fn send_notification(&self, request: &SendRequest) -> Result<()> {
        let url = self.url("/api/notifications/send");
        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CanopyError::Network(format!("notification send failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CanopyError::Network(format!(
                "server rejected notification: {}",
                response.status()
            )));
        }

        debug!(user_id = %request.user_id, "Notification accepted by server");
        Ok(())
    }
}
