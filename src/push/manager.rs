//! Subscription manager - the push precondition chain
//!
//! Drives everything a server needs before it can push to this client:
//! capability probe, permission, cache-context registration, key fetch, and
//! the subscription upsert. One manager instance is one session; the cached
//! server key and registration handle live on the instance and die with it.
//!
//! Ordering rules worth keeping in mind:
//! - `Denied` permission is terminal, the prompt is never re-shown
//! - `subscribe` fails closed when no registration has been made
//! - concurrent `subscribe` calls are serialized per instance, so only one
//!   platform subscription is ever created

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::cache::worker::WorkerRegistration;
use crate::push::api::{NotificationGateway, SendRequest};
use crate::push::keys::decode_server_key;
use crate::push::platform::{PermissionState, PushPlatform, PushSubscription};
use crate::types::{CanopyError, Result};

/// Session-scoped notification orchestration
pub struct SubscriptionManager<P: PushPlatform, G: NotificationGateway> {
    platform: Arc<P>,
    gateway: Arc<G>,
    /// Defaults attached to outgoing notifications
    default_icon: String,
    default_url: String,
    /// Server push key, fetched once per session
    public_key: RwLock<Option<String>>,
    /// Guards the first key fetch
    key_fetch: Mutex<()>,
    /// Cache-context registration, once made
    registration: RwLock<Option<Arc<WorkerRegistration>>>,
    /// Serializes subscribe calls on this instance
    subscribing: Mutex<()>,
}

impl<P: PushPlatform, G: NotificationGateway> SubscriptionManager<P, G> {
    pub fn new(platform: Arc<P>, gateway: Arc<G>) -> Self {
        Self {
            platform,
            gateway,
            default_icon: "/icon.png".to_string(),
            default_url: "/".to_string(),
            public_key: RwLock::new(None),
            key_fetch: Mutex::new(()),
            registration: RwLock::new(None),
            subscribing: Mutex::new(()),
        }
    }

    pub fn with_notification_defaults(
        mut self,
        icon: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.default_icon = icon.into();
        self.default_url = url.into();
        self
    }

    /// Capability probe. Pure; no prompting, no side effects.
    pub fn is_supported(&self) -> bool {
        self.platform.capabilities().supports_push()
    }

    /// Current permission state, without prompting
    pub async fn permission_state(&self) -> PermissionState {
        self.platform.permission_state().await
    }

    /// Obtain notification permission. Denied is terminal: the prompt is
    /// never shown again once the user has declined.
    pub async fn request_permission(&self) -> Result<()> {
        if !self.is_supported() {
            return Err(CanopyError::Unsupported(
                "notifications are not available on this platform".into(),
            ));
        }

        match self.platform.permission_state().await {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => Err(CanopyError::PermissionDenied(
                "notification permission was denied earlier, not re-prompting".into(),
            )),
            PermissionState::Default => {
                let state = self.platform.request_permission().await?;
                if state.is_granted() {
                    info!("Notification permission granted");
                    Ok(())
                } else {
                    Err(CanopyError::PermissionDenied(format!(
                        "permission prompt ended in {}",
                        state
                    )))
                }
            }
        }
    }

    /// Register the cache context. Idempotent: repeated calls return the
    /// same registration.
    pub async fn register_worker(&self) -> Result<Arc<WorkerRegistration>> {
        if let Some(existing) = self.registration.read().await.as_ref() {
            return Ok(existing.clone());
        }

        // The platform registrar is itself idempotent, so a racing second
        // call converges on the same registration.
        let registration = self.platform.register_worker().await?;
        info!(scope = %registration.scope(), "Cache context registered");
        *self.registration.write().await = Some(registration.clone());
        Ok(registration)
    }

    /// The server's push key, fetched once and cached for the session
    pub async fn public_key(&self) -> Result<String> {
        if let Some(key) = self.public_key.read().await.as_ref() {
            return Ok(key.clone());
        }

        let _guard = self.key_fetch.lock().await;

        // Double-check: another caller may have fetched while we waited
        if let Some(key) = self.public_key.read().await.as_ref() {
            return Ok(key.clone());
        }

        let key = self.gateway.fetch_public_key().await?;
        *self.public_key.write().await = Some(key.clone());
        debug!("Cached push public key for this session");
        Ok(key)
    }

    /// Create (or reuse) the platform push subscription and upsert it for
    /// `user_id`. Fails closed when no registration exists.
    pub async fn subscribe(&self, user_id: &str) -> Result<PushSubscription> {
        let _guard = self.subscribing.lock().await;

        if self.registration.read().await.is_none() {
            return Err(CanopyError::Registration(
                "subscribe requires a registered cache context".into(),
            ));
        }

        let subscription = match self.platform.current_subscription().await? {
            Some(existing) => {
                debug!("Reusing existing push subscription");
                existing
            }
            None => {
                let key = self.public_key().await?;
                let raw_key = decode_server_key(&key)?;
                self.platform.create_subscription(&raw_key).await?
            }
        };

        self.gateway
            .upsert_subscription(user_id, &subscription)
            .await?;
        info!(user_id = %user_id, endpoint = %subscription.endpoint, "Push subscription in place");
        Ok(subscription)
    }

    /// Whether a push subscription currently exists for this context.
    /// Never prompts and never calls the application server; a platform
    /// error reads as "not subscribed".
    pub async fn is_subscribed(&self) -> bool {
        match self.platform.current_subscription().await {
            Ok(subscription) => subscription.is_some(),
            Err(e) => {
                debug!(error = %e, "Subscription check failed, reading as not subscribed");
                false
            }
        }
    }

    /// The full chain: probe → permission → registration → subscribe.
    /// Short-circuits on the first failure; every step is idempotent, so
    /// there is nothing to roll back.
    pub async fn setup_notifications(&self, user_id: &str) -> Result<PushSubscription> {
        if !self.is_supported() {
            return Err(CanopyError::Unsupported(
                "push notifications are not supported here".into(),
            ));
        }
        self.request_permission().await?;
        self.register_worker().await?;
        let subscription = self.subscribe(user_id).await?;
        info!(user_id = %user_id, "Notification setup complete");
        Ok(subscription)
    }

    /// Ask the server to push a canned test notification
    pub async fn send_test_notification(&self, user_id: &str) -> Result<()> {
        self.notify_user(user_id, "Test notification", "Push delivery is working")
            .await
    }

    /// Ask the server to push a notification to a user. Success means the
    /// server accepted the request, not that it was delivered.
    pub async fn notify_user(&self, user_id: &str, title: &str, body: &str) -> Result<()> {
        let request = SendRequest {
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            icon: self.default_icon.clone(),
            url: self.default_url.clone(),
        };
        self.gateway.send_notification(&request).await
    }
}
