//! Platform seam for notifications and push
//!
//! Everything the host owns sits behind `PushPlatform`: capability probing,
//! the permission prompt, cache-context registration, and the push
//! registrar. The subscription manager never touches host primitives
//! directly, which keeps the precondition chain testable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cache::worker::{WorkerRegistration, WorkerRegistry};
use crate::types::{CanopyError, Result};

// ============================================================================
// Types
// ============================================================================

/// Notification permission as the platform reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Never decided; prompting is allowed
    Default,
    Granted,
    /// Terminal until the user flips it manually; never re-prompt
    Denied,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, PermissionState::Denied)
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        write!(f, "{}", label)
    }
}

/// What the host exposes for the notification stack
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub notifications: bool,
    pub service_worker: bool,
    pub push_manager: bool,
}

impl Capabilities {
    /// Everything present
    pub fn full() -> Self {
        Self {
            notifications: true,
            service_worker: true,
            push_manager: true,
        }
    }

    /// Nothing present
    pub fn none() -> Self {
        Self {
            notifications: false,
            service_worker: false,
            push_manager: false,
        }
    }

    /// The whole push stack is required; a partial host counts as
    /// unsupported.
    pub fn supports_push(&self) -> bool {
        self.notifications && self.service_worker && self.push_manager
    }
}

/// Encryption keys of a push subscription, as the server stores them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Platform-issued push subscription: the delivery endpoint plus keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

// ============================================================================
// Platform Trait (for dependency injection)
// ============================================================================

/// Trait over the host's notification primitives (allows mocking in tests)
#[async_trait::async_trait]
pub trait PushPlatform: Send + Sync {
    /// Probe what the host exposes. Pure, no side effects.
    fn capabilities(&self) -> Capabilities;

    /// Current permission state, without prompting
    async fn permission_state(&self) -> PermissionState;

    /// Show the permission prompt and return the resulting state. Callers
    /// must not invoke this when the state is already terminal.
    async fn request_permission(&self) -> Result<PermissionState>;

    /// Register the cache context, or return its existing registration
    async fn register_worker(&self) -> Result<Arc<WorkerRegistration>>;

    /// Create a push subscription for `server_key`, or return the existing
    /// one for this context
    async fn create_subscription(&self, server_key: &[u8]) -> Result<PushSubscription>;

    /// Subscription currently held by this context, if any
    async fn current_subscription(&self) -> Result<Option<PushSubscription>>;
}

// ============================================================================
// In-Memory Platform
// ============================================================================

/// How the in-memory platform answers a permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Grant,
    Deny,
    /// Prompt closed without a decision; state stays Default
    Dismiss,
}

/// Deterministic platform implementation for the dev harness and tests
pub struct InMemoryPlatform {
    capabilities: Capabilities,
    registry: Arc<WorkerRegistry>,
    permission: RwLock<PermissionState>,
    prompt_answer: PromptAnswer,
    subscription: RwLock<Option<PushSubscription>>,
}

impl InMemoryPlatform {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            capabilities: Capabilities::full(),
            registry,
            permission: RwLock::new(PermissionState::Default),
            prompt_answer: PromptAnswer::Grant,
            subscription: RwLock::new(None),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_prompt_answer(mut self, answer: PromptAnswer) -> Self {
        self.prompt_answer = answer;
        self
    }

    /// Preset the permission state, e.g. a previously denied session
    pub fn with_permission(self, state: PermissionState) -> Self {
        Self {
            permission: RwLock::new(state),
            ..self
        }
    }
}

#[async_trait::async_trait]
impl PushPlatform for InMemoryPlatform {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn permission_state(&self) -> PermissionState {
        *self.permission.read().await
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        let mut permission = self.permission.write().await;
        // Only an undecided state prompts; decided states are sticky
        if *permission == PermissionState::Default {
            *permission = match self.prompt_answer {
                PromptAnswer::Grant => PermissionState::Granted,
                PromptAnswer::Deny => PermissionState::Denied,
                PromptAnswer::Dismiss => PermissionState::Default,
            };
        }
        Ok(*permission)
    }

    async fn register_worker(&self) -> Result<Arc<WorkerRegistration>> {
        self.registry.register().await
    }

    async fn create_subscription(&self, server_key: &[u8]) -> Result<PushSubscription> {
        if server_key.is_empty() {
            return Err(CanopyError::Subscription(
                "application server key is empty".into(),
            ));
        }

        let mut slot = self.subscription.write().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let subscription = PushSubscription {
            endpoint: format!("https://push.invalid/{}", uuid::Uuid::new_v4()),
            keys: SubscriptionKeys {
                p256dh: uuid::Uuid::new_v4().simple().to_string(),
                auth: uuid::Uuid::new_v4().simple().to_string(),
            },
        };
        *slot = Some(subscription.clone());
        Ok(subscription)
    }

    async fn current_subscription(&self) -> Result<Option<PushSubscription>> {
        Ok(self.subscription.read().await.clone())
    }
}
