//! Push notification subscription and delivery
//!
//! Wires a client up for server push: platform capability probing and
//! permission handling ([`platform`]), the application-server wire protocol
//! ([`api`]), server key decoding ([`keys`]), and the session-scoped
//! orchestration that ties them together ([`manager`]).

pub mod api;
pub mod keys;
pub mod manager;
pub mod platform;

pub use api::{
    HttpNotificationApi, NotificationConfig, NotificationGateway, PublicKeyResponse, SendRequest,
    SubscribeRequest,
};
pub use keys::decode_server_key;
pub use manager::SubscriptionManager;
pub use platform::{
    Capabilities, InMemoryPlatform, PermissionState, PromptAnswer, PushPlatform, PushSubscription,
    SubscriptionKeys,
};
