//! Client-side lifecycle for topic-based push notifications.
//!
//! [`PushLifecycle`] acquires notification permission and a device push
//! token, subscribes the device to a default topic on the notification
//! backend, captures every notification the platform delivers, and keeps a
//! bounded debug telemetry map for operators. Platform capabilities sit
//! behind [`PushPlatform`].

pub mod acquire;
pub mod backend;
pub mod config;
pub mod consts;
pub mod endpoint;
pub mod error;
pub mod headless;
pub mod lifecycle;
pub mod listener;
pub mod model;
pub mod platform;
pub mod state;
pub mod subscription;
pub mod telemetry;

pub use config::{ClientConfig, Os, RuntimeEnvironment};
pub use endpoint::{EndpointSource, ServerEndpoint};
pub use error::{AcquireError, ClientError, SubscribeError};
pub use lifecycle::PushLifecycle;
pub use model::{
    DevicePushToken, DeviceToken, NotificationPayload, NotificationRecord, NotificationSource,
    TokenKind, Topic, TopicMessage,
};
pub use platform::{Notice, NoticeKind, NoticeSink, PermissionStatus, PushPlatform};
pub use state::{ClientSnapshot, Phase};
pub use telemetry::TelemetrySnapshot;

pub(crate) fn truncate_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
