//! Capabilities the client needs from the host platform.
//!
//! The orchestrator only ever talks to the OS notification runtime through
//! [`PushPlatform`]; mobile shells implement it over their native bridges and
//! [`crate::headless::HeadlessPlatform`] implements it for desktop and CI use.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::{
    consts::{DEFAULT_CHANNEL_ACCENT, DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_VIBRATION_MS},
    model::{DevicePushToken, NotificationPayload},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::Undetermined => "undetermined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelImportance {
    Min,
    Low,
    Default,
    High,
    Max,
}

/// Android notification channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: ChannelImportance,
    pub vibration_pattern_ms: Vec<u64>,
    pub light_color: String,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self {
            id: DEFAULT_CHANNEL_ID.to_string(),
            name: DEFAULT_CHANNEL_ID.to_string(),
            importance: ChannelImportance::Max,
            vibration_pattern_ms: DEFAULT_CHANNEL_VIBRATION_MS.to_vec(),
            light_color: DEFAULT_CHANNEL_ACCENT.to_string(),
        }
    }
}

/// How a notification delivered while the app is active is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundPresentation {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
}

impl Default for ForegroundPresentation {
    fn default() -> Self {
        Self {
            show_alert: true,
            play_sound: false,
            set_badge: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Error,
}

/// One-shot user-visible message, the equivalent of an alert dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

pub trait NoticeSink: Send + Sync {
    fn show_notice(&self, notice: &Notice);
}

#[async_trait]
pub trait PushPlatform: NoticeSink {
    fn set_foreground_presentation(&self, presentation: ForegroundPresentation);

    async fn permission_status(&self) -> PermissionStatus;

    /// Shows the OS permission prompt. Called at most once per session.
    async fn request_permission(&self) -> PermissionStatus;

    async fn ensure_notification_channel(&self, channel: &NotificationChannel)
        -> Result<(), String>;

    async fn device_push_token(&self) -> Result<DevicePushToken, String>;

    /// Notifications delivered while the app is in the foreground. The
    /// observer stays registered until the returned stream is dropped.
    fn received_notifications(&self) -> BoxStream<'static, NotificationPayload>;

    /// Notifications the user tapped. Dropping the stream deregisters it.
    fn notification_responses(&self) -> BoxStream<'static, NotificationPayload>;
}
