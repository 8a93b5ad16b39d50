use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::consts::{DEFAULT_TOPIC, TOKEN_PREVIEW_CHARS};

/// Opaque push token issued by the platform's push transport.
///
/// `Debug` and `Display` only ever show [`DeviceToken::preview`]; call
/// [`DeviceToken::as_str`] when the full value is required on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceToken(String);

impl DeviceToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn preview(&self) -> String {
        let head: String = self.0.chars().take(TOKEN_PREVIEW_CHARS).collect();
        if self.len() <= TOKEN_PREVIEW_CHARS {
            // Short tokens would be shown in full, mask them entirely.
            return "*".repeat(self.len());
        }
        format!("{head}...")
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({}, len={})", self.preview(), self.len())
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Fcm,
    Apns,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Fcm => "fcm",
            TokenKind::Apns => "apns",
        }
    }
}

/// Token as handed back by the platform push service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePushToken {
    pub kind: TokenKind,
    pub data: DeviceToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Topic {
    fn default() -> Self {
        Self(DEFAULT_TOPIC.to_string())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSource {
    Foreground,
    Background,
}

/// Content of a notification event as the platform runtime reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Map<String, Value>,
    pub timestamp: String,
    pub user_tapped: bool,
    pub source: NotificationSource,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TopicRequestWire<'a> {
    pub(crate) token: &'a str,
    pub(crate) topic: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SendToTopicWire<'a> {
    pub(crate) topic: &'a str,
    pub(crate) title: &'a str,
    pub(crate) body: &'a str,
    pub(crate) data: &'a Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BackendReplyWire {
    pub(crate) success: bool,
    pub(crate) error: Option<String>,
    pub(crate) id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HealthReplyWire {
    pub(crate) message: String,
}

/// A topic message the operator asks the backend to fan out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: Topic,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}
