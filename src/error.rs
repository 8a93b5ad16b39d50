//! Error taxonomy for the push client.
//!
//! Every variant is recovered locally: the component that produces it records
//! a telemetry entry and shows a notice before handing it back to the caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// Push tokens are unavailable on simulators and emulators.
    #[error("Push notifications require a physical device")]
    NotAPhysicalDevice,

    #[error("Notification permission was not granted")]
    PermissionDenied,

    #[error("Device push token unavailable: {0}")]
    TokenUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    /// The backend answered with `success: false`.
    #[error("Backend rejected the request: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

impl SubscribeError {
    /// Malformed bodies are reported the same way as transport failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::MalformedResponse(_))
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Backend(#[from] SubscribeError),

    #[error("No device token available; restart the app to retry registration")]
    NoToken,

    #[error("Not subscribed to topic '{0}'")]
    NotSubscribed(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
