use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    config::{Os, RuntimeEnvironment},
    consts::{NOTICE_MAX_CHARS, TELEMETRY_MAX_CHARS},
    error::AcquireError,
    model::DevicePushToken,
    now_iso,
    platform::{ForegroundPresentation, Notice, NotificationChannel, PushPlatform},
    state::SessionStore,
    telemetry::keys,
    truncate_message,
};

/// Walks the permission prompt and token request for one session.
pub struct Acquirer<'a, P: PushPlatform + ?Sized> {
    platform: &'a P,
    env: &'a RuntimeEnvironment,
    store: &'a SessionStore,
}

impl<'a, P: PushPlatform + ?Sized> Acquirer<'a, P> {
    pub fn new(platform: &'a P, env: &'a RuntimeEnvironment, store: &'a SessionStore) -> Self {
        Self {
            platform,
            env,
            store,
        }
    }

    pub async fn acquire(&self) -> Result<DevicePushToken, AcquireError> {
        self.ensure_permission().await?;
        self.fetch_token().await
    }

    pub async fn ensure_permission(&self) -> Result<(), AcquireError> {
        self.platform
            .set_foreground_presentation(ForegroundPresentation::default());

        if !self.env.is_physical_device {
            return Err(self.fail(AcquireError::NotAPhysicalDevice));
        }

        let existing = self.platform.permission_status().await;
        debug!(status = existing.as_str(), "existing notification permission");
        let status = if existing.is_granted() {
            existing
        } else {
            self.platform.request_permission().await
        };
        self.store.record(keys::PERMISSION_STATUS, status.as_str());

        if !status.is_granted() {
            return Err(self.fail(AcquireError::PermissionDenied));
        }
        info!("notification permission granted");
        Ok(())
    }

    pub async fn fetch_token(&self) -> Result<DevicePushToken, AcquireError> {
        if self.env.os == Os::Android {
            let channel = NotificationChannel::default();
            if let Err(error) = self.platform.ensure_notification_channel(&channel).await {
                // Token retrieval still works without the channel; delivery
                // falls back to the platform's default channel.
                warn!(channel = %channel.id, "failed to configure notification channel: {error}");
                self.store
                    .record(keys::CHANNEL_ERROR, truncate_message(&error, TELEMETRY_MAX_CHARS));
            }
        }

        let token = match self.platform.device_push_token().await {
            Ok(token) if !token.data.is_empty() => token,
            Ok(_) => {
                return Err(self.fail(AcquireError::TokenUnavailable(
                    "Push service returned an empty token".to_string(),
                )))
            }
            Err(error) => return Err(self.fail(AcquireError::TokenUnavailable(error))),
        };

        info!(
            kind = token.kind.as_str(),
            len = token.data.len(),
            preview = %token.data.preview(),
            "device push token received"
        );
        self.store.update(|state| {
            state.telemetry.record(keys::TOKEN_TYPE, json!(token.kind.as_str()));
            state.telemetry.record(keys::TOKEN_LENGTH, json!(token.data.len()));
            state
                .telemetry
                .record(keys::TOKEN_PREVIEW, json!(token.data.preview()));
            state.telemetry.record(keys::TOKEN_RECEIVED_AT, json!(now_iso()));
        });
        Ok(token)
    }

    fn fail(&self, error: AcquireError) -> AcquireError {
        warn!("push registration failed: {error}");
        self.store
            .record(keys::ACQUIRE_ERROR, truncate_message(&error.to_string(), TELEMETRY_MAX_CHARS));
        let notice = match &error {
            AcquireError::NotAPhysicalDevice => Notice::error(
                "Physical device required",
                "Push notifications only work on a physical device.",
            ),
            AcquireError::PermissionDenied => Notice::error(
                "Permission required",
                "Notification permission was not granted. Enable it in system settings and restart the app.",
            ),
            AcquireError::TokenUnavailable(message) => Notice::error(
                "Push token unavailable",
                format!("Could not obtain a push token: {}", truncate_message(message, NOTICE_MAX_CHARS)),
            ),
        };
        self.platform.show_notice(&notice);
        error
    }
}
