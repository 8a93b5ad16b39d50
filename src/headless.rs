//! Platform adapter for machines without a native push runtime.
//!
//! Device facts and the push token come from configuration, notification
//! events are fed as JSON lines, and notices go to the log.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::broadcast,
};
use tracing::{debug, info, warn};

use crate::{
    config::Os,
    model::{DevicePushToken, DeviceToken, NotificationPayload, TokenKind},
    platform::{
        ForegroundPresentation, Notice, NoticeKind, NoticeSink, NotificationChannel,
        PermissionStatus, PushPlatform,
    },
    truncate_message,
};

const EVENT_BUFFER: usize = 64;

/// One line of the event feed, e.g.
/// `{"kind":"tapped","title":"Hi","body":"there","data":{"k":"v"}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HeadlessEvent {
    Received(NotificationPayload),
    Tapped(NotificationPayload),
}

#[derive(Debug)]
struct PermissionState {
    current: PermissionStatus,
    grant_on_request: bool,
    prompts: u32,
}

pub struct HeadlessPlatform {
    os: Os,
    token: Option<DevicePushToken>,
    permission: Mutex<PermissionState>,
    presentation: Mutex<Option<ForegroundPresentation>>,
    channels: Mutex<Vec<NotificationChannel>>,
    notices: Mutex<Vec<Notice>>,
    received_tx: broadcast::Sender<NotificationPayload>,
    tapped_tx: broadcast::Sender<NotificationPayload>,
}

impl HeadlessPlatform {
    /// `os` only decides the kind of token handed out; device facts the
    /// lifecycle checks come from [`crate::config::RuntimeEnvironment`].
    pub fn new(os: Os) -> Self {
        let (received_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (tapped_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            os,
            token: None,
            permission: Mutex::new(PermissionState {
                current: PermissionStatus::Undetermined,
                grant_on_request: true,
                prompts: 0,
            }),
            presentation: Mutex::new(None),
            channels: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            received_tx,
            tapped_tx,
        }
    }

    /// Token handed out by [`PushPlatform::device_push_token`]. The kind
    /// follows the OS: APNs on iOS, FCM elsewhere.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let kind = match self.os {
            Os::Ios => TokenKind::Apns,
            _ => TokenKind::Fcm,
        };
        self.token = Some(DevicePushToken {
            kind,
            data: DeviceToken::new(token),
        });
        self
    }

    pub fn with_permission(self, current: PermissionStatus, grant_on_request: bool) -> Self {
        {
            let mut permission = self.permission.lock().unwrap_or_else(PoisonError::into_inner);
            permission.current = current;
            permission.grant_on_request = grant_on_request;
        }
        self
    }

    /// Forwards an event to the registered observers. Returns `false` when
    /// no observer is registered.
    pub fn dispatch(&self, event: HeadlessEvent) -> bool {
        let sent = match event {
            HeadlessEvent::Received(payload) => self.received_tx.send(payload),
            HeadlessEvent::Tapped(payload) => self.tapped_tx.send(payload),
        };
        sent.is_ok()
    }

    pub fn observer_count(&self) -> usize {
        self.received_tx.receiver_count() + self.tapped_tx.receiver_count()
    }

    /// Parses one JSON event line and dispatches it. `Ok(false)` means the
    /// line was blank or no observer was registered.
    pub fn dispatch_line(&self, line: &str) -> Result<bool, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }
        let event = serde_json::from_str::<HeadlessEvent>(line).map_err(|error| {
            format!("Invalid event line: {error}: {}", truncate_message(line, 140))
        })?;
        if !self.dispatch(event) {
            warn!("event dropped: no notification observer registered");
            return Ok(false);
        }
        Ok(true)
    }

    /// Reads JSON-line events until EOF and returns how many were dispatched.
    /// Blank and unparsable lines are skipped.
    pub async fn pump_events<R>(&self, reader: R) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut dispatched = 0usize;
        while let Some(line) = lines.next_line().await? {
            match self.dispatch_line(&line) {
                Ok(true) => dispatched = dispatched.saturating_add(1),
                Ok(false) => {}
                Err(error) => warn!("skipping event: {error}"),
            }
        }
        Ok(dispatched)
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn permission_prompts(&self) -> u32 {
        self.permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .prompts
    }

    pub fn configured_channels(&self) -> Vec<NotificationChannel> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn presentation(&self) -> Option<ForegroundPresentation> {
        *self
            .presentation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn observe(
    tx: &broadcast::Sender<NotificationPayload>,
) -> BoxStream<'static, NotificationPayload> {
    let rx = tx.subscribe();
    futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(payload) => return Some((payload, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification observer lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

impl NoticeSink for HeadlessPlatform {
    fn show_notice(&self, notice: &Notice) {
        match notice.kind {
            NoticeKind::Info => info!(title = %notice.title, "{}", notice.message),
            NoticeKind::Error => warn!(title = %notice.title, "{}", notice.message),
        }
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
    }
}

#[async_trait]
impl PushPlatform for HeadlessPlatform {
    fn set_foreground_presentation(&self, presentation: ForegroundPresentation) {
        debug!(?presentation, "foreground presentation installed");
        *self
            .presentation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(presentation);
    }

    async fn permission_status(&self) -> PermissionStatus {
        self.permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    async fn request_permission(&self) -> PermissionStatus {
        let mut permission = self.permission.lock().unwrap_or_else(PoisonError::into_inner);
        permission.prompts = permission.prompts.saturating_add(1);
        permission.current = if permission.grant_on_request {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        permission.current
    }

    async fn ensure_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<(), String> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|existing| existing.id != channel.id);
        channels.push(channel.clone());
        Ok(())
    }

    async fn device_push_token(&self) -> Result<DevicePushToken, String> {
        self.token
            .clone()
            .ok_or_else(|| "No push token configured for headless platform".to_string())
    }

    fn received_notifications(&self) -> BoxStream<'static, NotificationPayload> {
        observe(&self.received_tx)
    }

    fn notification_responses(&self) -> BoxStream<'static, NotificationPayload> {
        observe(&self.tapped_tx)
    }
}
