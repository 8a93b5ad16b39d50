use std::sync::Arc;

use futures_util::{stream::BoxStream, StreamExt};
use serde_json::json;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    model::{NotificationPayload, NotificationRecord, NotificationSource},
    now_iso,
    platform::PushPlatform,
    state::SessionStore,
    telemetry::keys,
    truncate_message,
};

/// Keeps both notification observers registered until removed or dropped.
#[derive(Debug)]
pub struct ListenerHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Deregisters both observers and waits for the capture task to exit.
    pub async fn remove(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                debug!("notification capture task ended abnormally: {error}");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Registers the foreground and tap observers. Must be called from within a
/// tokio runtime.
pub fn register<P: PushPlatform + ?Sized>(
    platform: &P,
    store: Arc<SessionStore>,
) -> ListenerHandle {
    let received = platform.received_notifications();
    let responses = platform.notification_responses();
    let (stop_tx, stop_rx) = watch::channel(false);
    debug!("registering notification observers");
    let task = tokio::spawn(run_capture_loop(received, responses, store, stop_rx));
    ListenerHandle {
        stop_tx,
        task: Some(task),
    }
}

async fn run_capture_loop(
    received: BoxStream<'static, NotificationPayload>,
    responses: BoxStream<'static, NotificationPayload>,
    store: Arc<SessionStore>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut received = received.fuse();
    let mut responses = responses.fuse();

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            Some(payload) = received.next() => {
                capture(&store, payload, NotificationSource::Foreground);
            }
            Some(payload) = responses.next() => {
                capture(&store, payload, NotificationSource::Background);
            }
        }
    }
    // Dropping both streams here releases the platform observers.
    debug!("notification observers deregistered");
}

pub(crate) fn to_record(payload: NotificationPayload, source: NotificationSource) -> NotificationRecord {
    NotificationRecord {
        title: payload.title,
        body: payload.body,
        data: payload.data,
        timestamp: now_iso(),
        user_tapped: source == NotificationSource::Background,
        source,
    }
}

fn capture(store: &SessionStore, payload: NotificationPayload, source: NotificationSource) {
    let record = to_record(payload, source);
    let (count_key, at_key) = match source {
        NotificationSource::Foreground => (keys::NOTIFICATION_COUNT, keys::LAST_NOTIFICATION_AT),
        NotificationSource::Background => (keys::TAP_COUNT, keys::LAST_TAP_AT),
    };
    let title = record
        .title
        .as_deref()
        .map(|title| truncate_message(title, 60))
        .unwrap_or_default();

    let count = store.update(|state| {
        let count = state.telemetry.increment(count_key);
        state.telemetry.record(at_key, json!(record.timestamp.clone()));
        state
            .telemetry
            .record(keys::LAST_NOTIFICATION_TITLE, json!(title.clone()));
        state.last_notification = Some(record);
        count
    });
    info!(?source, count, title = %title, "notification captured");
}
