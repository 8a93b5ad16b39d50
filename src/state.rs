use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    model::{DevicePushToken, NotificationRecord, Topic},
    telemetry::{Telemetry, TelemetrySnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Uninitialized,
    AcquiringPermission,
    AcquiringToken,
    AutoSubscribing,
    Ready,
    /// Permission or token acquisition failed. Terminal for the session.
    Degraded,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) phase: Phase,
    pub(crate) token: Option<DevicePushToken>,
    pub(crate) topic: Topic,
    pub(crate) is_subscribed: bool,
    pub(crate) last_notification: Option<NotificationRecord>,
    pub(crate) degraded_reason: Option<String>,
    pub(crate) telemetry: Telemetry,
}

/// Single owner of all mutable session state.
///
/// Every mutation bumps a revision on a watch channel so observers can react
/// without polling.
#[derive(Debug)]
pub struct SessionStore {
    state: Mutex<SessionState>,
    changes: watch::Sender<u64>,
}

impl SessionStore {
    pub(crate) fn new(topic: Topic, telemetry_capacity: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(SessionState {
                phase: Phase::Uninitialized,
                token: None,
                topic,
                is_subscribed: false,
                last_notification: None,
                degraded_reason: None,
                telemetry: Telemetry::new(telemetry_capacity),
            }),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Critical sections never panic mid-update, so a poisoned guard still
        // holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update<T>(&self, apply: impl FnOnce(&mut SessionState) -> T) -> T {
        let out = {
            let mut state = self.lock();
            apply(&mut state)
        };
        self.changes.send_modify(|revision| *revision = revision.wrapping_add(1));
        out
    }

    pub(crate) fn read<T>(&self, view: impl FnOnce(&SessionState) -> T) -> T {
        let state = self.lock();
        view(&state)
    }

    pub(crate) fn record(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        self.update(|state| state.telemetry.record(key, value));
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.update(|state| state.phase = phase);
    }

    pub fn phase(&self) -> Phase {
        self.read(|state| state.phase)
    }

    pub fn is_subscribed(&self) -> bool {
        self.read(|state| state.is_subscribed)
    }

    pub fn last_notification(&self) -> Option<NotificationRecord> {
        self.read(|state| state.last_notification.clone())
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.read(|state| state.telemetry.snapshot())
    }

    /// Receiver that observes a new revision after every state mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn snapshot(&self, server_url: &str) -> ClientSnapshot {
        self.read(|state| ClientSnapshot {
            phase: state.phase,
            server_url: server_url.to_string(),
            token: state
                .token
                .as_ref()
                .map(|token| token.data.as_str().to_string()),
            token_preview: state.token.as_ref().map(|token| token.data.preview()),
            topic: state.topic.clone(),
            is_subscribed: state.is_subscribed,
            last_notification: state.last_notification.clone(),
            degraded_reason: state.degraded_reason.clone(),
            telemetry: state.telemetry.snapshot(),
        })
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub phase: Phase,
    pub server_url: String,
    pub token: Option<String>,
    pub token_preview: Option<String>,
    pub topic: Topic,
    pub is_subscribed: bool,
    pub last_notification: Option<NotificationRecord>,
    pub degraded_reason: Option<String>,
    pub telemetry: TelemetrySnapshot,
}
