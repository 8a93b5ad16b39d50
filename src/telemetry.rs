//! Session-scoped debug telemetry.
//!
//! Plain entries are bounded and evicted oldest-first; counters are kept in a
//! separate table that is never evicted, so they stay monotonic for the
//! lifetime of the session.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::consts::MIN_TELEMETRY_CAPACITY;

pub mod keys {
    pub const ENDPOINT_SOURCE: &str = "endpointSource";
    pub const SERVER_URL: &str = "serverUrl";
    pub const ENDPOINT_FALLBACK_REASON: &str = "endpointFallbackReason";

    pub const PERMISSION_STATUS: &str = "permissionStatus";
    pub const ACQUIRE_ERROR: &str = "acquireError";
    pub const CHANNEL_ERROR: &str = "channelError";
    pub const TOKEN_TYPE: &str = "tokenType";
    pub const TOKEN_LENGTH: &str = "tokenLength";
    pub const TOKEN_PREVIEW: &str = "tokenPreview";
    pub const TOKEN_RECEIVED_AT: &str = "tokenReceivedAt";

    pub const LAST_SUBSCRIBE_SUCCESS: &str = "lastSubscribeSuccess";
    pub const LAST_SUBSCRIBE_ERROR: &str = "lastSubscribeError";
    pub const LAST_UNSUBSCRIBE_SUCCESS: &str = "lastUnsubscribeSuccess";
    pub const LAST_UNSUBSCRIBE_ERROR: &str = "lastUnsubscribeError";
    pub const LAST_NETWORK_ERROR: &str = "lastNetworkError";

    pub const LAST_NOTIFICATION_AT: &str = "lastNotificationAt";
    pub const LAST_NOTIFICATION_TITLE: &str = "lastNotificationTitle";
    pub const LAST_TAP_AT: &str = "lastTapAt";

    pub const LAST_HEALTH_CHECK: &str = "lastHealthCheck";
    pub const LAST_HEALTH_ERROR: &str = "lastHealthError";
    pub const LAST_SEND_SUCCESS: &str = "lastSendSuccess";
    pub const LAST_SEND_ERROR: &str = "lastSendError";

    pub const NOTIFICATION_COUNT: &str = "notificationCount";
    pub const TAP_COUNT: &str = "tapCount";
    pub const EVICTED_ENTRIES: &str = "evictedEntries";
}

#[derive(Debug)]
pub(crate) struct Telemetry {
    capacity: usize,
    entries: BTreeMap<String, Value>,
    order: VecDeque<String>,
    counters: BTreeMap<String, u64>,
}

impl Telemetry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_TELEMETRY_CAPACITY),
            entries: BTreeMap::new(),
            order: VecDeque::new(),
            counters: BTreeMap::new(),
        }
    }

    pub(crate) fn record(&mut self, key: &str, value: Value) {
        if self.entries.insert(key.to_string(), value).is_some() {
            self.order.retain(|existing| existing != key);
        }
        self.order.push_back(key.to_string());

        while self.order.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.increment(keys::EVICTED_ENTRIES);
        }
    }

    pub(crate) fn increment(&mut self, key: &str) -> u64 {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    pub(crate) fn snapshot(&self) -> TelemetrySnapshot {
        let mut entries = Map::new();
        for (key, value) in &self.entries {
            entries.insert(key.clone(), value.clone());
        }
        for (key, count) in &self.counters {
            entries.insert(key.clone(), Value::from(*count));
        }
        TelemetrySnapshot { entries }
    }
}

/// Read-only copy of the telemetry mapping handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TelemetrySnapshot {
    entries: Map<String, Value>,
}

impl TelemetrySnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.entries.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.entries
            .values()
            .any(|value| value.to_string().contains(needle))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }
}
