use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendClient, TopicAction},
    consts::{NOTICE_MAX_CHARS, TELEMETRY_MAX_CHARS},
    error::SubscribeError,
    model::{DeviceToken, Topic},
    now_iso,
    platform::{Notice, NoticeSink},
    state::SessionStore,
    telemetry::keys,
    truncate_message,
};

/// Issues subscribe/unsubscribe calls and owns the subscription flag.
///
/// Calls are serialized: each request and its state update finish before the
/// next call is sent, so the flag always matches the last call issued.
pub struct SubscriptionController {
    backend: BackendClient,
    store: Arc<SessionStore>,
    notices: Arc<dyn NoticeSink>,
    in_flight: AsyncMutex<()>,
}

impl SubscriptionController {
    pub fn new(
        backend: BackendClient,
        store: Arc<SessionStore>,
        notices: Arc<dyn NoticeSink>,
    ) -> Self {
        Self {
            backend,
            store,
            notices,
            in_flight: AsyncMutex::new(()),
        }
    }

    pub async fn subscribe(&self, token: &DeviceToken, topic: &Topic) -> Result<(), SubscribeError> {
        self.run(TopicAction::Subscribe, token, topic).await
    }

    pub async fn unsubscribe(
        &self,
        token: &DeviceToken,
        topic: &Topic,
    ) -> Result<(), SubscribeError> {
        self.run(TopicAction::Unsubscribe, token, topic).await
    }

    async fn run(
        &self,
        action: TopicAction,
        token: &DeviceToken,
        topic: &Topic,
    ) -> Result<(), SubscribeError> {
        let _slot = self.in_flight.lock().await;
        let outcome = self.backend.topic_request(action, token, topic).await;

        match &outcome {
            Ok(()) => {
                info!(%topic, "{} succeeded", action.verb());
                let entry = json!({ "topic": topic.as_str(), "at": now_iso() });
                let tracked = self.store.update(|state| {
                    state.telemetry.record(success_key(action), entry);
                    match action {
                        TopicAction::Subscribe => {
                            state.is_subscribed = true;
                            state.topic = topic.clone();
                            true
                        }
                        // Only the tracked pair is mirrored; other topics
                        // leave the flag alone.
                        TopicAction::Unsubscribe if state.topic == *topic => {
                            state.is_subscribed = false;
                            true
                        }
                        TopicAction::Unsubscribe => false,
                    }
                });
                if !tracked {
                    debug!(%topic, "unsubscribed from an untracked topic");
                }
            }
            Err(SubscribeError::Rejected(message)) => {
                warn!(%topic, "{} rejected by backend: {message}", action.verb());
                self.store.record(
                    error_key(action),
                    json!({
                        "topic": topic.as_str(),
                        "error": truncate_message(message, TELEMETRY_MAX_CHARS),
                        "at": now_iso(),
                    }),
                );
                self.notices.show_notice(&Notice::error(
                    "Subscription error",
                    truncate_message(message, NOTICE_MAX_CHARS),
                ));
            }
            Err(error) => {
                warn!(%topic, "{} failed: {error}", action.verb());
                self.store.record(
                    keys::LAST_NETWORK_ERROR,
                    json!({
                        "action": action.verb(),
                        "topic": topic.as_str(),
                        "error": truncate_message(&error.to_string(), TELEMETRY_MAX_CHARS),
                        "at": now_iso(),
                    }),
                );
                self.notices.show_notice(&Notice::error(
                    "Connection error",
                    format!(
                        "Could not reach the notification server at {}",
                        self.backend.endpoint()
                    ),
                ));
            }
        }
        outcome
    }
}

fn success_key(action: TopicAction) -> &'static str {
    match action {
        TopicAction::Subscribe => keys::LAST_SUBSCRIBE_SUCCESS,
        TopicAction::Unsubscribe => keys::LAST_UNSUBSCRIBE_SUCCESS,
    }
}

fn error_key(action: TopicAction) -> &'static str {
    match action {
        TopicAction::Subscribe => keys::LAST_SUBSCRIBE_ERROR,
        TopicAction::Unsubscribe => keys::LAST_UNSUBSCRIBE_ERROR,
    }
}
