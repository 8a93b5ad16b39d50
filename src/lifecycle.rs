use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde_json::{json, Map};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    acquire::Acquirer,
    backend::BackendClient,
    config::{ClientConfig, RuntimeEnvironment},
    consts::{NOTICE_MAX_CHARS, TELEMETRY_MAX_CHARS},
    endpoint::{self, Resolution, ServerEndpoint},
    error::{AcquireError, ClientError},
    listener::{self, ListenerHandle},
    model::{DevicePushToken, Topic, TopicMessage},
    now_iso,
    platform::{Notice, NoticeSink, PushPlatform},
    state::{ClientSnapshot, Phase, SessionStore},
    subscription::SubscriptionController,
    telemetry::keys,
    truncate_message,
};

/// Top-level controller for one app session.
///
/// `start` walks permission, token and auto-subscription; afterwards the
/// presentation layer drives the actions and renders [`ClientSnapshot`]s.
/// Notification observers are released by [`PushLifecycle::shutdown`] or
/// when the lifecycle is dropped.
pub struct PushLifecycle<P: PushPlatform + 'static> {
    config: ClientConfig,
    env: RuntimeEnvironment,
    resolution: Resolution,
    platform: Arc<P>,
    store: Arc<SessionStore>,
    backend: BackendClient,
    controller: SubscriptionController,
    listener: Mutex<Option<ListenerHandle>>,
}

impl<P: PushPlatform + 'static> PushLifecycle<P> {
    pub fn new(
        config: ClientConfig,
        env: RuntimeEnvironment,
        platform: Arc<P>,
    ) -> Result<Self, ClientError> {
        let store = Arc::new(SessionStore::new(
            config.default_topic(),
            config.telemetry_capacity,
        ));
        let resolution = endpoint::resolve(&config, &env);
        resolution.record(&store);

        let backend = BackendClient::new(
            resolution.endpoint.clone(),
            config.request_timeout_secs.map(Duration::from_secs),
        )?;
        let notices: Arc<dyn NoticeSink> = platform.clone();
        let controller = SubscriptionController::new(backend.clone(), store.clone(), notices);

        Ok(Self {
            config,
            env,
            resolution,
            platform,
            store,
            backend,
            controller,
            listener: Mutex::new(None),
        })
    }

    /// Runs the startup sequence once. Later calls return the current phase
    /// without doing anything.
    pub async fn start(&self) -> Phase {
        let claimed = self.store.update(|state| {
            if state.phase != Phase::Uninitialized {
                return false;
            }
            state.phase = Phase::AcquiringPermission;
            true
        });
        if !claimed {
            return self.store.phase();
        }

        // Observers go up first so nothing is missed while the permission
        // prompt is showing.
        self.register_listeners();

        let acquirer = Acquirer::new(self.platform.as_ref(), &self.env, &self.store);
        if let Err(error) = acquirer.ensure_permission().await {
            return self.degrade(error);
        }

        self.store.set_phase(Phase::AcquiringToken);
        let token = match acquirer.fetch_token().await {
            Ok(token) => token,
            Err(error) => return self.degrade(error),
        };

        self.store.update(|state| {
            state.token = Some(token.clone());
            state.phase = Phase::AutoSubscribing;
        });

        let topic = self.config.default_topic();
        if let Err(error) = self.controller.subscribe(&token.data, &topic).await {
            // Already reported by the controller; the session stays usable.
            warn!(%topic, "automatic subscription failed: {error}");
        }

        self.store.set_phase(Phase::Ready);
        info!(endpoint = %self.resolution.endpoint, "push lifecycle ready");
        Phase::Ready
    }

    fn degrade(&self, error: AcquireError) -> Phase {
        warn!("push lifecycle degraded: {error}");
        self.store.update(|state| {
            state.phase = Phase::Degraded;
            state.degraded_reason = Some(error.to_string());
        });
        Phase::Degraded
    }

    fn register_listeners(&self) {
        let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(listener::register(self.platform.as_ref(), self.store.clone()));
        }
    }

    /// Deregisters the notification observers and waits for them to stop.
    pub async fn shutdown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.remove().await;
            info!("notification observers released");
        }
    }

    pub fn listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(ListenerHandle::is_active)
    }

    pub fn token(&self) -> Option<DevicePushToken> {
        self.store.read(|state| state.token.clone())
    }

    fn require_token(&self) -> Result<DevicePushToken, ClientError> {
        self.token().ok_or(ClientError::NoToken)
    }

    pub async fn subscribe(&self, topic: Option<Topic>) -> Result<(), ClientError> {
        let token = self.require_token()?;
        let topic = topic.unwrap_or_else(|| self.config.default_topic());
        self.controller.subscribe(&token.data, &topic).await?;
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: Option<Topic>) -> Result<(), ClientError> {
        let token = self.require_token()?;
        let topic = topic.unwrap_or_else(|| self.config.default_topic());
        self.controller.unsubscribe(&token.data, &topic).await?;
        Ok(())
    }

    /// Probes `GET /health` and reports the outcome to the user.
    pub async fn test_connection(&self) -> Result<String, ClientError> {
        match self.backend.health().await {
            Ok(message) => {
                info!(endpoint = %self.endpoint(), "health check ok: {message}");
                self.store.record(
                    keys::LAST_HEALTH_CHECK,
                    json!({
                        "message": truncate_message(&message, TELEMETRY_MAX_CHARS),
                        "at": now_iso(),
                    }),
                );
                self.platform.show_notice(&Notice::info(
                    "Connection OK",
                    format!(
                        "Server at {} replied: {}",
                        self.endpoint(),
                        truncate_message(&message, NOTICE_MAX_CHARS)
                    ),
                ));
                Ok(message)
            }
            Err(error) => {
                warn!(endpoint = %self.endpoint(), "health check failed: {error}");
                self.store.record(
                    keys::LAST_HEALTH_ERROR,
                    json!({
                        "error": truncate_message(&error.to_string(), TELEMETRY_MAX_CHARS),
                        "at": now_iso(),
                    }),
                );
                self.platform.show_notice(&Notice::error(
                    "Connection error",
                    format!(
                        "Could not reach the server at {}: {}",
                        self.endpoint(),
                        truncate_message(&error.to_string(), NOTICE_MAX_CHARS)
                    ),
                ));
                Err(error.into())
            }
        }
    }

    /// Asks the backend to push a canned message to the subscribed topic.
    pub async fn send_test_notification(&self) -> Result<Option<String>, ClientError> {
        let (subscribed, topic) = self
            .store
            .read(|state| (state.is_subscribed, state.topic.clone()));
        if !subscribed {
            return Err(ClientError::NotSubscribed(topic.to_string()));
        }

        let mut data = Map::new();
        data.insert("kind".to_string(), json!("test"));
        data.insert("timestamp".to_string(), json!(now_iso()));
        let message = TopicMessage {
            body: format!("This notification was sent to the '{topic}' topic."),
            topic,
            title: "Test notification".to_string(),
            data,
        };
        self.send_to_topic(&message).await
    }

    pub async fn send_to_topic(&self, message: &TopicMessage) -> Result<Option<String>, ClientError> {
        match self.backend.send_to_topic(message).await {
            Ok(id) => {
                info!(topic = %message.topic, id = ?id, "topic message accepted");
                self.store.record(
                    keys::LAST_SEND_SUCCESS,
                    json!({ "topic": message.topic.as_str(), "id": id.clone(), "at": now_iso() }),
                );
                self.platform.show_notice(&Notice::info(
                    "Notification sent",
                    format!(
                        "Sent to topic '{}'. ID: {}",
                        message.topic,
                        id.as_deref().unwrap_or("n/a")
                    ),
                ));
                Ok(id)
            }
            Err(error) => {
                warn!(topic = %message.topic, "send-to-topic failed: {error}");
                self.store.record(
                    keys::LAST_SEND_ERROR,
                    json!({
                        "topic": message.topic.as_str(),
                        "error": truncate_message(&error.to_string(), TELEMETRY_MAX_CHARS),
                        "at": now_iso(),
                    }),
                );
                self.platform.show_notice(&Notice::error(
                    "Send failed",
                    truncate_message(&error.to_string(), NOTICE_MAX_CHARS),
                ));
                Err(error.into())
            }
        }
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.resolution.endpoint
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn phase(&self) -> Phase {
        self.store.phase()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        self.store.snapshot(self.resolution.endpoint.as_str())
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.store.changes()
    }
}
