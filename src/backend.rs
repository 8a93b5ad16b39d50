use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    consts::HEALTH_REQUEST_TIMEOUT_SECS,
    endpoint::ServerEndpoint,
    error::{ClientError, SubscribeError},
    model::{
        BackendReplyWire, DeviceToken, HealthReplyWire, SendToTopicWire, Topic, TopicMessage,
        TopicRequestWire,
    },
    truncate_message,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAction {
    Subscribe,
    Unsubscribe,
}

impl TopicAction {
    pub fn path(self) -> &'static str {
        match self {
            TopicAction::Subscribe => "/subscribe",
            TopicAction::Unsubscribe => "/unsubscribe",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            TopicAction::Subscribe => "subscribe",
            TopicAction::Unsubscribe => "unsubscribe",
        }
    }
}

/// Thin typed wrapper over the notification backend's HTTP API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoint: ServerEndpoint,
}

impl BackendClient {
    pub fn new(endpoint: ServerEndpoint, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|error| ClientError::HttpClient(error.to_string()))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub async fn topic_request(
        &self,
        action: TopicAction,
        token: &DeviceToken,
        topic: &Topic,
    ) -> Result<(), SubscribeError> {
        let url = self.endpoint.join(action.path());
        debug!(%url, %topic, token = %token, "POST {}", action.path());
        let request = self.http.post(&url).json(&TopicRequestWire {
            token: token.as_str(),
            topic: topic.as_str(),
        });
        let reply: BackendReplyWire = read_json(request).await?;
        into_outcome(reply).map(|_| ())
    }

    /// Asks the backend to fan a message out to every subscriber of a topic.
    /// Returns the backend's message id when it provides one.
    pub async fn send_to_topic(
        &self,
        message: &TopicMessage,
    ) -> Result<Option<String>, SubscribeError> {
        let url = self.endpoint.join("/send-to-topic");
        debug!(%url, topic = %message.topic, "POST /send-to-topic");
        let request = self.http.post(&url).json(&SendToTopicWire {
            topic: message.topic.as_str(),
            title: &message.title,
            body: &message.body,
            data: &message.data,
        });
        let reply: BackendReplyWire = read_json(request).await?;
        into_outcome(reply)
    }

    pub async fn health(&self) -> Result<String, SubscribeError> {
        let url = self.endpoint.join("/health");
        debug!(%url, "GET /health");
        let request = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_REQUEST_TIMEOUT_SECS));
        let reply: HealthReplyWire = read_json(request).await?;
        Ok(reply.message)
    }
}

/// The backend reports failures in the body, so the body is parsed whatever
/// the HTTP status.
async fn read_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, SubscribeError> {
    let response = request
        .send()
        .await
        .map_err(|error| SubscribeError::Network(error.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|error| SubscribeError::Network(format!("Failed to read response body: {error}")))?;
    debug!(status, bytes = body.len(), "backend response");

    serde_json::from_str::<T>(&body).map_err(|error| {
        SubscribeError::MalformedResponse(format!(
            "HTTP {status}: {error}: {}",
            truncate_message(&body, 140)
        ))
    })
}

fn into_outcome(reply: BackendReplyWire) -> Result<Option<String>, SubscribeError> {
    if !reply.success {
        return Err(SubscribeError::Rejected(
            reply
                .error
                .filter(|error| !error.trim().is_empty())
                .unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }
    Ok(reply.id.map(|id| match id {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }))
}
