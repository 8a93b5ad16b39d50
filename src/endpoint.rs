use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::{normalize_base_url, ClientConfig, RuntimeEnvironment},
    state::SessionStore,
    telemetry::keys,
};

/// Base URL of the notification backend. Resolved once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServerEndpoint(String);

impl ServerEndpoint {
    pub fn parse(input: &str) -> Result<Self, String> {
        normalize_base_url(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSource {
    Tunnel,
    Fallback,
}

impl EndpointSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointSource::Tunnel => "tunnel",
            EndpointSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub endpoint: ServerEndpoint,
    pub source: EndpointSource,
    /// Set when a tunnel host was present but unusable.
    pub fallback_reason: Option<String>,
}

impl Resolution {
    pub(crate) fn record(&self, store: &SessionStore) {
        store.record(keys::ENDPOINT_SOURCE, self.source.as_str());
        store.record(keys::SERVER_URL, self.endpoint.as_str());
        if let Some(reason) = &self.fallback_reason {
            store.record(keys::ENDPOINT_FALLBACK_REASON, reason.as_str());
        }
    }
}

/// Chooses the backend URL for this session. Never fails: an absent or
/// unusable tunnel host selects the configured local-network address.
pub fn resolve(config: &ClientConfig, env: &RuntimeEnvironment) -> Resolution {
    let tunnel = env
        .tunnel_host
        .as_deref()
        .map(str::trim)
        .filter(|host| !host.is_empty());

    let mut fallback_reason = None;
    if let Some(host) = tunnel {
        match tunnel_endpoint(host, config.backend_port) {
            Ok(endpoint) => {
                info!(%endpoint, "using tunnel host for backend endpoint");
                return Resolution {
                    endpoint,
                    source: EndpointSource::Tunnel,
                    fallback_reason: None,
                };
            }
            Err(error) => {
                warn!(tunnel_host = host, "unusable tunnel host: {error}");
                fallback_reason = Some(error);
            }
        }
    }

    let endpoint = fallback_endpoint(config);
    info!(%endpoint, "using local-network backend endpoint");
    Resolution {
        endpoint,
        source: EndpointSource::Fallback,
        fallback_reason,
    }
}

fn tunnel_endpoint(host: &str, port: u16) -> Result<ServerEndpoint, String> {
    let address = host.split(':').next().unwrap_or_default().trim();
    if address.is_empty() {
        return Err(format!("Tunnel host '{host}' has no address component"));
    }
    ServerEndpoint::parse(&format!("http://{address}:{port}"))
}

fn fallback_endpoint(config: &ClientConfig) -> ServerEndpoint {
    let candidate = config.fallback_url();
    match ServerEndpoint::parse(&candidate) {
        Ok(endpoint) => endpoint,
        Err(error) => {
            let default_url = ClientConfig::default().fallback_url();
            warn!(
                fallback = %candidate,
                "configured fallback host is invalid ({error}), using {default_url}"
            );
            ServerEndpoint(default_url)
        }
    }
}
