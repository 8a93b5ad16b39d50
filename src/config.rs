use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    consts::{
        DEFAULT_BACKEND_PORT, DEFAULT_FALLBACK_HOST, DEFAULT_TELEMETRY_CAPACITY, DEFAULT_TOPIC,
    },
    error::ClientError,
    model::Topic,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Local-network address used when no tunnel host is available.
    pub fallback_host: String,
    pub backend_port: u16,
    pub default_topic: String,
    pub telemetry_capacity: usize,
    /// `None` leaves subscription calls on the transport's own defaults.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fallback_host: DEFAULT_FALLBACK_HOST.to_string(),
            backend_port: DEFAULT_BACKEND_PORT,
            default_topic: DEFAULT_TOPIC.to_string(),
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|error| ClientError::Config(format!("Failed to read config: {error}")))?;
        serde_json::from_str::<ClientConfig>(&content)
            .map_err(|error| ClientError::Config(format!("Failed to parse config: {error}")))
    }

    pub fn default_topic(&self) -> Topic {
        let trimmed = self.default_topic.trim();
        if trimmed.is_empty() {
            return Topic::default();
        }
        Topic::new(trimmed)
    }

    pub fn fallback_url(&self) -> String {
        format!("http://{}:{}", self.fallback_host.trim(), self.backend_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Android,
    Ios,
    Other,
}

impl Os {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Os::Android
        } else if cfg!(target_os = "ios") {
            Os::Ios
        } else {
            Os::Other
        }
    }
}

/// Facts about the process the client runs in, captured once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    pub tunnel_host: Option<String>,
    pub os: Os,
    pub is_physical_device: bool,
}

impl RuntimeEnvironment {
    pub fn new(os: Os, is_physical_device: bool) -> Self {
        Self {
            tunnel_host: None,
            os,
            is_physical_device,
        }
    }

    pub fn with_tunnel_host(mut self, host: impl Into<String>) -> Self {
        self.tunnel_host = Some(host.into());
        self
    }
}

pub fn normalize_base_url(input: &str) -> Result<String, String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("Server URL is required".to_string());
    }

    let url =
        reqwest::Url::parse(trimmed).map_err(|error| format!("Invalid server URL: {error}"))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err("Server URL must start with http:// or https://".to_string());
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("Server URL must include a host".to_string());
    }

    Ok(trimmed.to_string())
}
