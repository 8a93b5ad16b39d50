#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use serde_json::json;
use topic_push::{
    headless::HeadlessPlatform, ClientConfig, ClientSnapshot, Os, PermissionStatus,
    PushLifecycle, RuntimeEnvironment,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TOKEN: &str = "fcm-token-0123456789abcdefghijklmnopqrstuvwxyz";

pub fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        backend_port: server.address().port(),
        ..ClientConfig::default()
    }
}

/// Physical Android device reached through a tunnel on the mock server's host.
pub fn device_env() -> RuntimeEnvironment {
    RuntimeEnvironment::new(Os::Android, true).with_tunnel_host("127.0.0.1:8081")
}

pub fn granting_platform() -> Arc<HeadlessPlatform> {
    Arc::new(
        HeadlessPlatform::new(Os::Android)
            .with_permission(PermissionStatus::Undetermined, true)
            .with_token(TOKEN),
    )
}

pub fn lifecycle(
    server: &MockServer,
    env: RuntimeEnvironment,
    platform: Arc<HeadlessPlatform>,
) -> PushLifecycle<HeadlessPlatform> {
    PushLifecycle::new(config_for(server), env, platform).expect("lifecycle builds")
}

pub async fn mount_reply(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_success(server: &MockServer, route: &str) {
    mount_reply(server, route, json!({ "success": true })).await;
}

/// Waits until a snapshot satisfies `done`, failing after five seconds.
pub async fn wait_for<F>(lifecycle: &PushLifecycle<HeadlessPlatform>, done: F) -> ClientSnapshot
where
    F: Fn(&ClientSnapshot) -> bool,
{
    let mut changes = lifecycle.changes();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = lifecycle.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            changes.changed().await.expect("session store alive");
        }
    })
    .await
    .expect("condition reached before timeout")
}

pub async fn wait_for_observers(platform: &HeadlessPlatform, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while platform.observer_count() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("observer count reached before timeout");
}
