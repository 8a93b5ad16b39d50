mod common;

use std::{sync::Arc, time::Duration};

use serde_json::json;
use topic_push::{
    headless::{HeadlessEvent, HeadlessPlatform},
    platform::ChannelImportance,
    telemetry::keys,
    ClientError, EndpointSource, NotificationPayload, NotificationSource, Os, PermissionStatus,
    Phase, RuntimeEnvironment, Topic,
};
use wiremock::{
    matchers::{body_json, body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use common::*;

fn payload(title: &str) -> NotificationPayload {
    let mut data = serde_json::Map::new();
    data.insert("k".into(), json!("v"));
    NotificationPayload {
        title: Some(title.to_string()),
        body: Some("B".to_string()),
        data,
    }
}

#[tokio::test]
async fn startup_reaches_ready_and_auto_subscribes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .and(body_json(json!({ "token": TOKEN, "topic": "general" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());
    assert_eq!(lifecycle.phase(), Phase::Uninitialized);
    assert_eq!(lifecycle.resolution().source, EndpointSource::Tunnel);

    assert_eq!(lifecycle.start().await, Phase::Ready);

    let snapshot = lifecycle.snapshot();
    assert!(snapshot.is_subscribed);
    assert_eq!(snapshot.token.as_deref(), Some(TOKEN));
    assert_eq!(snapshot.topic, Topic::new("general"));
    assert_eq!(snapshot.server_url, format!("http://127.0.0.1:{}", server.address().port()));

    assert_eq!(platform.permission_prompts(), 1);
    let channels = platform.configured_channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].importance, ChannelImportance::Max);
    assert!(platform.presentation().is_some_and(|p| p.show_alert && !p.play_sound));
    assert!(platform.notices().is_empty());

    let telemetry = snapshot.telemetry;
    assert_eq!(telemetry.get(keys::TOKEN_LENGTH), Some(&json!(TOKEN.len())));
    assert_eq!(telemetry.get(keys::TOKEN_TYPE), Some(&json!("fcm")));
    assert_eq!(telemetry.get(keys::ENDPOINT_SOURCE), Some(&json!("tunnel")));
    assert!(telemetry.get(keys::LAST_SUBSCRIBE_SUCCESS).is_some());
    assert!(!telemetry.contains_text(TOKEN), "full token leaked into telemetry");

    lifecycle.shutdown().await;
}

#[tokio::test]
async fn granted_permission_is_not_prompted_again() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    let platform = Arc::new(
        HeadlessPlatform::new(Os::Ios)
            .with_permission(PermissionStatus::Granted, false)
            .with_token("apns-token-abcdefghijklmnop"),
    );
    let env = RuntimeEnvironment::new(Os::Ios, true).with_tunnel_host("127.0.0.1");
    let lifecycle = lifecycle(&server, env, platform.clone());

    assert_eq!(lifecycle.start().await, Phase::Ready);
    assert_eq!(platform.permission_prompts(), 0);
    // Channels are an Android concern.
    assert!(platform.configured_channels().is_empty());
    assert_eq!(
        lifecycle.snapshot().telemetry.get(keys::TOKEN_TYPE),
        Some(&json!("apns"))
    );
}

#[tokio::test]
async fn simulator_degrades_without_prompting() {
    let server = MockServer::start().await;
    let platform = granting_platform();
    let env = RuntimeEnvironment::new(Os::Android, false).with_tunnel_host("127.0.0.1:8081");
    let lifecycle = lifecycle(&server, env, platform.clone());

    assert_eq!(lifecycle.start().await, Phase::Degraded);
    assert_eq!(platform.permission_prompts(), 0);

    let snapshot = lifecycle.snapshot();
    assert!(snapshot.token.is_none());
    assert!(!snapshot.is_subscribed);
    assert!(snapshot.degraded_reason.is_some());
    assert!(snapshot.telemetry.get(keys::ACQUIRE_ERROR).is_some());
    assert_eq!(platform.notices().len(), 1);

    // Observers were registered before acquisition and are still released.
    assert!(lifecycle.listening());
    lifecycle.shutdown().await;
    assert!(!lifecycle.listening());
    assert_eq!(platform.observer_count(), 0);
}

#[tokio::test]
async fn denied_permission_is_terminal_and_actions_need_a_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(0)
        .mount(&server)
        .await;
    let platform = Arc::new(
        HeadlessPlatform::new(Os::Android)
            .with_permission(PermissionStatus::Undetermined, false)
            .with_token(TOKEN),
    );
    let lifecycle = lifecycle(&server, device_env(), platform.clone());

    assert_eq!(lifecycle.start().await, Phase::Degraded);
    assert_eq!(platform.permission_prompts(), 1);
    assert_eq!(
        lifecycle.snapshot().telemetry.get(keys::PERMISSION_STATUS),
        Some(&json!("denied"))
    );

    // No automatic retry, a second start is a no-op.
    assert_eq!(lifecycle.start().await, Phase::Degraded);
    assert_eq!(platform.permission_prompts(), 1);

    assert!(matches!(lifecycle.subscribe(None).await, Err(ClientError::NoToken)));
    assert!(matches!(lifecycle.unsubscribe(None).await, Err(ClientError::NoToken)));
}

#[tokio::test]
async fn missing_token_degrades_with_reason() {
    let server = MockServer::start().await;
    let platform = Arc::new(
        HeadlessPlatform::new(Os::Android).with_permission(PermissionStatus::Granted, true),
    );
    let lifecycle = lifecycle(&server, device_env(), platform.clone());

    assert_eq!(lifecycle.start().await, Phase::Degraded);
    let reason = lifecycle.snapshot().degraded_reason.unwrap();
    assert!(reason.contains("token unavailable"), "{reason}");
    assert_eq!(platform.notices()[0].title, "Push token unavailable");
}

#[tokio::test]
async fn rejected_auto_subscribe_still_reaches_ready() {
    let server = MockServer::start().await;
    mount_reply(&server, "/subscribe", json!({ "success": false, "error": "X" })).await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());

    assert_eq!(lifecycle.start().await, Phase::Ready);
    let snapshot = lifecycle.snapshot();
    assert!(!snapshot.is_subscribed);
    assert!(snapshot.token.is_some());
    assert_eq!(
        snapshot.telemetry.get(keys::LAST_SUBSCRIBE_ERROR).unwrap()["error"],
        json!("X")
    );
    assert_eq!(platform.notices()[0].message, "X");
}

#[tokio::test]
async fn unreachable_backend_keeps_state_and_records_network_error() {
    let platform = granting_platform();
    let config = topic_push::ClientConfig {
        backend_port: 9,
        ..topic_push::ClientConfig::default()
    };
    let lifecycle = topic_push::PushLifecycle::new(config, device_env(), platform.clone()).unwrap();

    assert_eq!(lifecycle.start().await, Phase::Ready);
    assert!(!lifecycle.snapshot().is_subscribed);
    assert!(lifecycle.unsubscribe(None).await.is_err());

    let telemetry = lifecycle.snapshot().telemetry;
    assert!(telemetry.get(keys::LAST_NETWORK_ERROR).is_some());
    assert!(telemetry.get(keys::LAST_SUBSCRIBE_ERROR).is_none());
    assert!(telemetry.get(keys::LAST_UNSUBSCRIBE_ERROR).is_none());
    assert!(platform.notices().iter().all(|n| n.title == "Connection error"));
}

#[tokio::test]
async fn user_actions_toggle_subscription_in_place() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    mount_success(&server, "/unsubscribe").await;
    let lifecycle = lifecycle(&server, device_env(), granting_platform());
    lifecycle.start().await;

    lifecycle.unsubscribe(None).await.unwrap();
    assert!(!lifecycle.snapshot().is_subscribed);
    assert_eq!(lifecycle.phase(), Phase::Ready);

    lifecycle.subscribe(None).await.unwrap();
    assert!(lifecycle.snapshot().is_subscribed);
    assert_eq!(lifecycle.phase(), Phase::Ready);
}

#[tokio::test]
async fn unsubscribing_another_topic_keeps_the_tracked_subscription() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    mount_success(&server, "/unsubscribe").await;
    mount_reply(&server, "/send-to-topic", json!({ "success": true, "id": "m-1" })).await;
    let lifecycle = lifecycle(&server, device_env(), granting_platform());
    assert_eq!(lifecycle.start().await, Phase::Ready);

    lifecycle.unsubscribe(Some(Topic::new("news"))).await.unwrap();

    let snapshot = lifecycle.snapshot();
    assert!(snapshot.is_subscribed);
    assert_eq!(snapshot.topic, Topic::new("general"));
    assert_eq!(
        lifecycle.send_test_notification().await.unwrap().as_deref(),
        Some("m-1")
    );

    lifecycle.unsubscribe(None).await.unwrap();
    assert!(!lifecycle.snapshot().is_subscribed);
}

#[tokio::test]
async fn overlapping_calls_apply_in_issue_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    mount_success(&server, "/unsubscribe").await;
    let lifecycle = lifecycle(&server, device_env(), granting_platform());
    lifecycle.start().await;

    // The slow subscribe would win a race; serialized, the later unsubscribe
    // decides the final state.
    let (subscribed, unsubscribed) =
        tokio::join!(lifecycle.subscribe(None), lifecycle.unsubscribe(None));
    subscribed.unwrap();
    unsubscribed.unwrap();
    assert!(!lifecycle.snapshot().is_subscribed);
}

#[tokio::test]
async fn delivered_and_tapped_events_replace_last_notification() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());
    lifecycle.start().await;

    assert!(platform.dispatch(HeadlessEvent::Received(payload("T"))));
    let snapshot = wait_for(&lifecycle, |s| s.telemetry.counter(keys::NOTIFICATION_COUNT) == 1).await;
    let record = snapshot.last_notification.unwrap();
    assert_eq!(record.source, NotificationSource::Foreground);
    assert!(!record.user_tapped);
    assert_eq!(record.title.as_deref(), Some("T"));
    assert_eq!(record.data.get("k"), Some(&json!("v")));

    assert!(platform.dispatch(HeadlessEvent::Tapped(payload("T"))));
    let snapshot = wait_for(&lifecycle, |s| s.telemetry.counter(keys::TAP_COUNT) == 1).await;
    let record = snapshot.last_notification.unwrap();
    assert_eq!(record.source, NotificationSource::Background);
    assert!(record.user_tapped);
    assert_eq!(snapshot.telemetry.counter(keys::NOTIFICATION_COUNT), 1);

    lifecycle.shutdown().await;
}

#[tokio::test]
async fn counters_increase_by_one_per_event() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());
    lifecycle.start().await;

    let mut last = 0;
    for i in 1..=5u64 {
        platform.dispatch(HeadlessEvent::Received(payload(&format!("n{i}"))));
        let snapshot =
            wait_for(&lifecycle, |s| s.telemetry.counter(keys::NOTIFICATION_COUNT) >= i).await;
        let count = snapshot.telemetry.counter(keys::NOTIFICATION_COUNT);
        assert_eq!(count, last + 1);
        last = count;
    }
    assert_eq!(lifecycle.snapshot().telemetry.counter(keys::TAP_COUNT), 0);
}

#[tokio::test]
async fn events_after_a_degraded_start_are_still_captured() {
    let server = MockServer::start().await;
    let platform = granting_platform();
    let env = RuntimeEnvironment::new(Os::Android, false);
    let lifecycle = lifecycle(&server, env, platform.clone());
    assert_eq!(lifecycle.start().await, Phase::Degraded);

    platform.dispatch(HeadlessEvent::Tapped(payload("late")));
    let snapshot = wait_for(&lifecycle, |s| s.last_notification.is_some()).await;
    assert!(snapshot.last_notification.unwrap().user_tapped);
}

#[tokio::test]
async fn shutdown_stops_capturing() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());
    lifecycle.start().await;
    assert_eq!(platform.observer_count(), 2);

    lifecycle.shutdown().await;
    assert_eq!(platform.observer_count(), 0);
    assert!(!platform.dispatch(HeadlessEvent::Received(payload("ignored"))));
    assert!(lifecycle.snapshot().last_notification.is_none());
}

#[tokio::test]
async fn dropping_the_lifecycle_releases_observers() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    let platform = granting_platform();
    {
        let lifecycle = lifecycle(&server, device_env(), platform.clone());
        lifecycle.start().await;
        assert_eq!(platform.observer_count(), 2);
    }
    wait_for_observers(&platform, 0).await;
}

#[tokio::test]
async fn test_connection_reports_health_message() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "up" })))
        .mount(&server)
        .await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());

    assert_eq!(lifecycle.test_connection().await.unwrap(), "up");
    let entry = lifecycle
        .snapshot()
        .telemetry
        .get(keys::LAST_HEALTH_CHECK)
        .cloned()
        .unwrap();
    assert_eq!(entry["message"], json!("up"));
    assert_eq!(platform.notices()[0].title, "Connection OK");
}

#[tokio::test]
async fn test_connection_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());

    assert!(lifecycle.test_connection().await.is_err());
    assert!(lifecycle.snapshot().telemetry.get(keys::LAST_HEALTH_ERROR).is_some());
    assert_eq!(platform.notices()[0].title, "Connection error");
}

#[tokio::test]
async fn test_notification_requires_subscription() {
    let server = MockServer::start().await;
    mount_reply(&server, "/subscribe", json!({ "success": false, "error": "down" })).await;
    let lifecycle = lifecycle(&server, device_env(), granting_platform());
    lifecycle.start().await;

    assert!(matches!(
        lifecycle.send_test_notification().await,
        Err(ClientError::NotSubscribed(topic)) if topic == "general"
    ));
}

#[tokio::test]
async fn test_notification_is_sent_to_current_topic() {
    let server = MockServer::start().await;
    mount_success(&server, "/subscribe").await;
    Mock::given(method("POST"))
        .and(path("/send-to-topic"))
        .and(body_partial_json(json!({ "topic": "general", "data": { "kind": "test" } })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "id": "msg-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let platform = granting_platform();
    let lifecycle = lifecycle(&server, device_env(), platform.clone());
    lifecycle.start().await;

    let id = lifecycle.send_test_notification().await.unwrap();
    assert_eq!(id.as_deref(), Some("msg-1"));
    assert!(lifecycle.snapshot().telemetry.get(keys::LAST_SEND_SUCCESS).is_some());
    assert!(platform
        .notices()
        .iter()
        .any(|n| n.title == "Notification sent" && n.message.contains("msg-1")));
}

#[tokio::test]
async fn fallback_endpoint_is_used_without_tunnel() {
    let server = MockServer::start().await;
    let env = RuntimeEnvironment::new(Os::Android, true);
    let lifecycle = lifecycle(&server, env, granting_platform());
    assert_eq!(lifecycle.resolution().source, EndpointSource::Fallback);
    assert_eq!(
        lifecycle.endpoint().as_str(),
        format!("http://192.168.0.7:{}", server.address().port())
    );
    assert_eq!(
        lifecycle.snapshot().telemetry.get(keys::SERVER_URL),
        Some(&json!(lifecycle.endpoint().as_str()))
    );
}
