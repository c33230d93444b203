//! Control-plane queue and admin read API, end to end.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use gannet::bus::{RouteMessage, UpdateQueue};
use gannet::farm::{Farm, FarmDefaults};
use gannet::lifecycle::Shutdown;

mod common;

async fn drain() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn updates_apply_in_arrival_order() {
    let farm = Arc::new(Farm::new(FarmDefaults::default()));
    let shutdown = Shutdown::new();
    let (updates, _task) = UpdateQueue::start(farm.clone(), shutdown.subscribe());

    updates.publish_add(RouteMessage::build(
        "a.test",
        "",
        "",
        true,
        "/virtualhost",
        &json!({}),
    ));
    updates.publish_add(RouteMessage::build(
        "a.test",
        "10.0.0.1",
        "8080",
        true,
        "/real",
        &json!({}),
    ));
    updates.publish_version("3");
    drain().await;

    let vhost = farm.get_virtualhost("a.test").expect("virtualhost applied");
    assert!(vhost.has_backends());
    assert_eq!(farm.version(), 3);

    updates.publish_del(RouteMessage::build(
        "a.test",
        "10.0.0.1",
        "8080",
        true,
        "/real",
        &json!({}),
    ));
    drain().await;
    assert!(!vhost.has_backends());

    updates.publish_del(RouteMessage::build(
        "",
        "",
        "",
        true,
        "/route",
        &json!({}),
    ));
    drain().await;
    assert!(farm.is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn admin_read_api_serves_registry_state() {
    let farm = Arc::new(Farm::new(FarmDefaults::default()));
    farm.set_version(9);
    let vhost = farm.add_virtualhost_default("a.test").unwrap();
    vhost
        .add_backend("10.0.0.1:8080", gannet::backend::BackendProperties::default())
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let admin_farm = farm.clone();
    tokio::spawn(async move {
        let _ = gannet::admin::serve(admin_farm, listener, rx).await;
    });
    common::settle().await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let base = format!("http://{}", addr);

    let version: serde_json::Value = client
        .get(format!("{}/version", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["version"], 9);

    let farm_view: serde_json::Value = client
        .get(format!("{}/farm", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(farm_view["virtualhosts"][0]["id"], "a.test");

    let vhost_view = client
        .get(format!("{}/virtualhost/a.test", base))
        .send()
        .await
        .unwrap();
    assert_eq!(vhost_view.status(), StatusCode::OK);
    let vhost_view: serde_json::Value = vhost_view.json().await.unwrap();
    assert_eq!(vhost_view["backends"][0]["id"], "10.0.0.1:8080");

    let backend_view = client
        .get(format!("{}/backend/10.0.0.1:8080", base))
        .send()
        .await
        .unwrap();
    assert_eq!(backend_view.status(), StatusCode::OK);

    // Missing entities: 404 with a generated message body, not empty.
    let missing = client
        .get(format!("{}/virtualhost/missing.test", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let missing: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(missing["message"], "Not Found");

    shutdown.trigger();
}
