//! Routing, translation and reload tests for the service gateway.

use std::time::Duration;

use axum::http::StatusCode;
use service_gateway::config::PartitionSource;

mod common;

use common::{
    client, endpoint, gateway_config, named_endpoint, reply, service, start_gateway,
    start_mock_backend, start_programmable_backend,
};

#[tokio::test]
async fn test_forwarding_headers_reach_backend() {
    let backend = start_mock_backend(200, "ok").await;

    let config = gateway_config(
        &[("/api", "fabric:/App/Api")],
        vec![service("fabric:/App/Api", vec![endpoint(backend.url())])],
    );
    let gateway = start_gateway(config).await;

    let res = client()
        .get(gateway.url("/api/items/3?expand=true"))
        .header("x-forwarded-for", "client1")
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "req-42");
    assert_eq!(res.headers()["via"], "1.1 gw-test");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let seen = &requests[0];
    assert_eq!(seen.uri, "/items/3?expand=true");
    assert_eq!(seen.headers["x-forwarded-for"], "client1,127.0.0.1");
    assert_eq!(seen.headers["x-forwarded-pathbase"], "/api");
    assert_eq!(seen.headers["x-forwarded-proto"], "http");
    assert_eq!(seen.headers["x-forwarded-host"], gateway.addr.to_string().as_str());
    assert_eq!(seen.headers["via"], "1.1 gw-test");
    assert_eq!(seen.headers["x-request-id"], "req-42");

    let forwarded = seen.headers["forwarded"].to_str().unwrap();
    assert!(forwarded.starts_with("by=_gw-test;for=127.0.0.1;host="), "{forwarded}");
    assert!(forwarded.ends_with(";proto=http"), "{forwarded}");
}

#[tokio::test]
async fn test_request_id_is_generated_when_absent() {
    let backend = start_mock_backend(200, "ok").await;

    let config = gateway_config(
        &[("/", "fabric:/App/Svc")],
        vec![service("fabric:/App/Svc", vec![endpoint(backend.url())])],
    );
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/")).send().await.unwrap();

    let generated = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(generated.len(), 36);
    assert_eq!(backend.requests()[0].headers["x-request-id"], generated.as_str());
}

#[tokio::test]
async fn test_first_matching_prefix_wins() {
    let orders = start_mock_backend(200, "orders").await;
    let everything = start_mock_backend(200, "fallback").await;

    let config = gateway_config(
        &[("/orders", "fabric:/Shop/Orders"), ("/", "fabric:/Shop/Web")],
        vec![
            service("fabric:/Shop/Orders", vec![endpoint(orders.url())]),
            service("fabric:/Shop/Web", vec![endpoint(everything.url())]),
        ],
    );
    let gateway = start_gateway(config).await;
    let client = client();

    let body = client.get(gateway.url("/orders/1")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "orders");

    let body = client.get(gateway.url("/ordersx")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "fallback", "prefix matching is segment-aware");

    assert_eq!(everything.requests()[0].uri, "/ordersx");
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let backend = start_mock_backend(200, "ok").await;

    let config = gateway_config(
        &[("/api", "fabric:/App/Api")],
        vec![service("fabric:/App/Api", vec![endpoint(backend.url())])],
    );
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/other")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "Not Found");
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_named_partition_from_header() {
    let eu = start_mock_backend(200, "eu").await;
    let us = start_mock_backend(200, "us").await;

    let mut config = gateway_config(
        &[("/tenants", "fabric:/App/Tenants")],
        vec![service(
            "fabric:/App/Tenants",
            vec![named_endpoint(eu.url(), "eu"), named_endpoint(us.url(), "us")],
        )],
    );
    config.routes[0].named_partition = Some(PartitionSource::Header("x-region".into()));
    let gateway = start_gateway(config).await;
    let client = client();

    for region in ["eu", "us", "eu"] {
        let body = client
            .get(gateway.url("/tenants/contoso"))
            .header("x-region", region)
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, region);
    }
    assert_eq!(eu.hits(), 2);
    assert_eq!(us.hits(), 1);

    let res = client.get(gateway.url("/tenants/contoso")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "partition_key");
}

#[tokio::test]
async fn test_redirects_are_relayed_not_followed() {
    let backend = start_programmable_backend(|_| async {
        let mut response = reply(302, "");
        response
            .headers_mut()
            .insert("location", "/elsewhere".parse().unwrap());
        response
    })
    .await;

    let config = gateway_config(
        &[("/", "fabric:/App/Svc")],
        vec![service("fabric:/App/Svc", vec![endpoint(backend.url())])],
    );
    let gateway = start_gateway(config).await;

    let client = reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let res = client.get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()["location"], "/elsewhere");
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_reload_switches_endpoints() {
    let old = start_mock_backend(200, "old").await;
    let new = start_mock_backend(200, "new").await;

    let config = gateway_config(
        &[("/", "fabric:/App/Svc")],
        vec![service("fabric:/App/Svc", vec![endpoint(old.url())])],
    );
    let gateway = start_gateway(config.clone()).await;
    let client = client();

    let body = client.get(gateway.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "old");

    let mut reloaded = config;
    reloaded.services = vec![service("fabric:/App/Svc", vec![endpoint(new.url())])];
    gateway.updates.send(reloaded).unwrap();

    let mut switched = false;
    for _ in 0..50 {
        let body = client.get(gateway.url("/")).send().await.unwrap().text().await.unwrap();
        if body == "new" {
            switched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(switched, "reloaded endpoints should be used");
}
