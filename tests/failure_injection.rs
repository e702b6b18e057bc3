//! Failure injection tests for the service gateway.

use std::time::Duration;

use axum::http::StatusCode;
use service_gateway::resilience::FailureKind;

mod common;

use common::{
    client, closed_port, endpoint, gateway_config, reply, service, start_gateway,
    start_mock_backend, start_programmable_backend,
};

const SVC: &str = "fabric:/App/Svc";

#[tokio::test]
async fn test_retry_on_server_error() {
    let backend = start_programmable_backend(|call| async move {
        if call < 2 {
            reply(503, "Service Unavailable")
        } else {
            reply(200, "Success")
        }
    })
    .await;

    let config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/items")).send().await.expect("gateway unreachable");

    assert_eq!(res.status(), StatusCode::OK, "should eventually succeed after retries");
    assert_eq!(res.text().await.unwrap(), "Success");
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_relay_last_backend_response() {
    let backend = start_mock_backend(500, "boom").await;

    let mut config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    config.retries.max_retry_count = 2;
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "boom");
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn test_server_errors_pass_through_when_status_retries_disabled() {
    let backend = start_mock_backend(503, "busy").await;

    let mut config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    config.retries.retry_status_errors = Some(false);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_intentional_not_found_is_relayed_once() {
    let backend = start_programmable_backend(|_| async {
        let mut response = reply(404, "no such order");
        response
            .headers_mut()
            .insert("x-servicefabric", "ResourceNotFound".parse().unwrap());
        response
    })
    .await;

    let config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/orders/9")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().get("x-servicefabric").is_none());
    assert_eq!(res.text().await.unwrap(), "no such order");
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_stale_not_found_is_retried_twice() {
    let backend = start_mock_backend(404, "gone").await;

    let config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/orders/9")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.hits(), 3, "one attempt plus two re-resolutions");
}

#[tokio::test]
async fn test_unreachable_backend_yields_bad_gateway() {
    let dead = closed_port().await;

    let mut config = gateway_config(
        &[("/", SVC)],
        vec![service(SVC, vec![endpoint(format!("http://{dead}/"))])],
    );
    config.retries.max_retry_count = 1;
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "backend_unreachable");
}

#[tokio::test]
async fn test_slow_backend_yields_gateway_timeout() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        reply(200, "late")
    })
    .await;

    let mut config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    config.retries.operation_timeout_ms = 100;
    config.retries.max_retry_count = 1;
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_non_retryable_kind_fails_fast() {
    let dead = closed_port().await;

    let mut config = gateway_config(
        &[("/", SVC)],
        vec![service(SVC, vec![endpoint(format!("http://{dead}/"))])],
    );
    config.retries.max_retry_backoff_ms = 5_000;
    config.retries.do_not_retry = vec![FailureKind::ConnectFailure];
    let gateway = start_gateway(config).await;

    let started = std::time::Instant::now();
    let res = client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(2), "no backoff expected");
}

#[tokio::test]
async fn test_post_body_is_replayed_on_retry() {
    let backend = start_programmable_backend(|call| async move {
        if call == 0 {
            reply(503, "")
        } else {
            reply(201, "created")
        }
    })
    .await;

    let config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    let gateway = start_gateway(config).await;

    let res = client()
        .post(gateway.url("/items"))
        .body(r#"{"sku":"A-1","qty":2}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    for recorded in &requests {
        assert_eq!(recorded.method, "POST");
        assert_eq!(&recorded.body[..], br#"{"sku":"A-1","qty":2}"#);
    }
}

#[tokio::test]
async fn test_unknown_service_yields_service_unavailable() {
    let config = gateway_config(&[("/", "fabric:/App/Missing")], vec![]);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "resolve_failed");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let backend = start_mock_backend(200, "ok").await;

    let mut config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    config.listener.max_body_size = 16;
    let gateway = start_gateway(config).await;

    let res = client()
        .post(gateway.url("/upload"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_client_disconnect_stops_retries() {
    let backend = start_programmable_backend(|_| async { reply(503, "busy") }).await;

    let mut config = gateway_config(&[("/", SVC)], vec![service(SVC, vec![endpoint(backend.url())])]);
    config.retries.max_retry_count = 1_000;
    config.retries.max_retry_backoff_ms = 40;
    let gateway = start_gateway(config).await;

    let url = gateway.url("/slow");
    let in_flight = tokio::spawn(async move { client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(backend.hits() > 0, "retries should be under way");

    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());

    // Let an attempt that was already on the wire land.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled = backend.hits();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.hits(), settled, "no attempts after the caller went away");
}
