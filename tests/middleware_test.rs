#![cfg(feature = "axum")]

use adaptive_circuit_breaker::{
    clock::ManualClock, middleware::BreakerLayer, proba::FixedProbability, BreakerConfig,
    CircuitBreaker,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tower::{service_fn, Layer, ServiceExt};

type Reports = Arc<Mutex<Vec<String>>>;

fn breaker_with_reports() -> (CircuitBreaker, Reports) {
    let config = BreakerConfig::builder().name("billing").build().unwrap();
    let reports: Reports = Arc::default();
    let sink = {
        let reports = reports.clone();
        move |msg: &str| reports.lock().unwrap().push(msg.to_string())
    };
    let breaker = CircuitBreaker::builder(config)
        .clock(Arc::new(ManualClock::new()))
        .probability(Arc::new(FixedProbability(0.0)))
        .sink(Arc::new(sink))
        .build()
        .unwrap();
    (breaker, reports)
}

fn breaker() -> CircuitBreaker {
    breaker_with_reports().0
}

async fn failing(_req: Request<Body>) -> Result<Response, Infallible> {
    Ok(StatusCode::BAD_GATEWAY.into_response())
}

async fn healthy(_req: Request<Body>) -> Result<Response, Infallible> {
    Ok(StatusCode::OK.into_response())
}

fn request() -> Request<Body> {
    Request::builder().uri("/charge").body(Body::empty()).unwrap()
}

#[tokio::test]
async fn server_errors_trip_the_breaker() {
    let (breaker, reports) = breaker_with_reports();
    let svc = BreakerLayer::new(breaker.clone()).layer(service_fn(failing));

    // protection of 5: the first six failures reach the upstream
    for _ in 0..6 {
        let resp = svc.clone().oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    let resp = svc.clone().oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "service_unavailable");
    assert_eq!(json["service"], "billing");
    assert!(json["drop_ratio"].as_f64().unwrap() > 0.0);

    // failure history goes to the report sink, never to the client
    assert!(json.get("recent_errors").is_none());
    assert!(!String::from_utf8_lossy(&body).contains("upstream returned"));
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("upstream returned 502 Bad Gateway"));

    assert_eq!(breaker.stats().total, 6);
}

#[tokio::test]
async fn successful_responses_keep_breaker_closed() {
    let breaker = breaker();
    let svc = BreakerLayer::new(breaker.clone()).layer(service_fn(healthy));

    for _ in 0..50 {
        let resp = svc.clone().oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let stats = breaker.stats();
    assert_eq!((stats.accepts, stats.total), (50.0, 50));
}

#[tokio::test]
async fn bypass_header_skips_breaker() {
    let breaker = breaker();
    let svc = BreakerLayer::new(breaker.clone())
        .bypass_header("x-health-check-bypass")
        .layer(service_fn(failing));

    for _ in 0..6 {
        let _ = svc.clone().oneshot(request()).await.unwrap();
    }
    assert!(breaker.allow().is_err());

    let health_check = Request::builder()
        .uri("/charge")
        .header("x-health-check-bypass", "1")
        .body(Body::empty())
        .unwrap();
    let resp = svc.clone().oneshot(health_check).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(breaker.stats().total, 6);
}
