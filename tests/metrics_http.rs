// tests/metrics_http.rs
//
// Metrics/health router exercised via tower::ServiceExt::oneshot, no sockets.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use movie_catalog_ingest::metrics::router_for;
use tower::ServiceExt as _;

#[tokio::test]
async fn health_returns_ok() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let app = router_for(recorder.handle());

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn metrics_renders_recorded_counters() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || {
        metrics::counter!("ingest_records_inserted_total").increment(2);
    });

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = router_for(handle).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ingest_records_inserted_total 2"), "{text}");
}
