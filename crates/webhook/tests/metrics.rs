#![forbid(unsafe_code)]

// Installs a global recorder, so it lives in its own test binary.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use metrics_exporter_prometheus::PrometheusBuilder;
use sidecar_webhook::admission::inject_handler;
use sidecar_webhook::{WebhookError, WebhookState};

#[tokio::test]
async fn rejected_requests_are_timed() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_boxed_recorder(Box::new(recorder)).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    let out = inject_handler(State(Arc::new(WebhookState::default())), headers, Bytes::from_static(b"{}")).await;
    assert!(matches!(out, Err(WebhookError::UnsupportedMediaType(_))));

    let out = inject_handler(State(Arc::new(WebhookState::default())), HeaderMap::new(), Bytes::new()).await;
    assert!(matches!(out, Err(WebhookError::EmptyBody)));

    let rendered = handle.render();
    assert!(rendered.contains("admission_requests_total 2"), "rendered={}", rendered);
    assert!(rendered.contains("admission_latency_ms_count 2"), "rendered={}", rendered);
}
