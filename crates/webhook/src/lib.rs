//! Sidecar webhook: the HTTPS transport around the injection core.
//!
//! - `POST /inject` - mutate pods per the named injection profiles
//! - `GET /healthz` - liveness

#![forbid(unsafe_code)]

pub mod admission;
pub mod error;
pub mod server;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sidecar_core::{MutationPolicy, ProfileRegistry};

pub use admission::{review, INJECT_PATH};
pub use error::WebhookError;
pub use server::{serve, ServerConfig};

/// Shared, read-only state for every admission request.
#[derive(Debug, Clone, Default)]
pub struct WebhookState {
    pub registry: ProfileRegistry,
    pub policy: MutationPolicy,
}

impl WebhookState {
    pub fn new(registry: ProfileRegistry, policy: MutationPolicy) -> Self {
        Self { registry, policy }
    }
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(INJECT_PATH, post(admission::inject_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}
