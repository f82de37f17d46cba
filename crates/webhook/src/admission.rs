//! Pod injection endpoint.
//!
//! Decodes the AdmissionReview envelope, hands the pod to the core and maps
//! the outcome back onto an AdmissionResponse. Request-level problems (empty
//! body, wrong media type) are HTTP errors; an undecodable review is answered
//! with an `invalid` response inside a review, as the API server expects.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use metrics::{counter, histogram};
use sidecar_core::{decide, Outcome, PodSnapshot};
use tracing::{debug, error, info, warn};

use crate::error::WebhookError;
use crate::WebhookState;

/// Route the API server is configured to call for pod admission.
pub const INJECT_PATH: &str = "/inject";

pub async fn inject_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let started = Instant::now();
    counter!("admission_requests_total", 1u64);
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let review = review(&state, content_type, &body);
    histogram!("admission_latency_ms", started.elapsed().as_secs_f64() * 1000.0);
    review.map(Json)
}

/// Handle one raw admission request body.
pub fn review(
    state: &WebhookState,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<AdmissionReview<DynamicObject>, WebhookError> {
    if body.is_empty() {
        warn!("empty body");
        return Err(WebhookError::EmptyBody);
    }
    let content_type = content_type.unwrap_or("");
    if !is_json(content_type) {
        warn!(content_type, "unexpected Content-Type, expect application/json");
        return Err(WebhookError::UnsupportedMediaType(content_type.to_string()));
    }

    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "can't decode admission review");
            return Ok(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "admission review carries no request");
            return Ok(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Ok(mutate(state, &request).into_review())
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("application/json")
}

fn mutate(state: &WebhookState, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    let uid = request.uid.as_str();

    let Some(obj) = request.object.as_ref() else {
        debug!(uid, "no object in request, allowing unchanged");
        return response;
    };
    let pod: Pod = match serde_json::to_value(obj).and_then(serde_json::from_value) {
        Ok(p) => p,
        Err(e) => {
            warn!(uid, error = %e, "could not read object as a pod");
            counter!("admission_denied_total", 1u64);
            return response.deny(e.to_string());
        }
    };
    let snapshot = PodSnapshot::from_pod(&pod, request.namespace.as_deref());
    info!(
        uid,
        kind = ?request.kind,
        namespace = %snapshot.namespace,
        name = %snapshot.name,
        operation = ?request.operation,
        user = ?request.user_info.username,
        "admission review"
    );

    match decide(&snapshot, &state.registry, &state.policy) {
        Outcome::Allow(reason) => {
            counter!("admission_skipped_total", 1u64, "reason" => reason.as_str());
            response
        }
        Outcome::AllowWithPatch { profile, operations, patch } => {
            debug!(uid, patch = %String::from_utf8_lossy(&patch), "admission response patch");
            let ops: json_patch::Patch = match serde_json::from_slice(&patch) {
                Ok(ops) => ops,
                Err(e) => {
                    error!(uid, error = %e, "generated patch is not a JSON Patch document");
                    counter!("admission_denied_total", 1u64);
                    return response.deny(e.to_string());
                }
            };
            match response.clone().with_patch(ops) {
                Ok(r) => {
                    counter!("admission_mutations_total", 1u64, "profile" => profile.clone());
                    info!(uid, profile = %profile, operations, "injecting profile");
                    r
                }
                Err(e) => {
                    error!(uid, error = %e, "failed to attach patch");
                    counter!("admission_denied_total", 1u64);
                    response.deny(e.to_string())
                }
            }
        }
        Outcome::Deny(message) => {
            counter!("admission_denied_total", 1u64);
            response.deny(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_media_type_allows_parameters() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON"));
        assert!(!is_json("application/yaml"));
        assert!(!is_json(""));
    }
}
