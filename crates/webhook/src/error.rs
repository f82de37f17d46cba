use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors raised by the webhook transport. Policy outcomes are never errors:
/// they travel inside the AdmissionReview response.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request carried no body at all
    #[error("empty body")]
    EmptyBody,

    /// Anything other than a JSON payload
    #[error("invalid Content-Type {0:?}, expect `application/json`")]
    UnsupportedMediaType(String),

    /// The TLS certificate or key could not be loaded
    #[error("loading TLS certificate/key: {0}")]
    Tls(#[source] std::io::Error),

    /// The listener failed while serving
    #[error("webhook server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::EmptyBody => StatusCode::BAD_REQUEST,
            WebhookError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            WebhookError::Tls(_) | WebhookError::Serve(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(WebhookError::EmptyBody.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebhookError::UnsupportedMediaType("text/plain".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        let resp = WebhookError::EmptyBody.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn media_type_message_names_expected_type() {
        let msg = WebhookError::UnsupportedMediaType("text/plain".into()).to_string();
        assert!(msg.contains("application/json"), "msg={}", msg);
        assert!(msg.contains("text/plain"), "msg={}", msg);
    }
}
