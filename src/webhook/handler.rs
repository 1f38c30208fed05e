//! `POST /mutate` handler
//!
//! Transport problems (empty body, wrong content type, unencodable response)
//! are answered with HTTP errors. Everything after the body is accepted is
//! answered with a well-formed AdmissionReview, even when decoding or
//! mutation failed.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::review::{decode_review, encode_review};
use super::WebhookState;

/// Media type required on admission requests
const JSON_CONTENT_TYPE: &str = "application/json";

/// Error type for transport-level failures
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request carried no body
    #[error("empty body")]
    EmptyBody,

    /// The request body is not declared as JSON
    #[error("invalid Content-Type {0:?}, expect `application/json`")]
    UnsupportedContentType(String),

    /// The admission response could not be serialized
    #[error("could not encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::EmptyBody => StatusCode::BAD_REQUEST,
            WebhookError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            WebhookError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Handle a mutating admission review
///
/// 1. Reject empty bodies and non-JSON content types
/// 2. Decode the AdmissionReview, answering decode failures in-band
/// 3. Run the mutation policy for the declared kind
/// 4. Encode the AdmissionReview response
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    if body.is_empty() {
        error!("empty body");
        return Err(WebhookError::EmptyBody);
    }

    debug!(body = %String::from_utf8_lossy(&body), "Received admission review");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_json(content_type) {
        error!(content_type = %content_type, "Unexpected Content-Type, expect application/json");
        return Err(WebhookError::UnsupportedContentType(content_type.to_string()));
    }

    let response = match decode_review(&body) {
        Ok(request) => state.policy.admit(&request),
        Err(e) => {
            error!(uid = ?e.uid(), error = %e, "Can't decode body");
            e.into_response()
        }
    };

    let bytes = encode_review(response).map_err(|e| {
        error!(error = %e, "Can't encode response");
        WebhookError::Encode(e)
    })?;

    Ok(([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response())
}

/// True for `application/json`, ignoring case and media type parameters
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}
