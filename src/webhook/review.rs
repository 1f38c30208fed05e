//! AdmissionReview envelope decoding and encoding
//!
//! Requests are decoded leniently: only the fields the mutation engine reads
//! are required, and the embedded object stays raw JSON so that a malformed
//! object surfaces as a per-kind decode failure instead of a broken envelope.
//! Responses are kube's [`AdmissionResponse`].

use kube::core::admission::AdmissionResponse;
use kube::core::{GroupVersionKind, Status, TypeMeta};
use serde::Deserialize;
use serde_json::Value;

/// Envelope version answered when the request does not name one
pub const DEFAULT_REVIEW_API_VERSION: &str = "admission.k8s.io/v1";

const REVIEW_KIND: &str = "AdmissionReview";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewEnvelope {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    request: Option<ReviewRequest>,
}

/// The request half of an inbound AdmissionReview
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    /// Envelope type the response must echo
    #[serde(skip)]
    pub types: TypeMeta,
    /// Correlation id copied to the response
    pub uid: String,
    /// Declared kind of the embedded object
    pub kind: GroupVersionKind,
    /// Object name, empty for `generateName` creates
    #[serde(default)]
    pub name: String,
    /// Object namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// Operation being admitted, e.g. `CREATE`
    #[serde(default)]
    pub operation: Option<String>,
    /// The object being admitted, undecoded
    #[serde(default)]
    pub object: Option<Value>,
}

impl ReviewRequest {
    /// An allowed response for this request, without patch or message
    pub fn allow(&self) -> AdmissionResponse {
        // kube only builds the allowed form from its own strict request type
        let mut response = AdmissionResponse::invalid(String::new());
        response.types = self.types.clone();
        response.uid = self.uid.clone();
        response.allowed = true;
        response.result = Status::default();
        response
    }
}

/// Failure to obtain a request from an inbound envelope
///
/// Carries whatever `uid` and `apiVersion` could still be read from the raw
/// bytes so the response can be correlated.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// The body is not an AdmissionReview
    #[error("could not decode admission review: {source}")]
    Malformed {
        /// `request.uid` recovered from the raw JSON, if present
        uid: Option<String>,
        /// `apiVersion` recovered from the raw JSON, if present
        api_version: Option<String>,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// The envelope parsed but holds no request
    #[error("admission review holds no request")]
    MissingRequest {
        /// `apiVersion` of the envelope, if present
        api_version: Option<String>,
    },
}

impl ReviewError {
    /// Correlation id recovered from the failed envelope
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::Malformed { uid, .. } => uid.as_deref(),
            Self::MissingRequest { .. } => None,
        }
    }

    /// Envelope version recovered from the failed envelope
    pub fn api_version(&self) -> Option<&str> {
        match self {
            Self::Malformed { api_version, .. } | Self::MissingRequest { api_version } => {
                api_version.as_deref()
            }
        }
    }

    /// The admission response reporting this failure
    ///
    /// Not allowed, carries the error as status message, answers in the
    /// envelope version of the request and echoes the recovered uid when
    /// there is one.
    pub fn into_response(self) -> AdmissionResponse {
        let uid = self.uid().map(str::to_string);
        let types = review_types(self.api_version().map(str::to_string));

        let mut response = AdmissionResponse::invalid(self.to_string());
        response.types = types;
        if let Some(uid) = uid {
            response.uid = uid;
        }
        response
    }
}

/// Decode an inbound AdmissionReview body into its request
pub fn decode_review(body: &[u8]) -> Result<ReviewRequest, ReviewError> {
    let envelope: ReviewEnvelope = serde_json::from_slice(body).map_err(|source| {
        let partial = serde_json::from_slice::<Value>(body).ok();
        ReviewError::Malformed {
            uid: recover_str(partial.as_ref(), "/request/uid"),
            api_version: recover_str(partial.as_ref(), "/apiVersion"),
            source,
        }
    })?;

    let ReviewEnvelope {
        api_version,
        request,
    } = envelope;
    let Some(mut request) = request else {
        return Err(ReviewError::MissingRequest { api_version });
    };

    request.types = review_types(api_version);
    Ok(request)
}

/// Best-effort read of a string field from bytes that failed to decode
fn recover_str(partial: Option<&Value>, pointer: &str) -> Option<String> {
    partial?.pointer(pointer)?.as_str().map(str::to_string)
}

fn review_types(api_version: Option<String>) -> TypeMeta {
    TypeMeta {
        api_version: api_version.unwrap_or_else(|| DEFAULT_REVIEW_API_VERSION.to_string()),
        kind: REVIEW_KIND.to_string(),
    }
}

/// Wrap a response in an AdmissionReview and serialize it
pub fn encode_review(response: AdmissionResponse) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&response.into_review())
}
