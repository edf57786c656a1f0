//! The router's single error type and its HTTP mapping.
//!
//! Every fallible operation in the gateway ultimately returns one of these
//! variants; `IntoResponse` is the one place that translates a result tag
//! into a status code and a `{"error": {"message", "code"}}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("weights missing: {0}")]
    WeightsMissing(String),
    #[error("ambiguous weights: {0}")]
    AmbiguousWeights(String),
    #[error("install failed: {0}")]
    InstallFailed(String),
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("all models busy: {0}")]
    AllModelsBusy(String),
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
    #[error("upstream failed: {0}")]
    UpstreamFailed(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::ModelNotFound(_) => (StatusCode::NOT_FOUND, "model_not_found"),
            Error::WeightsMissing(_) => (StatusCode::UNPROCESSABLE_ENTITY, "weights_missing"),
            Error::AmbiguousWeights(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ambiguous_weights"),
            Error::InstallFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "install_failed"),
            Error::UnsupportedPlatform(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_platform")
            }
            Error::AllModelsBusy(_) => (StatusCode::SERVICE_UNAVAILABLE, "all_models_busy"),
            Error::UpstreamTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            Error::UpstreamFailed(_) => (StatusCode::BAD_GATEWAY, "upstream_failed"),
            Error::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "not_implemented"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "code": code,
            }
        }));
        (status, body).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamTimeout(err.to_string())
        } else {
            Error::UpstreamFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let err = Error::BadRequest("missing field".into());
        assert_eq!(err.status_and_code().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn all_models_busy_maps_to_503() {
        let err = Error::AllModelsBusy("llamacpp at capacity".into());
        assert_eq!(err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_implemented_maps_to_501() {
        let err = Error::NotImplemented("api/create".into());
        assert_eq!(err.status_and_code().0, StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn upstream_timeout_maps_to_504() {
        let err = Error::UpstreamTimeout("deadline exceeded".into());
        assert_eq!(err.status_and_code().0, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn error_body_uses_code_field_not_type() {
        let response = Error::ModelNotFound("Qwen3-4B".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
