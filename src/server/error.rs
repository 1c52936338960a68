//! HTTP error mapping.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::core::errors::ServiceError;

/// Wrapper translating [`ServiceError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ServiceError::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ServiceError::AlreadyExists(_) | ServiceError::InvalidArgument(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            ServiceError::Unauthenticated(_) | ServiceError::InvalidCredential => {
                let body = Json(json!({ "error": self.0.to_string() }));
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    body,
                )
                    .into_response();
            }
            err => {
                // Cause stays server-side; the caller gets a generic message.
                tracing::error!(error = %err, "internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Convenience result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError(ServiceError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_already_exists_maps_to_400() {
        let response =
            ApiError(ServiceError::AlreadyExists("email already registered".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthenticated_maps_to_401_with_challenge() {
        let response =
            ApiError(ServiceError::Unauthenticated("invalid authentication credentials"))
                .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_storage_error_maps_to_500() {
        let response =
            ApiError(ServiceError::Internal("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
