use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use medsync_store::StoreError;

/// REST-facing error: a status code plus a JSON `{message}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("encoding error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(serde_json::json!({"message": self.message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::from(StoreError::NotFound("user 4".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("user 4"));
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::from(StoreError::Conflict("duplicate".into()));
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn database_error_maps_to_500() {
        let err = ApiError::from(StoreError::Database("boom".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
