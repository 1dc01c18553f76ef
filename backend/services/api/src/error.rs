use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use intranet_common::error::IntranetError;

pub struct ApiError(pub IntranetError);

impl From<IntranetError> for ApiError {
    fn from(err: IntranetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            IntranetError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            IntranetError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            IntranetError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
