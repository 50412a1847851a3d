use crate::domain::error::BillingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

// Обертка (Newtype) для нашей доменной ошибки, чтобы реализовать для нее трейт Axum
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

// Вся логика HTTP-ответов живет в слое адаптеров
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            BillingError::SignatureMissing => (
                StatusCode::BAD_REQUEST,
                "webhook_error",
                "missing signature header".to_string(),
            ),
            BillingError::SignatureInvalid(_) => (
                StatusCode::BAD_REQUEST,
                "webhook_error",
                "invalid webhook signature".to_string(),
            ),
            BillingError::MalformedBody(msg) => {
                (StatusCode::BAD_REQUEST, "malformed_event", msg.clone())
            }
            BillingError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            BillingError::Provider(err) => {
                tracing::error!("provider error: {err}");
                (
                    StatusCode::BAD_GATEWAY,
                    "provider_error",
                    "billing provider unavailable".to_string(),
                )
            }
            BillingError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            BillingError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
