use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Invalid status: Order is already in transit",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Reason phrase of the status code
    #[schema(example = "Bad Request")]
    pub error: String,
    /// What went wrong, safe to show to a user
    #[schema(example = "Invalid status: Order is already in transit")]
    pub message: String,
    /// Machine-readable error kind
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "invalid_status")]
    pub details: Option<String>,
    /// Echo of the `x-request-id` header
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339, UTC
    #[schema(example = "2024-12-09T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation is not allowed for the record's current status
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Submitted one-time password does not match
    #[error("Invalid OTP: {0}")]
    InvalidOtp(String),

    /// OTP or reset token is past its validity window
    #[error("Expired credential: {0}")]
    ExpiredCredential(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Hash error: {0}")]
    HashError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// HTTP status for this error. Handlers never pick a status themselves.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidStatus(_)
            | Self::InvalidOtp(_)
            | Self::ExpiredCredential(_)
            | Self::InsufficientStock(_) => StatusCode::BAD_REQUEST,
            Self::AuthError(_) | Self::Unauthorized(_) | Self::JwtError(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::HashError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable snake_case identifier clients can branch on
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::AuthError(_) | Self::Unauthorized(_) | Self::JwtError(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidStatus(_) => "invalid_status",
            Self::InvalidOtp(_) => "invalid_otp",
            Self::ExpiredCredential(_) => "expired_credential",
            Self::Conflict(_) => "conflict",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::HashError(_) | Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Message placed in the response body. Storage, hashing and other
    /// internal failures are reduced to a generic phrase.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::HashError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: Some(self.kind().to_string()),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rstest::rstest;

    #[tokio::test]
    async fn error_body_carries_request_id_and_kind() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.details.as_deref(), Some("not_found"));
    }

    #[rstest]
    #[case(ServiceError::NotFound("order".into()), StatusCode::NOT_FOUND, "not_found")]
    #[case(ServiceError::ValidationError("phone".into()), StatusCode::BAD_REQUEST, "validation_error")]
    #[case(ServiceError::InsufficientStock("milk".into()), StatusCode::BAD_REQUEST, "insufficient_stock")]
    #[case(ServiceError::InvalidStatus("delivered".into()), StatusCode::BAD_REQUEST, "invalid_status")]
    #[case(ServiceError::JwtError("exp".into()), StatusCode::UNAUTHORIZED, "unauthorized")]
    #[case(ServiceError::Forbidden("approval".into()), StatusCode::FORBIDDEN, "forbidden")]
    #[case(ServiceError::Conflict("phone".into()), StatusCode::CONFLICT, "conflict")]
    fn maps_each_kind_to_one_status(
        #[case] err: ServiceError,
        #[case] status: StatusCode,
        #[case] kind: &str,
    ) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn expired_and_wrong_otp_share_status_but_not_kind() {
        let expired = ServiceError::ExpiredCredential("OTP has expired.".into());
        let wrong = ServiceError::InvalidOtp("Invalid OTP provided.".into());

        assert_eq!(expired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(wrong.status_code(), StatusCode::BAD_REQUEST);
        assert_ne!(expired.kind(), wrong.kind());
        assert_ne!(expired.response_message(), wrong.response_message());
    }

    #[test]
    fn internal_failures_are_not_described() {
        assert_eq!(
            ServiceError::HashError("argon2 params".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("disk".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("Order not found".into()).response_message(),
            "Not found: Order not found"
        );
    }
}
