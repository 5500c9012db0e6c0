use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skyhold_core::ReservationError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    InvalidStateError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidStateError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::NotFound(msg) => AppError::NotFoundError(msg),
            ReservationError::SeatUnavailable => AppError::ConflictError(err.to_string()),
            ReservationError::InvalidState(msg) => AppError::InvalidStateError(msg),
            // Storage text is logged, never returned.
            ReservationError::StorageFailure(source) => AppError::Anyhow(anyhow::Error::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyhold_core::LedgerError;

    #[test]
    fn test_domain_errors_map_to_status_codes() {
        let cases = [
            (ReservationError::NotFound("reservation 1 not found".into()), StatusCode::NOT_FOUND),
            (ReservationError::SeatUnavailable, StatusCode::CONFLICT),
            (ReservationError::InvalidState("reservation 1 is CONFIRMED".into()), StatusCode::BAD_REQUEST),
            (ReservationError::StorageFailure(LedgerError::NotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
