//! Mapping of portal and authentication errors onto HTTP responses.

use api_shared::{AuthError, ErrorRes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use carelith_core::PortalError;

/// Shown for local storage failures; the logged error carries the path and cause.
pub(crate) const STORAGE_FAILURE_MESSAGE: &str =
    "Could not read or save portal data. No changes were made, please try again.";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        let status = match &err {
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::ContactMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PortalError::DeliveryFailed(_) | PortalError::BridgeUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            PortalError::Unauthorized(_) => StatusCode::FORBIDDEN,
            PortalError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PortalError::StorageFailure(_)
            | PortalError::Io(_)
            | PortalError::Serialization(_)
            | PortalError::Fhir(_)
            | PortalError::Files(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        }
        let message = match &err {
            PortalError::StorageFailure(_) => STORAGE_FAILURE_MESSAGE.to_string(),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => "Internal error".to_string(),
            _ => err.to_string(),
        };
        Self { status, message }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorRes {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_errors_map_to_statuses() {
        let cases = [
            (PortalError::NotFound("patient p9".into()), StatusCode::NOT_FOUND),
            (PortalError::ContactMissing("p2".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PortalError::DeliveryFailed("x".into()), StatusCode::BAD_GATEWAY),
            (PortalError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (PortalError::BridgeUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (PortalError::StorageFailure("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PortalError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError::from(PortalError::StorageFailure("/srv/data/grants.json".into()));
        assert_eq!(err.message, STORAGE_FAILURE_MESSAGE);
        assert!(!err.message.contains("/srv"));

        let err = ApiError::from(PortalError::Io(std::io::Error::other("/srv/data")));
        assert_eq!(err.message, "Internal error");

        let err = ApiError::from(PortalError::NotFound("patient p9".into()));
        assert_eq!(err.message, "patient p9 not found");
    }
}
