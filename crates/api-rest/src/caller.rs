//! Extractor resolving the authenticated caller of a request.

use crate::{ApiError, AppState};
use api_shared::auth::{API_KEY_HEADER, CALLER_HEADER};
use api_shared::{parse_caller, validate_api_key, CallerIdentity};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use carelith_core::{Caller, DoctorId, PatientId};

/// The caller behind a request, after API-key validation.
#[derive(Clone, Debug)]
pub struct AuthenticatedCaller(pub Caller);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

        validate_api_key(header(API_KEY_HEADER), &state.api_key)?;
        let caller = match parse_caller(header(CALLER_HEADER))? {
            CallerIdentity::Doctor(id) => Caller::Doctor(DoctorId::new(id)),
            CallerIdentity::Patient(id) => Caller::Patient(PatientId::new(id)),
        };
        Ok(Self(caller))
    }
}
