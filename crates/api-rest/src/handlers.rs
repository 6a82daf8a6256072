//! HTTP handlers.
//!
//! Core operations block (file and outbound HTTP I/O), so each one runs on the blocking pool
//! via [`run_blocking`].

use crate::error::STORAGE_FAILURE_MESSAGE;
use crate::{ApiError, AppState, AuthenticatedCaller};
use api_shared::{
    CheckAccessRes, GrantRes, HealthRes, HealthService, ListGrantsRes, PatientQuery,
    RecordSummaryRes, RecordsRes, RequestAccessReq, RequestAccessRes, UploadQuery, UploadRes,
    VerifyOtpReq, VerifyOtpRes,
};
use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use carelith_core::{
    DocumentBackend, GrantId, GrantView, HospitalId, PatientId, PortalResult, PortalService, RecordSummary,
    UploadRequest,
};
use chrono::{DateTime, SecondsFormat, Utc};

async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&PortalService) -> PortalResult<T> + Send + 'static,
    T: Send + 'static,
{
    let portal = state.portal.clone();
    tokio::task::spawn_blocking(move || f(&portal))
        .await
        .map_err(|e| {
            tracing::error!("blocking task failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?
        .map_err(ApiError::from)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_grant_id(value: &str) -> Result<GrantId, ApiError> {
    GrantId::parse(value).map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}

fn patient_id(value: &str) -> Result<PatientId, ApiError> {
    value.parse::<PatientId>().map_err(ApiError::from)
}

fn grant_res(view: GrantView) -> GrantRes {
    GrantRes {
        grant_id: view.grant_id.to_string(),
        doctor_id: view.doctor.to_string(),
        patient_id: view.patient.to_string(),
        origin_org: view.origin_org.map(|o| o.to_string()),
        destination_org: view.destination_org.map(|o| o.to_string()),
        state: view.state.to_string(),
        created_at: timestamp(view.created_at),
        expires_at: timestamp(view.expires_at),
    }
}

fn summary_res(summary: RecordSummary) -> RecordSummaryRes {
    RecordSummaryRes {
        document_id: summary.document_id,
        description: summary.description,
        author_name: summary.author_name,
        hospital_name: summary.hospital_name,
        content_type: summary.content_type,
        file_url: summary.file_url,
        is_mine: summary.is_mine,
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/access/requests",
    request_body = RequestAccessReq,
    responses(
        (status = 201, description = "Code sent to the patient", body = RequestAccessRes),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "Doctor, patient or organisation not found"),
        (status = 422, description = "Patient has no e-mail address or phone number"),
        (status = 502, description = "Code could not be delivered")
    )
)]
/// Request access to a patient's record
///
/// Replaces any earlier grant between the calling doctor and the patient and sends a new
/// one-time code to the patient.
#[axum::debug_handler(state = AppState)]
pub async fn request_access(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(req): Json<RequestAccessReq>,
) -> Result<(StatusCode, Json<RequestAccessRes>), ApiError> {
    let patient = patient_id(&req.patient_id)?;
    let destination = req
        .destination_org
        .filter(|d| !d.trim().is_empty())
        .map(|d| HospitalId::new(d.trim()));

    let issued = run_blocking(&state, move |portal| {
        portal.request_access(&caller, &patient, destination)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RequestAccessRes {
            grant_id: issued.grant_id.to_string(),
            expires_at: timestamp(issued.expires_at),
            delivered_via: issued.delivered_via.to_string(),
            superseded: issued.superseded.iter().map(|g| g.to_string()).collect(),
            message: format!("Access code sent to the patient by {}", issued.delivered_via),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/access/grants/{grant_id}/verify",
    request_body = VerifyOtpReq,
    params(("grant_id" = String, Path, description = "Grant identifier")),
    responses(
        (status = 200, description = "Outcome of the submitted code", body = VerifyOtpRes),
        (status = 400, description = "Malformed grant id"),
        (status = 404, description = "Grant not found or superseded")
    )
)]
/// Submit the code the patient shared
///
/// A wrong or expired code is a normal outcome reported in the body, not an error status.
#[axum::debug_handler(state = AppState)]
pub async fn verify_otp(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(grant_id): AxumPath<String>,
    Json(req): Json<VerifyOtpReq>,
) -> Result<Json<VerifyOtpRes>, ApiError> {
    let grant_id = parse_grant_id(&grant_id)?;
    let id = grant_id.clone();
    let outcome = run_blocking(&state, move |portal| {
        portal.verify_otp(&caller, &id, req.code.trim())
    })
    .await?;

    Ok(Json(VerifyOtpRes {
        grant_id: grant_id.to_string(),
        outcome: outcome.as_str().to_string(),
        authorized: outcome == carelith_core::VerifyOutcome::Authorized,
        message: outcome.message().to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/access/check/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Whether the calling doctor holds a live grant", body = CheckAccessRes)
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn check_access(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
) -> Result<Json<CheckAccessRes>, ApiError> {
    let patient = patient_id(&patient)?;
    let id = patient.clone();
    let authorized = run_blocking(&state, move |portal| portal.check_access(&caller, &id)).await?;
    Ok(Json(CheckAccessRes {
        patient_id: patient.to_string(),
        authorized,
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}/grants",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "The patient's grants, newest first", body = ListGrantsRes),
        (status = 403, description = "Caller is not this patient")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_grants(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
) -> Result<Json<ListGrantsRes>, ApiError> {
    let patient = patient_id(&patient)?;
    let views = run_blocking(&state, move |portal| portal.patient_grants(&caller, &patient)).await?;
    Ok(Json(ListGrantsRes {
        grants: views.into_iter().map(grant_res).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}/grants/{grant_id}",
    params(
        ("patient_id" = String, Path, description = "Patient identifier"),
        ("grant_id" = String, Path, description = "Grant identifier")
    ),
    responses(
        (status = 200, description = "The grant, while it is authorised", body = GrantRes),
        (status = 403, description = "Grant not verified or expired"),
        (status = 404, description = "Grant not found")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn active_grant(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath((patient, grant_id)): AxumPath<(String, String)>,
) -> Result<Json<GrantRes>, ApiError> {
    let patient = patient_id(&patient)?;
    let grant_id = parse_grant_id(&grant_id)?;
    let view = run_blocking(&state, move |portal| {
        portal.active_grant(&caller, &patient, &grant_id)
    })
    .await?;
    Ok(Json(grant_res(view)))
}

#[utoipa::path(
    get,
    path = "/fhir/DocumentReference/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Searchset bundle of the patient's documents", body = Object),
        (status = 403, description = "No live grant"),
        (status = 502, description = "Document service unavailable")
    )
)]
/// The patient's documents as a FHIR `searchset` bundle
#[axum::debug_handler(state = AppState)]
pub async fn document_bundle(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient = patient_id(&patient)?;
    let bundle = run_blocking(&state, move |portal| portal.document_bundle(&caller, &patient)).await?;
    match bundle.fetch_error {
        Some(message) => Err(ApiError::new(StatusCode::BAD_GATEWAY, message)),
        None => Ok(Json(bundle.bundle)),
    }
}

#[utoipa::path(
    get,
    path = "/records/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Document summaries split by uploader", body = RecordsRes),
        (status = 403, description = "No live grant")
    )
)]
/// Display summaries of the patient's documents
///
/// For a doctor, documents attributed to them are listed under `mine`. `fetch_failed` tells an
/// empty record apart from an unreachable document service.
#[axum::debug_handler(state = AppState)]
pub async fn records(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
) -> Result<Json<RecordsRes>, ApiError> {
    let patient = patient_id(&patient)?;
    let view = run_blocking(&state, move |portal| portal.record_summaries(&caller, &patient)).await?;
    Ok(Json(RecordsRes {
        patient_id: view.patient_id.to_string(),
        patient_name: view.patient_name,
        all: view.summaries.all.into_iter().map(summary_res).collect(),
        mine: view.summaries.mine.into_iter().map(summary_res).collect(),
        others: view.summaries.others.into_iter().map(summary_res).collect(),
        fetch_failed: view.fetch_failed,
        message: view.message,
    }))
}

#[utoipa::path(
    post,
    path = "/fhir/DocumentReference/{patient_id}",
    params(
        ("patient_id" = String, Path, description = "Patient identifier"),
        UploadQuery
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Document stored", body = UploadRes),
        (status = 400, description = "Missing file name or empty body"),
        (status = 403, description = "Caller is not a doctor with a live grant"),
        (status = 500, description = "Local document store could not save the file", body = UploadRes),
        (status = 502, description = "Document service rejected or did not answer", body = UploadRes)
    )
)]
/// Upload a file to the patient's record
///
/// The raw request body is the file content.
#[axum::debug_handler(state = AppState)]
pub async fn upload_document(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadRes>), ApiError> {
    let patient = patient_id(&patient)?;
    let upload = UploadRequest {
        file_name: query.file_name,
        bytes: body.to_vec(),
        description: query.description,
    };
    let outcome = run_blocking(&state, move |portal| {
        portal.upload_document(&caller, &patient, upload)
    })
    .await?;

    let success = outcome.is_success();
    let (status, message) = match state.portal.config().backend() {
        _ if success => (StatusCode::CREATED, outcome.message),
        // Local failures carry filesystem paths; those stay in the log.
        DocumentBackend::Local => (
            StatusCode::INTERNAL_SERVER_ERROR,
            STORAGE_FAILURE_MESSAGE.to_string(),
        ),
        DocumentBackend::Remote => (StatusCode::BAD_GATEWAY, outcome.message),
    };
    Ok((
        status,
        Json(UploadRes {
            success,
            status: outcome.status,
            message,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/fhir/Patient/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "FHIR Patient resource", body = Object),
        (status = 403, description = "No live grant"),
        (status = 404, description = "Patient not found")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn fhir_patient(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient = patient_id(&patient)?;
    let resource = run_blocking(&state, move |portal| portal.fhir_patient(&caller, &patient)).await?;
    Ok(Json(resource))
}

#[utoipa::path(
    get,
    path = "/fhir/Encounter",
    params(PatientQuery),
    responses(
        (status = 200, description = "Searchset bundle of the patient's encounters", body = Object),
        (status = 403, description = "No live grant")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn fhir_encounters(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<PatientQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient = patient_id(&query.patient)?;
    let bundle = run_blocking(&state, move |portal| portal.encounter_bundle(&caller, &patient)).await?;
    Ok(Json(bundle))
}

#[utoipa::path(
    get,
    path = "/fhir/Observation",
    params(PatientQuery),
    responses(
        (status = 200, description = "Searchset bundle of the patient's observations", body = Object),
        (status = 403, description = "No live grant")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn fhir_observations(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<PatientQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient = patient_id(&query.patient)?;
    let bundle =
        run_blocking(&state, move |portal| portal.observation_bundle(&caller, &patient)).await?;
    Ok(Json(bundle))
}

#[utoipa::path(
    get,
    path = "/fhir/medical-history/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Encounters followed by observations", body = Object),
        (status = 403, description = "No live grant")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn medical_history(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    AxumPath(patient): AxumPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let patient = patient_id(&patient)?;
    let bundle = run_blocking(&state, move |portal| portal.medical_history(&caller, &patient)).await?;
    Ok(Json(bundle))
}
