//! # API REST
//!
//! REST API implementation for Carelith.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, caller headers)
//!
//! Uses `api-shared` for DTOs and authentication and `carelith-core` for the portal itself.

#![warn(rust_2018_idioms)]

mod caller;
mod error;
pub mod handlers;

pub use caller::AuthenticatedCaller;
pub use error::ApiError;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use carelith_core::PortalService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Application state for the REST API server
#[derive(Clone)]
pub struct AppState {
    pub portal: PortalService,
    /// Key every caller must present in `x-api-key`.
    pub api_key: Arc<str>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::request_access,
        handlers::verify_otp,
        handlers::check_access,
        handlers::list_grants,
        handlers::active_grant,
        handlers::document_bundle,
        handlers::records,
        handlers::upload_document,
        handlers::fhir_patient,
        handlers::fhir_encounters,
        handlers::fhir_observations,
        handlers::medical_history,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::RequestAccessReq,
        api_shared::RequestAccessRes,
        api_shared::VerifyOtpReq,
        api_shared::VerifyOtpRes,
        api_shared::CheckAccessRes,
        api_shared::GrantRes,
        api_shared::ListGrantsRes,
        api_shared::RecordSummaryRes,
        api_shared::RecordsRes,
        api_shared::UploadRes,
    ))
)]
pub struct ApiDoc;

/// Build the application router.
///
/// Stored downloads are served under the configured media URL when it is a local path.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/access/requests", post(handlers::request_access))
        .route("/access/grants/:grant_id/verify", post(handlers::verify_otp))
        .route("/access/check/:patient_id", get(handlers::check_access))
        .route("/patients/:patient_id/grants", get(handlers::list_grants))
        .route(
            "/patients/:patient_id/grants/:grant_id",
            get(handlers::active_grant),
        )
        .route(
            "/fhir/DocumentReference/:patient_id",
            get(handlers::document_bundle)
                .post(handlers::upload_document)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/records/:patient_id", get(handlers::records))
        .route("/fhir/Patient/:patient_id", get(handlers::fhir_patient))
        .route("/fhir/Encounter", get(handlers::fhir_encounters))
        .route("/fhir/Observation", get(handlers::fhir_observations))
        .route(
            "/fhir/medical-history/:patient_id",
            get(handlers::medical_history),
        );

    let config = state.portal.config();
    let media_path = config.media_url().trim_end_matches('/');
    if media_path.starts_with('/') && media_path.len() > 1 {
        app = app.nest_service(media_path, ServeDir::new(config.media_root()));
    }

    app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use carelith_core::delivery::OutboxChannel;
    use carelith_core::records::{JsonRecordStore, RecordSet};
    use carelith_core::{CoreConfig, ManualClock};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    struct Harness {
        temp: TempDir,
        outbox: Arc<OutboxChannel>,
        clock: Arc<ManualClock>,
        app: Router,
    }

    fn records() -> RecordSet {
        serde_json::from_value(json!({
            "hospitals": [{"id": "h1", "name": "City Hospital"}],
            "doctors": [
                {"id": "d1", "username": "alice", "first_name": "Alice", "last_name": "Smith",
                 "hospital": "h1"},
                {"id": "d2", "username": "bob", "first_name": "Bob", "last_name": "Jones",
                 "hospital": "h1"}
            ],
            "patients": [
                {"id": "p1", "username": "asha.rao", "first_name": "Asha", "last_name": "Rao",
                 "email": "asha@example.com"},
                {"id": "p2", "username": "no.contact"}
            ]
        }))
        .unwrap()
    }

    fn harness() -> Harness {
        let temp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::new(temp.path().to_path_buf(), "/media/".into()).unwrap());
        let store = Arc::new(
            JsonRecordStore::create(&temp.path().join("records.json"), records()).unwrap(),
        );
        let outbox = Arc::new(OutboxChannel::new());
        let clock = Arc::new(ManualClock::new("2026-01-11T10:00:00Z".parse().unwrap()));
        let portal = PortalService::from_parts(cfg, store, outbox.clone(), clock.clone()).unwrap();
        let app = router(AppState {
            portal,
            api_key: Arc::from(KEY),
        });
        Harness {
            temp,
            outbox,
            clock,
            app,
        }
    }

    fn request(method: &str, uri: &str, caller: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", KEY)
            .header("x-caller", caller)
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn send_json(app: &Router, method: &str, uri: &str, caller: &str, body: Value) -> (StatusCode, Value) {
        send(app, request(method, uri, caller, Body::from(body.to_string()))).await
    }

    async fn get(app: &Router, uri: &str, caller: &str) -> (StatusCode, Value) {
        send(app, request("GET", uri, caller, Body::empty())).await
    }

    /// Request and verify access for `doctor` to `p1`.
    async fn grant_access(h: &Harness, doctor: &str) -> String {
        let (status, issued) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            doctor,
            json!({"patient_id": "p1"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{issued}");
        let grant_id = issued["grant_id"].as_str().unwrap().to_string();

        let code = h.outbox.last_code().unwrap();
        let (status, verified) = send_json(
            &h.app,
            "POST",
            &format!("/access/grants/{grant_id}/verify"),
            doctor,
            json!({"code": code}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["outcome"], "authorized");
        grant_id
    }

    #[tokio::test]
    async fn health_is_open() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_wrong_api_key_is_unauthorized() {
        let h = harness();
        let no_key = Request::get("/access/check/p1")
            .header("x-caller", "doctor:d1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, no_key).await.0, StatusCode::UNAUTHORIZED);

        let wrong_key = Request::get("/access/check/p1")
            .header("x-api-key", "nope")
            .header("x-caller", "doctor:d1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, wrong_key).await.0, StatusCode::UNAUTHORIZED);

        let (status, body) = get(&h.app, "/access/check/p1", "nurse:n1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn access_flow_over_http() {
        let h = harness();
        let (status, issued) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            "doctor:d1",
            json!({"patient_id": "p1"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["delivered_via"], "email");
        assert!(issued.get("code").is_none());
        let grant_id = issued["grant_id"].as_str().unwrap().to_string();
        let code = h.outbox.last_code().unwrap();
        let verify_uri = format!("/access/grants/{grant_id}/verify");

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let (status, body) =
            send_json(&h.app, "POST", &verify_uri, "doctor:d1", json!({"code": wrong})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "invalid_code");
        assert_eq!(body["authorized"], false);

        let (_, body) = get(&h.app, "/access/check/p1", "doctor:d1").await;
        assert_eq!(body["authorized"], false);

        let (_, body) =
            send_json(&h.app, "POST", &verify_uri, "doctor:d1", json!({"code": code})).await;
        assert_eq!(body["outcome"], "authorized");

        let (_, body) = get(&h.app, "/access/check/p1", "doctor:d1").await;
        assert_eq!(body["authorized"], true);

        h.clock.advance(chrono::Duration::minutes(11));
        let (_, body) = get(&h.app, "/access/check/p1", "doctor:d1").await;
        assert_eq!(body["authorized"], false);
    }

    #[tokio::test]
    async fn expired_code_is_reported_distinctly() {
        let h = harness();
        let (_, issued) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            "doctor:d1",
            json!({"patient_id": "p1"}),
        )
        .await;
        let grant_id = issued["grant_id"].as_str().unwrap();
        let code = h.outbox.last_code().unwrap();

        h.clock.advance(chrono::Duration::minutes(11));
        let (status, body) = send_json(
            &h.app,
            "POST",
            &format!("/access/grants/{grant_id}/verify"),
            "doctor:d1",
            json!({"code": code}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "expired");
        assert!(body["message"].as_str().unwrap().contains("expired"));
    }

    #[tokio::test]
    async fn request_errors_map_to_statuses() {
        let h = harness();
        let (status, _) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            "doctor:d1",
            json!({"patient_id": "p2"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            "doctor:d1",
            json!({"patient_id": "p9"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "patient p9 not found");

        let (status, _) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            "patient:p1",
            json!({"patient_id": "p1"}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        h.outbox.set_failing(true);
        let (status, _) = send_json(
            &h.app,
            "POST",
            "/access/requests",
            "doctor:d1",
            json!({"patient_id": "p1"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = send_json(
            &h.app,
            "POST",
            "/access/grants/not-a-grant/verify",
            "doctor:d1",
            json!({"code": "123456"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_then_list_documents_and_records() {
        let h = harness();
        let (status, _) = get(&h.app, "/fhir/DocumentReference/p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        grant_access(&h, "d1").await;
        let (status, body) = send(
            &h.app,
            request(
                "POST",
                "/fhir/DocumentReference/p1?file_name=scan.pdf",
                "doctor:d1",
                Body::from(b"%PDF-1.4 scan".to_vec()),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["success"], true);

        let (status, bundle) = get(&h.app, "/fhir/DocumentReference/p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(bundle["total"], 1);
        let resource = &bundle["entry"][0]["resource"];
        assert_eq!(
            resource["description"],
            "Report uploaded by Dr. Alice Smith (City Hospital)"
        );
        let url = resource["content"][0]["attachment"]["url"]
            .as_str()
            .unwrap()
            .to_string();

        let download = h
            .app
            .clone()
            .oneshot(Request::get(url.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        let bytes = download.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"%PDF-1.4 scan");

        let (status, records) = get(&h.app, "/records/p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records["fetch_failed"], false);
        assert_eq!(records["mine"].as_array().unwrap().len(), 1);
        assert_eq!(records["mine"][0]["author_name"], "Alice Smith");
        assert_eq!(records["mine"][0]["file_url"], url.as_str());

        let (_, own) = get(&h.app, "/records/p1", "patient:p1").await;
        assert_eq!(own["mine"].as_array().unwrap().len(), 0);
        assert_eq!(own["others"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn local_store_failure_is_an_internal_error_without_paths() {
        let h = harness();
        grant_access(&h, "d1").await;
        // An index path that is a directory makes every local upload fail.
        std::fs::create_dir_all(h.temp.path().join("fhir_local/index.json")).unwrap();

        let (status, body) = send(
            &h.app,
            request(
                "POST",
                "/fhir/DocumentReference/p1?file_name=scan.pdf",
                "doctor:d1",
                Body::from(b"%PDF-1.4 scan".to_vec()),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{body}");
        assert_eq!(body["success"], false);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("try again"));
        assert!(!message.contains(h.temp.path().to_str().unwrap()));
    }

    #[tokio::test]
    async fn upload_requires_file_name_and_body() {
        let h = harness();
        grant_access(&h, "d1").await;

        let (status, _) = send(
            &h.app,
            request(
                "POST",
                "/fhir/DocumentReference/p1?file_name=scan.pdf",
                "doctor:d1",
                Body::empty(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &h.app,
            request(
                "POST",
                "/fhir/DocumentReference/p1",
                "doctor:d1",
                Body::from("x"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patient_grant_endpoints() {
        let h = harness();
        let grant_id = grant_access(&h, "d1").await;

        let (status, body) = get(&h.app, "/patients/p1/grants", "patient:p1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["grants"][0]["grant_id"], grant_id.as_str());
        assert_eq!(body["grants"][0]["state"], "authorized");
        assert_eq!(body["grants"][0]["origin_org"], "h1");

        let uri = format!("/patients/p1/grants/{grant_id}");
        let (status, body) = get(&h.app, &uri, "patient:p1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["doctor_id"], "d1");

        let (status, _) = get(&h.app, &uri, "doctor:d1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        h.clock.advance(chrono::Duration::minutes(11));
        let (status, _) = get(&h.app, &uri, "patient:p1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn clinical_endpoints_are_gated() {
        let h = harness();
        let (status, _) = get(&h.app, "/fhir/Patient/p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, patient) = get(&h.app, "/fhir/Patient/p1", "patient:p1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patient["resourceType"], "Patient");

        grant_access(&h, "d1").await;
        let (status, encounters) = get(&h.app, "/fhir/Encounter?patient=p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(encounters["total"], 0);

        let (status, _) = get(&h.app, "/fhir/Observation?patient=p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::OK);

        let (status, history) = get(&h.app, "/fhir/medical-history/p1", "doctor:d1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["patient"]["reference"], "Patient/p1");

        let (status, _) = get(&h.app, "/fhir/Patient/p9", "patient:p1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
