//! FHIR server backend.
//!
//! Every call carries a bounded timeout (uploads a longer one). Transport errors, non-2xx
//! statuses and malformed bodies are caught here, logged with the subject id and converted to
//! [`BridgeError`] or a failed [`UploadOutcome`].

use super::{BridgeError, BridgeResult, DocumentBridge, DocumentSet, NewDocument, UploadOutcome};
use crate::config::DocumentBackend;
use crate::{PortalError, PortalResult};
use base64::Engine as _;
use carelith_files::content_type_for;
use fhir::{
    AttachmentData, AttachmentSource, Bundle, DocumentReference, DocumentReferenceData, Patient,
    PatientData,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use std::time::Duration;

const FHIR_JSON: &str = "application/fhir+json";

pub struct RemoteBridge {
    base_url: Url,
    client: Client,
    upload_client: Client,
}

impl RemoteBridge {
    /// Must be called outside an async runtime (blocking clients own one internally).
    pub fn new(base_url: &Url, timeout: Duration, upload_timeout: Duration) -> PortalResult<Self> {
        let build = |t: Duration| {
            Client::builder()
                .connect_timeout(t)
                .timeout(t)
                .build()
                .map_err(|e| {
                    PortalError::BridgeUnavailable(format!("failed to build HTTP client: {e}"))
                })
        };

        // `Url::join` replaces the last segment unless the base ends with '/'.
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            client: build(timeout)?,
            upload_client: build(upload_timeout)?,
        })
    }

    fn endpoint(&self, path: &str) -> BridgeResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::Unavailable(format!("invalid resource path '{path}': {e}")))
    }

    fn expect_success(response: Response) -> BridgeResult<String> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| BridgeError::Unavailable(format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            return Err(BridgeError::Unavailable(format!(
                "server answered {status}: {}",
                truncate(&body)
            )));
        }
        Ok(body)
    }
}

fn truncate(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

fn transport(e: reqwest::Error) -> BridgeError {
    BridgeError::Unavailable(e.to_string())
}

impl DocumentBridge for RemoteBridge {
    fn backend(&self) -> DocumentBackend {
        DocumentBackend::Remote
    }

    fn create_subject(&self, local_id: &str, display_name: &str) -> BridgeResult<String> {
        let payload = Patient::render(&PatientData::subject(None, local_id, display_name))?;

        let response = self
            .client
            .post(self.endpoint("Patient")?)
            .header(CONTENT_TYPE, FHIR_JSON)
            .header(ACCEPT, FHIR_JSON)
            .body(payload)
            .send()
            .map_err(|e| {
                tracing::error!(patient = local_id, "create subject request failed: {}", e);
                transport(e)
            })?;

        let body = Self::expect_success(response)?;
        let created = Patient::parse(&body)?;
        created.id.ok_or_else(|| {
            BridgeError::Unavailable("server created a Patient without returning its id".into())
        })
    }

    fn subject_exists(&self, external_id: &str) -> bool {
        let url = match self.endpoint(&format!("Patient/{external_id}")) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(subject = external_id, "{}", e);
                return false;
            }
        };
        match self.client.get(url).header(ACCEPT, FHIR_JSON).send() {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::warn!(subject = external_id, "subject lookup failed: {}", e);
                false
            }
        }
    }

    fn list_documents(&self, external_id: &str) -> BridgeResult<DocumentSet> {
        let result = self
            .endpoint("DocumentReference")
            .and_then(|url| {
                self.client
                    .get(url)
                    .query(&[("subject", format!("Patient/{external_id}"))])
                    .header(ACCEPT, FHIR_JSON)
                    .send()
                    .map_err(transport)
            })
            .and_then(Self::expect_success)
            .and_then(|body| Ok(Bundle::parse_documents(&body)?));

        match result {
            Ok(documents) => Ok(DocumentSet::loaded(documents)),
            Err(e) => {
                tracing::error!(subject = external_id, "document listing failed: {}", e);
                Err(e)
            }
        }
    }

    fn upload_document(&self, external_id: &str, document: NewDocument) -> UploadOutcome {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&document.bytes);
        let data = DocumentReferenceData {
            description: Some(document.description.clone()),
            authors: vec![document.author_display()],
            attachment: Some(AttachmentData {
                content_type: Some(content_type_for(&document.file_name).to_string()),
                title: Some(document.file_name.clone()),
                source: Some(AttachmentSource::Inline(encoded)),
            }),
            ..DocumentReferenceData::medical_report(external_id)
        };

        let payload = match DocumentReference::render(&data) {
            Ok(payload) => payload,
            Err(e) => return UploadOutcome::failed(e.to_string()),
        };
        let url = match self.endpoint("DocumentReference") {
            Ok(url) => url,
            Err(e) => return UploadOutcome::failed(e.to_string()),
        };

        let sent = self
            .upload_client
            .post(url)
            .header(CONTENT_TYPE, FHIR_JSON)
            .header(ACCEPT, FHIR_JSON)
            .body(payload)
            .send();

        match sent {
            Ok(response) => {
                let status = response.status().as_u16();
                let message = response.text().unwrap_or_default();
                if !matches!(status, 200 | 201) {
                    tracing::error!(subject = external_id, status, "remote document upload rejected");
                }
                UploadOutcome { status, message }
            }
            Err(e) => {
                tracing::error!(subject = external_id, "remote document upload failed: {}", e);
                UploadOutcome::failed(e.to_string())
            }
        }
    }
}
