//! Document bridge: the portal's view of a FHIR document service.
//!
//! [`DocumentBridge`] has two implementations with identical external behaviour:
//! - [`LocalBridge`]: JSON files under `<data_dir>/fhir_local`, attachments served from the
//!   download area
//! - [`RemoteBridge`]: a FHIR server over HTTP, attachments sent inline as base64
//!
//! One of them is chosen at startup from [`CoreConfig::backend`] by [`build_bridge`].
//!
//! Listing reports failures as [`BridgeError`] so "no documents" and "fetch failed" stay
//! distinguishable. Uploads never return an error: failures become a non-2xx
//! [`UploadOutcome`].

mod local;
mod remote;

pub use local::LocalBridge;
pub use remote::RemoteBridge;

use crate::clock::Clock;
use crate::config::{CoreConfig, DocumentBackend};
use crate::records::{Patient, RecordStore};
use crate::{PortalError, PortalResult};
use carelith_files::DownloadsService;
use fhir::{DocumentReference, DocumentReferenceData};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The remote service could not be reached or answered with a non-2xx status.
    #[error("document service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with a body that is not the expected FHIR resource.
    #[error("malformed response from document service: {0}")]
    Malformed(#[from] fhir::FhirError),
    /// Local filesystem read or write failed.
    #[error("document storage failure: {0}")]
    Storage(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<BridgeError> for PortalError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Storage(msg) => PortalError::StorageFailure(msg),
            BridgeError::Unavailable(msg) => PortalError::BridgeUnavailable(msg),
            BridgeError::Malformed(e) => {
                PortalError::BridgeUnavailable(format!("malformed response: {e}"))
            }
        }
    }
}

/// A file to attach to a subject.
#[derive(Clone, Debug)]
pub struct NewDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub description: String,
    /// Author display; the description is used when absent.
    pub author: Option<String>,
}

impl NewDocument {
    pub(crate) fn author_display(&self) -> String {
        self.author
            .clone()
            .unwrap_or_else(|| self.description.clone())
    }
}

/// Status/message pair reported by an upload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct UploadOutcome {
    pub status: u16,
    pub message: String,
}

impl UploadOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

/// A finite, restartable sequence of a subject's documents.
///
/// Local sets read each document file only when iterated; every call to [`Self::iter`] starts
/// over from the first document.
#[derive(Clone, Debug)]
pub struct DocumentSet {
    source: DocumentSource,
}

#[derive(Clone, Debug)]
enum DocumentSource {
    Loaded(Vec<DocumentReferenceData>),
    Local {
        documents_dir: PathBuf,
        ids: Vec<String>,
    },
}

impl DocumentSet {
    pub fn empty() -> Self {
        Self::loaded(Vec::new())
    }

    pub(crate) fn loaded(documents: Vec<DocumentReferenceData>) -> Self {
        Self {
            source: DocumentSource::Loaded(documents),
        }
    }

    pub(crate) fn local(documents_dir: PathBuf, ids: Vec<String>) -> Self {
        Self {
            source: DocumentSource::Local { documents_dir, ids },
        }
    }

    /// Number of entries the set refers to (local documents missing on disk included).
    pub fn len_hint(&self) -> usize {
        match &self.source {
            DocumentSource::Loaded(docs) => docs.len(),
            DocumentSource::Local { ids, .. } => ids.len(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = DocumentReferenceData> + '_> {
        match &self.source {
            DocumentSource::Loaded(docs) => Box::new(docs.iter().cloned()),
            DocumentSource::Local { documents_dir, ids } => Box::new(
                ids.iter()
                    .filter_map(move |id| read_local_document(documents_dir, id)),
            ),
        }
    }

    pub fn to_vec(&self) -> Vec<DocumentReferenceData> {
        self.iter().collect()
    }
}

fn read_local_document(documents_dir: &std::path::Path, id: &str) -> Option<DocumentReferenceData> {
    let path = documents_dir.join(format!("{id}.json"));
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(document_id = id, "indexed document unreadable: {}", e);
            return None;
        }
    };
    match DocumentReference::parse(&text) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(document_id = id, "indexed document is not valid FHIR: {}", e);
            None
        }
    }
}

pub trait DocumentBridge: Send + Sync {
    fn backend(&self) -> DocumentBackend;

    /// Create a subject resource and return its external id.
    fn create_subject(&self, local_id: &str, display_name: &str) -> BridgeResult<String>;

    /// Failures are logged and reported as `false`.
    fn subject_exists(&self, external_id: &str) -> bool;

    /// Documents of `external_id` in index order; an unknown subject is an empty set.
    fn list_documents(&self, external_id: &str) -> BridgeResult<DocumentSet>;

    fn upload_document(&self, external_id: &str, document: NewDocument) -> UploadOutcome;
}

/// Return the patient's external id, creating the subject and persisting its id on the patient
/// record when none is assigned or the assigned one no longer resolves.
pub fn ensure_subject(
    bridge: &dyn DocumentBridge,
    records: &dyn RecordStore,
    patient: &Patient,
) -> PortalResult<String> {
    if let Some(existing) = &patient.fhir_patient_id {
        if bridge.subject_exists(existing) {
            return Ok(existing.clone());
        }
        tracing::warn!(
            patient = %patient.id,
            external_id = existing.as_str(),
            "assigned document subject no longer resolves; creating a new one"
        );
    }

    let external_id = bridge.create_subject(patient.id.as_str(), &patient.display_name())?;
    records.set_fhir_patient_id(&patient.id, &external_id)?;
    tracing::info!(
        patient = %patient.id,
        external_id = external_id.as_str(),
        backend = %bridge.backend(),
        "document subject assigned"
    );
    Ok(external_id)
}

/// Build the bridge selected by `config`.
///
/// The remote bridge owns blocking HTTP clients and must be built outside an async runtime.
pub fn build_bridge(
    config: &CoreConfig,
    downloads: DownloadsService,
    clock: Arc<dyn Clock>,
) -> PortalResult<Arc<dyn DocumentBridge>> {
    match config.backend() {
        DocumentBackend::Local => Ok(Arc::new(LocalBridge::new(
            config.local_fhir_dir(),
            downloads,
            clock,
        )?)),
        DocumentBackend::Remote => {
            let base_url = config.fhir_base_url().ok_or_else(|| {
                PortalError::InvalidInput("remote backend requires a FHIR base URL".into())
            })?;
            Ok(Arc::new(RemoteBridge::new(
                base_url,
                config.http_timeout(),
                config.upload_timeout(),
            )?))
        }
    }
}
