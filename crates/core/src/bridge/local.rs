//! Filesystem-backed document store.
//!
//! Layout under the store root:
//!
//! ```text
//! fhir_local/
//! ├── patients/<subject>.json        # minimal Patient resource
//! ├── documents/<subject>_<ts>.json  # one DocumentReference per upload
//! └── index.json                     # { "<subject>": ["<doc id>", ...] }
//! ```
//!
//! An upload writes its document file first and then replaces the index; the index write is
//! the commit point. Listing only follows the index, so a document whose index update failed is
//! never visible (its file and the stored download are removed). Uploads hold an exclusive lock
//! on the index for the whole cycle, across processes sharing the store.

use super::{BridgeError, BridgeResult, DocumentBridge, DocumentSet, NewDocument, UploadOutcome};
use crate::clock::Clock;
use crate::config::DocumentBackend;
use crate::constants::{LOCAL_DOCUMENTS_DIR_NAME, LOCAL_INDEX_FILENAME, LOCAL_PATIENTS_DIR_NAME};
use crate::storage::{ensure_file_component, read_json, write_atomic, write_json_atomic, FileLock};
use crate::PortalResult;
use carelith_files::{DownloadsService, FileMetadata};
use carelith_uuid::{TimestampId, TimestampIdGenerator};
use fhir::{AttachmentData, AttachmentSource, DocumentReference, DocumentReferenceData, Patient, PatientData};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type ResourceIndex = BTreeMap<String, Vec<String>>;

pub struct LocalBridge {
    patients_dir: PathBuf,
    documents_dir: PathBuf,
    index_path: PathBuf,
    downloads: DownloadsService,
    clock: Arc<dyn Clock>,
}

impl LocalBridge {
    pub fn new(root: PathBuf, downloads: DownloadsService, clock: Arc<dyn Clock>) -> PortalResult<Self> {
        let patients_dir = root.join(LOCAL_PATIENTS_DIR_NAME);
        let documents_dir = root.join(LOCAL_DOCUMENTS_DIR_NAME);
        fs::create_dir_all(&patients_dir)?;
        fs::create_dir_all(&documents_dir)?;

        Ok(Self {
            patients_dir,
            documents_dir,
            index_path: root.join(LOCAL_INDEX_FILENAME),
            downloads,
            clock,
        })
    }

    fn patient_path(&self, external_id: &str) -> PathBuf {
        self.patients_dir.join(format!("{external_id}.json"))
    }

    fn document_path(&self, document_id: &str) -> PathBuf {
        self.documents_dir.join(format!("{document_id}.json"))
    }

    fn load_index(&self) -> BridgeResult<ResourceIndex> {
        read_json::<ResourceIndex>(&self.index_path)
            .map(Option::unwrap_or_default)
            .map_err(|e| BridgeError::Storage(e.to_string()))
    }

    /// Next document id for `external_id`, strictly after the last one indexed.
    fn next_document_id(&self, external_id: &str, existing: &[String]) -> String {
        let previous = existing
            .last()
            .and_then(|last| last.strip_prefix(&format!("{external_id}_")))
            .and_then(|ts| ts.parse::<TimestampId>().ok());
        let ts = TimestampIdGenerator::generate(previous.as_ref(), self.clock.now());
        format!("{external_id}_{ts}")
    }

    fn store_document(&self, external_id: &str, document: NewDocument) -> BridgeResult<()> {
        ensure_file_component(external_id).map_err(|e| BridgeError::Storage(e.to_string()))?;

        let _lock =
            FileLock::acquire(&self.index_path).map_err(|e| BridgeError::Storage(e.to_string()))?;

        let stored = self
            .downloads
            .store(&document.file_name, &document.bytes)
            .map_err(|e| BridgeError::Storage(e.to_string()))?;

        match self.index_document(external_id, &document, &stored) {
            Ok(document_id) => {
                tracing::info!(
                    subject = external_id,
                    document_id = document_id.as_str(),
                    url = stored.url.as_str(),
                    "document stored locally"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(discard) = self.downloads.discard(&stored) {
                    tracing::warn!(
                        "failed to remove unindexed download {}: {}",
                        stored.relative_path.as_str(),
                        discard
                    );
                }
                Err(e)
            }
        }
    }

    /// Write the document resource and commit it to the index. Caller holds the index lock.
    fn index_document(
        &self,
        external_id: &str,
        document: &NewDocument,
        stored: &FileMetadata,
    ) -> BridgeResult<String> {
        let mut index = self.load_index()?;
        let existing = index.get(external_id).map(Vec::as_slice).unwrap_or_default();
        let document_id = self.next_document_id(external_id, existing);

        let data = DocumentReferenceData {
            id: Some(document_id.clone()),
            description: Some(document.description.clone()),
            authors: vec![document.author_display()],
            attachment: Some(AttachmentData {
                content_type: Some(stored.content_type.to_string()),
                title: Some(stored.file_name.to_string()),
                source: Some(AttachmentSource::Url(stored.url.to_string())),
            }),
            ..DocumentReferenceData::medical_report(external_id)
        };
        let rendered = DocumentReference::render(&data)?;

        let document_path = self.document_path(&document_id);
        write_atomic(&document_path, rendered.as_bytes())
            .map_err(|e| BridgeError::Storage(e.to_string()))?;

        index
            .entry(external_id.to_string())
            .or_default()
            .push(document_id.clone());
        if let Err(e) = write_json_atomic(&self.index_path, &index) {
            remove_orphan(&document_path);
            return Err(BridgeError::Storage(e.to_string()));
        }
        Ok(document_id)
    }
}

fn remove_orphan(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("failed to remove unindexed document {}: {}", path.display(), e);
    }
}

impl DocumentBridge for LocalBridge {
    fn backend(&self) -> DocumentBackend {
        DocumentBackend::Local
    }

    /// The local id doubles as the external id.
    fn create_subject(&self, local_id: &str, display_name: &str) -> BridgeResult<String> {
        ensure_file_component(local_id).map_err(|e| BridgeError::Storage(e.to_string()))?;

        let data = PatientData::subject(Some(local_id.to_string()), local_id, display_name);
        let rendered = Patient::render(&data)?;
        write_atomic(&self.patient_path(local_id), rendered.as_bytes())
            .map_err(|e| BridgeError::Storage(e.to_string()))?;
        Ok(local_id.to_string())
    }

    fn subject_exists(&self, external_id: &str) -> bool {
        ensure_file_component(external_id).is_ok() && self.patient_path(external_id).is_file()
    }

    fn list_documents(&self, external_id: &str) -> BridgeResult<DocumentSet> {
        let mut index = self.load_index()?;
        let ids = index.remove(external_id).unwrap_or_default();
        Ok(DocumentSet::local(self.documents_dir.clone(), ids))
    }

    fn upload_document(&self, external_id: &str, document: NewDocument) -> UploadOutcome {
        match self.store_document(external_id, document) {
            Ok(()) => UploadOutcome {
                status: 201,
                message: "Stored locally".into(),
            },
            Err(e) => {
                tracing::error!(subject = external_id, "local document upload failed: {}", e);
                UploadOutcome::failed(e.to_string())
            }
        }
    }
}
