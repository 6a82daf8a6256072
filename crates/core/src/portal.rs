//! Portal service: every externally visible operation, with caller checks.
//!
//! Callers are resolved by the identity provider before they reach this layer. Doctors act on
//! a patient's record only through a live grant; patients act on their own record and grants.

use crate::access::{
    AccessGate, AccessRequest, GrantStore, GrantView, IssuedGrant, OtpIssuer, VerifyOutcome,
};
use crate::attribution::{summarise, Clinician, RecordSummaries};
use crate::bridge::{build_bridge, ensure_subject, DocumentBridge, NewDocument, UploadOutcome};
use crate::clinical::{encounter_resource, observation_resource, patient_resource};
use crate::clock::{Clock, SystemClock};
use crate::config::{CoreConfig, DeliveryConfig};
use crate::delivery::{ConsoleChannel, DeliveryChannel, SmsGatewayChannel};
use crate::records::{
    Doctor, DoctorId, HospitalId, JsonRecordStore, Patient, PatientId, RecordStore,
};
use crate::{PortalError, PortalResult};
use carelith_files::DownloadsService;
use carelith_uuid::GrantId;
use fhir::{Bundle, DocumentReferenceData};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const UNKNOWN_HOSPITAL: &str = "Unknown Hospital";

/// The authenticated party behind a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    Doctor(DoctorId),
    Patient(PatientId),
}

impl Caller {
    fn doctor(&self) -> PortalResult<&DoctorId> {
        match self {
            Caller::Doctor(id) => Ok(id),
            Caller::Patient(_) => Err(PortalError::Unauthorized(
                "this action is available to doctors only".into(),
            )),
        }
    }

    fn require_patient(&self, patient: &PatientId) -> PortalResult<()> {
        match self {
            Caller::Patient(id) if id == patient => Ok(()),
            _ => Err(PortalError::Unauthorized(
                "patients may only view their own access grants".into(),
            )),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Doctor(id) => write!(f, "doctor:{id}"),
            Caller::Patient(id) => write!(f, "patient:{id}"),
        }
    }
}

/// A patient's documents as a `searchset` bundle.
///
/// `fetch_error` is set when the document service could not be read; the bundle is then empty
/// and must not be taken to mean "no documents".
#[derive(Clone, Debug, Serialize)]
pub struct DocumentBundle {
    pub bundle: serde_json::Value,
    pub fetch_error: Option<String>,
}

/// Display summaries of a patient's documents, split by attribution to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct PatientRecords {
    pub patient_id: PatientId,
    pub patient_name: String,
    #[serde(flatten)]
    pub summaries: RecordSummaries,
    pub fetch_failed: bool,
    pub message: Option<String>,
}

/// A file a doctor attaches to a patient's record.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Defaults to `Report uploaded by Dr. <name> (<hospital>)`.
    pub description: Option<String>,
}

/// Documents listed from the bridge, or the reason they could not be.
enum Listing {
    Documents(Vec<DocumentReferenceData>),
    Failed(String),
}

#[derive(Clone)]
pub struct PortalService {
    cfg: Arc<CoreConfig>,
    records: Arc<dyn RecordStore>,
    bridge: Arc<dyn DocumentBridge>,
    downloads: DownloadsService,
    grants: Arc<GrantStore>,
    issuer: Arc<OtpIssuer>,
    gate: Arc<AccessGate>,
    clock: Arc<dyn Clock>,
}

impl PortalService {
    /// Wire the service from configuration: JSON record store, configured delivery channel and
    /// the system clock.
    ///
    /// Builds blocking HTTP clients when the remote backend or SMS delivery is configured, so it
    /// must be called outside an async runtime.
    pub fn open(cfg: Arc<CoreConfig>) -> PortalResult<Self> {
        let records: Arc<dyn RecordStore> = Arc::new(JsonRecordStore::open(cfg.records_file())?);
        let channel: Arc<dyn DeliveryChannel> = match cfg.delivery() {
            DeliveryConfig::Console => Arc::new(ConsoleChannel),
            DeliveryConfig::Sms { url, api_key } => Arc::new(
                SmsGatewayChannel::new(url.clone(), api_key.clone(), cfg.http_timeout())
                    .map_err(|e| PortalError::InvalidInput(e.to_string()))?,
            ),
        };
        Self::from_parts(cfg, records, channel, Arc::new(SystemClock))
    }

    /// Wire the service around the given collaborators.
    pub fn from_parts(
        cfg: Arc<CoreConfig>,
        records: Arc<dyn RecordStore>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> PortalResult<Self> {
        let media_root = cfg.media_root();
        std::fs::create_dir_all(&media_root)?;
        let downloads = DownloadsService::new(&media_root, cfg.media_url())?;

        let grants = Arc::new(GrantStore::open(&cfg.grants_file())?);
        let bridge = build_bridge(&cfg, downloads.clone(), clock.clone())?;
        let issuer = OtpIssuer::new(
            records.clone(),
            grants.clone(),
            channel,
            clock.clone(),
            cfg.grant_ttl(),
        );
        let gate = AccessGate::new(grants.clone(), clock.clone());

        tracing::info!(
            backend = %cfg.backend(),
            data_dir = %cfg.data_dir().display(),
            "portal service ready"
        );

        Ok(Self {
            cfg,
            records,
            bridge,
            downloads,
            grants,
            issuer: Arc::new(issuer),
            gate: Arc::new(gate),
            clock,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    // ------------------------------------------------------------------------
    // Access grants
    // ------------------------------------------------------------------------

    /// Issue a fresh code for the calling doctor and `patient`, replacing any earlier grant.
    pub fn request_access(
        &self,
        caller: &Caller,
        patient: &PatientId,
        destination_org: Option<HospitalId>,
    ) -> PortalResult<IssuedGrant> {
        let doctor = caller.doctor()?;
        self.issuer.request_access(AccessRequest {
            doctor: doctor.clone(),
            patient: patient.clone(),
            destination_org,
        })
    }

    /// Submit the code the patient shared. Only the doctor the grant was issued to may submit;
    /// for anyone else the grant does not exist.
    pub fn verify_otp(
        &self,
        caller: &Caller,
        grant_id: &GrantId,
        code: &str,
    ) -> PortalResult<VerifyOutcome> {
        let doctor = caller.doctor()?;
        let owned = self
            .grants
            .get(grant_id)?
            .is_some_and(|grant| &grant.doctor == doctor);
        if !owned {
            return Err(PortalError::NotFound(format!("access grant {grant_id}")));
        }
        self.gate.verify_code(grant_id, code)
    }

    pub fn check_access(&self, caller: &Caller, patient: &PatientId) -> PortalResult<bool> {
        let doctor = caller.doctor()?;
        Ok(self.gate.check_authorized(doctor, patient))
    }

    /// The calling patient's grants, newest first, without codes.
    pub fn patient_grants(&self, caller: &Caller, patient: &PatientId) -> PortalResult<Vec<GrantView>> {
        caller.require_patient(patient)?;
        let now = self.clock.now();
        Ok(self
            .grants
            .for_patient(patient)?
            .iter()
            .map(|grant| grant.view(now))
            .collect())
    }

    /// One of the calling patient's grants, only while it is authorised.
    pub fn active_grant(
        &self,
        caller: &Caller,
        patient: &PatientId,
        grant_id: &GrantId,
    ) -> PortalResult<GrantView> {
        caller.require_patient(patient)?;
        let grant = self.gate.active_grant(patient, grant_id)?;
        Ok(grant.view(self.clock.now()))
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    /// The patient's documents as a `searchset` bundle.
    pub fn document_bundle(&self, caller: &Caller, patient: &PatientId) -> PortalResult<DocumentBundle> {
        let patient = self.authorize_read(caller, patient)?;
        let (documents, fetch_error) = match self.list_documents(&patient) {
            Listing::Documents(documents) => (documents, None),
            Listing::Failed(message) => (Vec::new(), Some(message)),
        };
        Ok(DocumentBundle {
            bundle: Bundle::documents(&documents)?,
            fetch_error,
        })
    }

    /// Display summaries of the patient's documents. For a doctor, documents attributed to them
    /// are in `mine`; a patient viewing their own record sees everything in `others`.
    pub fn record_summaries(&self, caller: &Caller, patient: &PatientId) -> PortalResult<PatientRecords> {
        let patient = self.authorize_read(caller, patient)?;
        let clinician = match caller {
            Caller::Doctor(id) => {
                let doctor = self.doctor(id)?;
                Some(Clinician::new(doctor.username.as_str(), doctor.full_name()))
            }
            Caller::Patient(_) => None,
        };

        let (summaries, fetch_failed, message) = match self.list_documents(&patient) {
            Listing::Documents(documents) => {
                let summaries = summarise(documents, clinician.as_ref(), &self.downloads);
                let message = summaries
                    .all
                    .is_empty()
                    .then(|| "No records found for this patient".to_string());
                (summaries, false, message)
            }
            Listing::Failed(reason) => (
                RecordSummaries::default(),
                true,
                Some(format!("Could not load records from the document service: {reason}")),
            ),
        };

        Ok(PatientRecords {
            patient_name: patient.display_name(),
            patient_id: patient.id,
            summaries,
            fetch_failed,
            message,
        })
    }

    /// Attach a file to the patient's record on behalf of the calling doctor.
    ///
    /// The patient's document subject is created first if needed and stays assigned even when
    /// the upload itself then fails. Upload failures are reported in the returned outcome.
    pub fn upload_document(
        &self,
        caller: &Caller,
        patient: &PatientId,
        upload: UploadRequest,
    ) -> PortalResult<UploadOutcome> {
        let doctor_id = caller.doctor()?;
        let patient = self.patient(patient)?;
        self.gate.require_authorized(doctor_id, &patient.id)?;

        if upload.file_name.trim().is_empty() {
            return Err(PortalError::InvalidInput("file name is required".into()));
        }
        if upload.bytes.is_empty() {
            return Err(PortalError::InvalidInput("uploaded file is empty".into()));
        }

        let doctor = self.doctor(doctor_id)?;
        let description = match upload.description.filter(|d| !d.trim().is_empty()) {
            Some(description) => description,
            None => {
                let hospital = self
                    .records
                    .hospital(&doctor.hospital)?
                    .map(|h| h.name.to_string())
                    .unwrap_or_else(|| UNKNOWN_HOSPITAL.to_string());
                format!("Report uploaded by Dr. {} ({hospital})", doctor.full_name())
            }
        };

        let external_id = ensure_subject(self.bridge.as_ref(), self.records.as_ref(), &patient)?;
        let outcome = self.bridge.upload_document(
            &external_id,
            NewDocument {
                file_name: upload.file_name,
                bytes: upload.bytes,
                description,
                author: Some(format!("Dr. {}", doctor.full_name())),
            },
        );

        if outcome.is_success() {
            tracing::info!(
                patient = %patient.id,
                doctor = %doctor.id,
                status = outcome.status,
                "document uploaded"
            );
        } else {
            tracing::warn!(
                patient = %patient.id,
                doctor = %doctor.id,
                status = outcome.status,
                "document upload failed: {}",
                outcome.message
            );
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // FHIR clinical resources
    // ------------------------------------------------------------------------

    pub fn fhir_patient(&self, caller: &Caller, patient: &PatientId) -> PortalResult<serde_json::Value> {
        let patient = self.authorize_read(caller, patient)?;
        Ok(fhir::Patient::to_value(&patient_resource(&patient))?)
    }

    pub fn encounter_bundle(&self, caller: &Caller, patient: &PatientId) -> PortalResult<serde_json::Value> {
        let patient = self.authorize_read(caller, patient)?;
        let encounters: Vec<_> = self
            .records
            .encounters_for(&patient.id)?
            .iter()
            .map(encounter_resource)
            .collect();
        Ok(Bundle::encounters(&encounters)?)
    }

    pub fn observation_bundle(&self, caller: &Caller, patient: &PatientId) -> PortalResult<serde_json::Value> {
        let patient = self.authorize_read(caller, patient)?;
        let observations: Vec<_> = self
            .records
            .observations_for(&patient.id)?
            .iter()
            .map(|o| observation_resource(o, patient.id.as_str()))
            .collect();
        Ok(Bundle::observations(&observations)?)
    }

    /// Encounters followed by observations, tagged with the patient.
    pub fn medical_history(&self, caller: &Caller, patient: &PatientId) -> PortalResult<serde_json::Value> {
        let patient = self.authorize_read(caller, patient)?;
        let encounters: Vec<_> = self
            .records
            .encounters_for(&patient.id)?
            .iter()
            .map(encounter_resource)
            .collect();
        let observations: Vec<_> = self
            .records
            .observations_for(&patient.id)?
            .iter()
            .map(|o| observation_resource(o, patient.id.as_str()))
            .collect();
        Ok(Bundle::medical_history(
            patient.id.as_str(),
            &patient.display_name(),
            &encounters,
            &observations,
        )?)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn patient(&self, id: &PatientId) -> PortalResult<Patient> {
        self.records
            .patient(id)?
            .ok_or_else(|| PortalError::NotFound(format!("patient {id}")))
    }

    fn doctor(&self, id: &DoctorId) -> PortalResult<Doctor> {
        self.records
            .doctor(id)?
            .ok_or_else(|| PortalError::NotFound(format!("doctor {id}")))
    }

    /// The patient's record, if the caller is that patient or a doctor with a live grant.
    fn authorize_read(&self, caller: &Caller, patient: &PatientId) -> PortalResult<Patient> {
        let patient = self.patient(patient)?;
        match caller {
            Caller::Patient(id) if id == &patient.id => {}
            Caller::Patient(_) => {
                return Err(PortalError::Unauthorized(
                    "patients may only view their own records".into(),
                ))
            }
            Caller::Doctor(doctor) => {
                self.gate.require_authorized(doctor, &patient.id)?;
            }
        }
        Ok(patient)
    }

    /// A patient with no document subject yet has no documents.
    fn list_documents(&self, patient: &Patient) -> Listing {
        let Some(external_id) = &patient.fhir_patient_id else {
            return Listing::Documents(Vec::new());
        };
        match self.bridge.list_documents(external_id) {
            Ok(set) => Listing::Documents(set.to_vec()),
            Err(e) => {
                tracing::error!(
                    patient = %patient.id,
                    subject = external_id.as_str(),
                    backend = %self.bridge.backend(),
                    "document listing failed: {}",
                    e
                );
                Listing::Failed(PortalError::from(e).to_string())
            }
        }
    }
}
