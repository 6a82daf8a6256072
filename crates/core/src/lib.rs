//! # Carelith Core
//!
//! Core business logic for the Carelith patient portal.
//!
//! This crate contains:
//! - OTP consent grants: issuing, delivery, verification and the access gate
//! - The document bridge to a FHIR document service (remote or a local filesystem store)
//! - Attribution of documents to the requesting clinician
//! - FHIR projections of the medical record
//!
//! **No API concerns**: authentication, HTTP servers and request DTOs belong in `api-rest` or
//! `api-shared`.

pub mod access;
pub mod attribution;
pub mod bridge;
pub mod clinical;
pub mod clock;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod portal;
pub mod records;

mod storage;

pub use access::{AccessGrant, GrantState, GrantView, IssuedGrant, VerifyOutcome};
pub use attribution::{Clinician, RecordSummaries, RecordSummary};
pub use bridge::{DocumentBridge, UploadOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    delivery_from_env_values, document_backend_from_env_value, grant_ttl_from_env_value,
    http_timeout_from_env_value, CoreConfig, DeliveryConfig, DocumentBackend,
};
pub use error::{PortalError, PortalResult};
pub use portal::{Caller, DocumentBundle, PatientRecords, PortalService, UploadRequest};
pub use records::{DoctorId, HospitalId, PatientId};

pub use carelith_types::NonEmptyText;
pub use carelith_uuid::GrantId;
