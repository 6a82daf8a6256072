//! Medical-record store.
//!
//! The portal reads identity and contact fields of patients, doctors and hospitals from here,
//! plus the encounters and observations it renders as FHIR resources. The only write is
//! [`RecordStore::set_fhir_patient_id`], which persists the document-system identifier assigned
//! to a patient on first upload.
//!
//! Every record declares its optional fields with serde defaults, so snapshots written by older
//! tooling still load.

use crate::storage::{modify_json, read_json, write_json_atomic};
use crate::{PortalError, PortalResult};
use carelith_types::{EmailAddress, NonEmptyText, PhoneNumber};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = PortalError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(PortalError::InvalidInput(concat!($label, " id cannot be empty").into()));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

record_id!(PatientId, "patient");
record_id!(DoctorId, "doctor");
record_id!(HospitalId, "hospital");
record_id!(EncounterId, "encounter");
record_id!(ObservationId, "observation");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub username: NonEmptyText,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub email: Option<EmailAddress>,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    /// Identifier in the document system; assigned lazily on first upload.
    #[serde(default)]
    pub fhir_patient_id: Option<String>,
}

impl Patient {
    /// Full name when both parts are recorded, else the account name.
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, &self.last_name).unwrap_or_else(|| self.username.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub username: NonEmptyText,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub hospital: HospitalId,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub contact_number: Option<PhoneNumber>,
    /// Comma-separated, e.g. `MBBS, MD`.
    #[serde(default)]
    pub qualification: String,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name).unwrap_or_else(|| self.username.to_string())
    }

    pub fn qualifications(&self) -> Vec<&str> {
        self.qualification
            .split(',')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .collect()
    }
}

fn full_name(first: &Option<String>, last: &Option<String>) -> Option<String> {
    let joined = [first.as_deref(), last.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

fn unknown() -> String {
    "Unknown".into()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: HospitalId,
    pub name: NonEmptyText,
    #[serde(default = "unknown")]
    pub city: String,
    #[serde(default = "unknown")]
    pub state: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub patient: PatientId,
    #[serde(default)]
    pub doctor: Option<DoctorId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    pub reason: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// An observation belongs to a patient through its encounter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub encounter: EncounterId,
    #[serde(default)]
    pub doctor: Option<DoctorId>,
    pub code: String,
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot of every record the portal reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub doctors: Vec<Doctor>,
    #[serde(default)]
    pub hospitals: Vec<Hospital>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

/// Read access to the medical-record store plus the one write-back the bridge needs.
pub trait RecordStore: Send + Sync {
    fn patient(&self, id: &PatientId) -> PortalResult<Option<Patient>>;
    fn doctor(&self, id: &DoctorId) -> PortalResult<Option<Doctor>>;
    fn hospital(&self, id: &HospitalId) -> PortalResult<Option<Hospital>>;
    /// Encounters of `patient`, in store order.
    fn encounters_for(&self, patient: &PatientId) -> PortalResult<Vec<Encounter>>;
    /// Observations recorded during any encounter of `patient`, in store order.
    fn observations_for(&self, patient: &PatientId) -> PortalResult<Vec<Observation>>;
    fn set_fhir_patient_id(&self, patient: &PatientId, external_id: &str) -> PortalResult<()>;
}

/// [`RecordStore`] over a single JSON snapshot file.
///
/// The file is read on every call and written back under its lock, so external edits and
/// write-backs from other processes are seen immediately.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    /// Open the snapshot at `path`; a missing file is an empty store.
    ///
    /// An existing snapshot is validated here so a malformed file fails at startup.
    pub fn open(path: &Path) -> PortalResult<Self> {
        if read_json::<RecordSet>(path)?.is_none() {
            tracing::warn!("record snapshot {} not found; starting empty", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Write `records` to `path` and open it.
    pub fn create(path: &Path, records: RecordSet) -> PortalResult<Self> {
        write_json_atomic(path, &records)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read<R>(&self, f: impl FnOnce(&RecordSet) -> R) -> PortalResult<R> {
        let records = read_json::<RecordSet>(&self.path)?.unwrap_or_default();
        Ok(f(&records))
    }
}

impl RecordStore for JsonRecordStore {
    fn patient(&self, id: &PatientId) -> PortalResult<Option<Patient>> {
        self.read(|r| r.patients.iter().find(|p| &p.id == id).cloned())
    }

    fn doctor(&self, id: &DoctorId) -> PortalResult<Option<Doctor>> {
        self.read(|r| r.doctors.iter().find(|d| &d.id == id).cloned())
    }

    fn hospital(&self, id: &HospitalId) -> PortalResult<Option<Hospital>> {
        self.read(|r| r.hospitals.iter().find(|h| &h.id == id).cloned())
    }

    fn encounters_for(&self, patient: &PatientId) -> PortalResult<Vec<Encounter>> {
        self.read(|r| {
            r.encounters
                .iter()
                .filter(|e| &e.patient == patient)
                .cloned()
                .collect()
        })
    }

    fn observations_for(&self, patient: &PatientId) -> PortalResult<Vec<Observation>> {
        self.read(|r| {
            r.observations
                .iter()
                .filter(|o| {
                    r.encounters
                        .iter()
                        .any(|e| e.id == o.encounter && &e.patient == patient)
                })
                .cloned()
                .collect()
        })
    }

    fn set_fhir_patient_id(&self, patient: &PatientId, external_id: &str) -> PortalResult<()> {
        modify_json(&self.path, |records: &mut RecordSet| {
            let record = records
                .patients
                .iter_mut()
                .find(|p| &p.id == patient)
                .ok_or_else(|| PortalError::NotFound(format!("patient {patient}")))?;
            record.fhir_patient_id = Some(external_id.to_string());
            Ok((true, ()))
        })
    }
}
