//! FHIR wire/boundary support for the Carelith portal.
//!
//! This crate provides **wire models** and **format/translation helpers** for the FHIR-like
//! JSON resources the portal exchanges with a document service (remote or the local
//! filesystem substitute) and exposes to API callers:
//! - `DocumentReference` resources and `searchset` bundles of them
//! - `Patient` resources used as document subjects
//! - `Encounter` / `Observation` resources and the medical-history bundle
//!
//! This crate focuses on:
//! - serialisation/deserialisation of FHIR JSON
//! - translation between domain-level carriers and wire structs
//!
//! Input parsing is lenient: FHIR servers add fields (`meta`, `text`, extensions)
//! the portal does not use, so unknown keys are ignored rather than rejected.

pub mod bundle;
pub mod clinical;
pub mod document_reference;
pub mod patient;

// Re-export facades
pub use bundle::Bundle;
pub use clinical::{Encounter, Observation};
pub use document_reference::DocumentReference;
pub use patient::Patient;

// Re-export public domain-level types
pub use clinical::{EncounterData, ObservationData};
pub use document_reference::{AttachmentData, AttachmentSource, DocumentReferenceData};
pub use patient::{AdministrativeGender, PatientData};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialises `text` into `T`, reporting the failing field path on mismatch.
pub(crate) fn parse_with_path<'de, T>(text: &'de str, resource: &str) -> FhirResult<T>
where
    T: serde::Deserialize<'de>,
{
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        FhirError::Translation(format!("{resource} schema mismatch at {path}: {source}"))
    })
}

/// Checks a wire `resourceType` against the expected value.
pub(crate) fn expect_resource_type(actual: &str, expected: &str) -> FhirResult<()> {
    if actual != expected {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{expected}', got '{actual}'"
        )));
    }
    Ok(())
}

/// Builds a `Patient/<id>` reference string.
pub fn patient_reference(subject_id: &str) -> String {
    format!("Patient/{subject_id}")
}

/// Extracts the id from a `Patient/<id>` reference.
pub fn subject_id_from_reference(reference: &str) -> FhirResult<String> {
    match reference.strip_prefix("Patient/") {
        Some(id) if !id.trim().is_empty() => Ok(id.to_string()),
        _ => Err(FhirError::Translation(format!(
            "subject reference must have the form 'Patient/<id>', got '{reference}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_reference_roundtrip() {
        assert_eq!(patient_reference("42"), "Patient/42");
        assert_eq!(subject_id_from_reference("Patient/42").unwrap(), "42");
    }

    #[test]
    fn subject_reference_rejects_other_resource_types() {
        assert!(subject_id_from_reference("Practitioner/7").is_err());
        assert!(subject_id_from_reference("Patient/").is_err());
        assert!(subject_id_from_reference("42").is_err());
    }
}
