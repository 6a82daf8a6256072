//! FHIR `Bundle` (type `searchset`) helpers.
//!
//! The portal renders three kinds of searchset: document references, clinical resources
//! (encounters/observations) and the combined medical history. Remote document services
//! return searchsets that are parsed back into [`DocumentReferenceData`].

use crate::{
    clinical::{Encounter, EncounterData, Observation, ObservationData},
    document_reference::{DocumentReference, DocumentReferenceData},
    expect_resource_type, parse_with_path, patient_reference, FhirResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const RESOURCE_TYPE: &str = "Bundle";
const SEARCHSET: &str = "searchset";

/// Bundle operations.
pub struct Bundle;

impl Bundle {
    /// Render document references as a `searchset` bundle.
    pub fn documents(documents: &[DocumentReferenceData]) -> FhirResult<Value> {
        let resources = documents
            .iter()
            .map(DocumentReference::to_value)
            .collect::<FhirResult<Vec<_>>>()?;
        Ok(serde_json::to_value(BundleWire::searchset(resources, None))?)
    }

    pub fn encounters(encounters: &[EncounterData]) -> FhirResult<Value> {
        let resources = encounters
            .iter()
            .map(Encounter::to_value)
            .collect::<FhirResult<Vec<_>>>()?;
        Ok(serde_json::to_value(BundleWire::searchset(resources, None))?)
    }

    pub fn observations(observations: &[ObservationData]) -> FhirResult<Value> {
        let resources = observations
            .iter()
            .map(Observation::to_value)
            .collect::<FhirResult<Vec<_>>>()?;
        Ok(serde_json::to_value(BundleWire::searchset(resources, None))?)
    }

    /// Encounters followed by observations, tagged with the patient they belong to.
    pub fn medical_history(
        subject_id: &str,
        patient_display: &str,
        encounters: &[EncounterData],
        observations: &[ObservationData],
    ) -> FhirResult<Value> {
        let mut resources = encounters
            .iter()
            .map(Encounter::to_value)
            .collect::<FhirResult<Vec<_>>>()?;
        for observation in observations {
            resources.push(Observation::to_value(observation)?);
        }
        let patient = PatientRefWire {
            reference: patient_reference(subject_id),
            display: patient_display.to_string(),
        };
        Ok(serde_json::to_value(BundleWire::searchset(
            resources,
            Some(patient),
        ))?)
    }

    /// Parse the document references out of a `searchset` bundle.
    ///
    /// Entries of other resource types (for example an `OperationOutcome` in search mode
    /// `outcome`) are skipped; a malformed `DocumentReference` entry is an error.
    pub fn parse_documents(json_text: &str) -> FhirResult<Vec<DocumentReferenceData>> {
        let wire: BundleInWire = parse_with_path(json_text, RESOURCE_TYPE)?;
        expect_resource_type(&wire.resource_type, RESOURCE_TYPE)?;

        wire.entry
            .into_iter()
            .filter_map(|entry| entry.resource)
            .filter(|resource| {
                resource.get("resourceType").and_then(Value::as_str) == Some("DocumentReference")
            })
            .map(DocumentReference::from_value)
            .collect()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleWire {
    resource_type: &'static str,
    #[serde(rename = "type")]
    type_: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    patient: Option<PatientRefWire>,
    total: usize,
    entry: Vec<EntryOutWire>,
}

impl BundleWire {
    fn searchset(resources: Vec<Value>, patient: Option<PatientRefWire>) -> Self {
        Self {
            resource_type: RESOURCE_TYPE,
            type_: SEARCHSET,
            patient,
            total: resources.len(),
            entry: resources
                .into_iter()
                .map(|resource| EntryOutWire { resource })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct PatientRefWire {
    reference: String,
    display: String,
}

#[derive(Serialize)]
struct EntryOutWire {
    resource: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleInWire {
    resource_type: String,
    #[serde(default)]
    entry: Vec<EntryInWire>,
}

#[derive(Deserialize)]
struct EntryInWire {
    #[serde(default)]
    resource: Option<Value>,
}
