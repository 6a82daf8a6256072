//! FHIR-aligned patient wire models and translation helpers.
//!
//! Two shapes of `Patient` resource pass through the portal:
//! - the minimal *subject* resource the document bridge creates (identifier + name text)
//! - the demographic resource served to API callers (name, gender, birth date, telecom)
//!
//! Both are carried by [`PatientData`]; absent fields are simply omitted on render.

use crate::{expect_resource_type, parse_with_path, FhirResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const RESOURCE_TYPE: &str = "Patient";

// ============================================================================
// Public domain-level types
// ============================================================================

/// FHIR administrative gender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdministrativeGender {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

/// Domain-level carrier for patient data (flat structure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    /// Resource id; absent when creating on a remote server.
    pub id: Option<String>,
    /// First identifier value.
    pub identifier: Option<String>,
    /// Display text of the official name.
    pub name: Option<String>,
    pub gender: Option<AdministrativeGender>,
    pub birth_date: Option<NaiveDate>,
    /// Phone number from `telecom`.
    pub phone: Option<String>,
}

impl PatientData {
    /// The minimal subject resource used to address documents.
    pub fn subject(id: Option<String>, identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            identifier: Some(identifier.into()),
            name: Some(name.into()),
            gender: None,
            birth_date: None,
            phone: None,
        }
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl Patient {
    /// Parse a patient resource from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if the JSON does not match the wire schema or the
    /// resourceType is not `Patient`.
    pub fn parse(json_text: &str) -> FhirResult<PatientData> {
        let wire: PatientWire = parse_with_path(json_text, RESOURCE_TYPE)?;
        expect_resource_type(&wire.resource_type, RESOURCE_TYPE)?;

        let phone = wire
            .telecom
            .into_iter()
            .find(|t| t.system.as_deref() == Some("phone"))
            .and_then(|t| t.value);

        Ok(PatientData {
            id: wire.id,
            identifier: wire.identifier.into_iter().find_map(|i| i.value),
            name: wire.name.into_iter().find_map(|n| n.text),
            gender: wire.gender,
            birth_date: wire.birth_date,
            phone,
        })
    }

    /// Render a patient resource as pretty-printed JSON text.
    pub fn render(data: &PatientData) -> FhirResult<String> {
        Ok(serde_json::to_string_pretty(&domain_to_wire(data))?)
    }

    /// Render a patient resource as a JSON value.
    pub fn to_value(data: &PatientData) -> FhirResult<serde_json::Value> {
        Ok(serde_json::to_value(domain_to_wire(data))?)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientWire {
    resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    gender: Option<AdministrativeGender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    birth_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPointWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentifierWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HumanNameWire {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContactPointWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

fn domain_to_wire(data: &PatientData) -> PatientWire {
    PatientWire {
        resource_type: RESOURCE_TYPE.into(),
        id: data.id.clone(),
        identifier: data
            .identifier
            .iter()
            .map(|v| IdentifierWire {
                value: Some(v.clone()),
            })
            .collect(),
        name: data
            .name
            .iter()
            .map(|text| HumanNameWire {
                use_type: Some("official".into()),
                text: Some(text.clone()),
            })
            .collect(),
        gender: data.gender,
        birth_date: data.birth_date,
        telecom: data
            .phone
            .iter()
            .map(|p| ContactPointWire {
                system: Some("phone".into()),
                value: Some(p.clone()),
            })
            .collect(),
    }
}
