//! FHIR `Encounter` and `Observation` rendering.
//!
//! These resources are read-only projections of the portal's medical records; the portal never
//! parses them back, so only the render direction exists.

use crate::{patient_reference, FhirResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Domain-level carrier for an encounter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncounterData {
    pub id: String,
    pub subject_id: String,
    /// `finished` once an end time is recorded, else `in-progress`.
    pub status: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub reason: String,
}

/// Domain-level carrier for an observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationData {
    pub id: String,
    pub subject_id: String,
    pub encounter_id: String,
    pub status: String,
    pub code: String,
    pub value: String,
    pub unit: Option<String>,
    pub effective: Option<DateTime<Utc>>,
}

pub struct Encounter;

impl Encounter {
    pub fn to_value(data: &EncounterData) -> FhirResult<serde_json::Value> {
        let wire = EncounterWire {
            resource_type: "Encounter",
            id: &data.id,
            status: &data.status,
            subject: ReferenceWire {
                reference: patient_reference(&data.subject_id),
            },
            period: PeriodWire {
                start: data.start,
                end: data.end,
            },
            reason_code: vec![TextWire { text: &data.reason }],
        };
        Ok(serde_json::to_value(wire)?)
    }
}

pub struct Observation;

impl Observation {
    /// `valueString` carries the value followed by its unit, e.g. `98.6F`.
    pub fn to_value(data: &ObservationData) -> FhirResult<serde_json::Value> {
        let value_string = match &data.unit {
            Some(unit) => format!("{}{}", data.value, unit),
            None => data.value.clone(),
        };
        let wire = ObservationWire {
            resource_type: "Observation",
            id: &data.id,
            status: &data.status,
            subject: ReferenceWire {
                reference: patient_reference(&data.subject_id),
            },
            encounter: ReferenceWire {
                reference: format!("Encounter/{}", data.encounter_id),
            },
            code: TextWire { text: &data.code },
            value_string,
            effective_date_time: data.effective,
        };
        Ok(serde_json::to_value(wire)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncounterWire<'a> {
    resource_type: &'static str,
    id: &'a str,
    status: &'a str,
    subject: ReferenceWire,
    period: PeriodWire,
    reason_code: Vec<TextWire<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ObservationWire<'a> {
    resource_type: &'static str,
    id: &'a str,
    status: &'a str,
    subject: ReferenceWire,
    encounter: ReferenceWire,
    code: TextWire<'a>,
    value_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    effective_date_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ReferenceWire {
    reference: String,
}

#[derive(Serialize)]
struct PeriodWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct TextWire<'a> {
    text: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encounter_renders_period_and_reason() {
        let start = "2026-01-11T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let data = EncounterData {
            id: "3".into(),
            subject_id: "42".into(),
            status: "in-progress".into(),
            start: Some(start),
            end: None,
            reason: "Chest pain".into(),
        };
        let value = Encounter::to_value(&data).unwrap();
        assert_eq!(value["resourceType"], "Encounter");
        assert_eq!(value["subject"]["reference"], "Patient/42");
        assert_eq!(value["period"]["start"], "2026-01-11T09:00:00Z");
        assert!(value["period"].get("end").is_none());
        assert_eq!(value["reasonCode"][0]["text"], "Chest pain");
    }

    #[test]
    fn observation_value_string_includes_unit() {
        let data = ObservationData {
            id: "9".into(),
            subject_id: "42".into(),
            encounter_id: "3".into(),
            status: "final".into(),
            code: "Temperature".into(),
            value: "98.6".into(),
            unit: Some("F".into()),
            effective: None,
        };
        let value = Observation::to_value(&data).unwrap();
        assert_eq!(value["valueString"], "98.6F");
        assert_eq!(value["code"]["text"], "Temperature");
        assert_eq!(value["encounter"]["reference"], "Encounter/3");
        assert!(value.get("effectiveDateTime").is_none());
    }
}
