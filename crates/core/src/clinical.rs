//! Projection of medical records into FHIR clinical resources.
//!
//! Resources are addressed by the portal's own patient id, not the document-system subject id.

use crate::records::{Encounter, Gender, Observation, Patient};
use fhir::{AdministrativeGender, EncounterData, ObservationData, PatientData};

const ENCOUNTER_FINISHED: &str = "finished";
const ENCOUNTER_IN_PROGRESS: &str = "in-progress";
const OBSERVATION_FINAL: &str = "final";

pub fn patient_resource(patient: &Patient) -> PatientData {
    PatientData {
        id: Some(patient.id.to_string()),
        identifier: Some(patient.username.to_string()),
        name: Some(patient.display_name()),
        gender: Some(match patient.gender {
            Gender::Male => AdministrativeGender::Male,
            Gender::Female => AdministrativeGender::Female,
            Gender::Other => AdministrativeGender::Other,
            Gender::Unknown => AdministrativeGender::Unknown,
        }),
        birth_date: patient.date_of_birth,
        phone: patient.phone.as_ref().map(|p| p.as_str().to_string()),
    }
}

pub fn encounter_resource(encounter: &Encounter) -> EncounterData {
    let status = if encounter.ended_at.is_some() {
        ENCOUNTER_FINISHED
    } else {
        ENCOUNTER_IN_PROGRESS
    };
    EncounterData {
        id: encounter.id.to_string(),
        subject_id: encounter.patient.to_string(),
        status: status.into(),
        start: Some(encounter.started_at),
        end: encounter.ended_at,
        reason: encounter.reason.clone(),
    }
}

/// Observations carry no patient of their own; `subject_id` comes from the encounter's patient.
pub fn observation_resource(observation: &Observation, subject_id: &str) -> ObservationData {
    ObservationData {
        id: observation.id.to_string(),
        subject_id: subject_id.to_string(),
        encounter_id: observation.encounter.to_string(),
        status: OBSERVATION_FINAL.into(),
        code: observation.code.clone(),
        value: observation.value.clone(),
        unit: observation.unit.clone(),
        effective: Some(observation.recorded_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures;
    use crate::records::{EncounterId, ObservationId, PatientId};
    use carelith_types::PhoneNumber;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn patient_resource_carries_demographics() {
        let mut patient = fixtures::patient("p1", "asha.rao");
        patient.first_name = Some("Asha".into());
        patient.last_name = Some("Rao".into());
        patient.gender = Gender::Female;
        patient.date_of_birth = NaiveDate::from_ymd_opt(1990, 2, 3);
        patient.phone = Some(PhoneNumber::parse("+91 98000 00001").unwrap());

        let data = patient_resource(&patient);
        assert_eq!(data.id.as_deref(), Some("p1"));
        assert_eq!(data.identifier.as_deref(), Some("asha.rao"));
        assert_eq!(data.name.as_deref(), Some("Asha Rao"));
        assert_eq!(data.gender, Some(AdministrativeGender::Female));
        assert_eq!(data.birth_date, NaiveDate::from_ymd_opt(1990, 2, 3));
        assert_eq!(data.phone.as_deref(), Some("+919800000001"));
    }

    #[test]
    fn encounter_status_follows_end_time() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut encounter = Encounter {
            id: EncounterId::new("e1"),
            patient: PatientId::new("p1"),
            doctor: None,
            hospital: None,
            reason: "fever".into(),
            started_at: start,
            ended_at: None,
        };
        assert_eq!(encounter_resource(&encounter).status, "in-progress");

        encounter.ended_at = Some(start + chrono::Duration::hours(1));
        let data = encounter_resource(&encounter);
        assert_eq!(data.status, "finished");
        assert_eq!(data.subject_id, "p1");
        assert_eq!(data.reason, "fever");
    }

    #[test]
    fn observation_is_final_and_linked_to_encounter() {
        let observation = Observation {
            id: ObservationId::new("o1"),
            encounter: EncounterId::new("e1"),
            doctor: None,
            code: "Body temperature".into(),
            value: "98.6".into(),
            unit: Some("F".into()),
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        };
        let data = observation_resource(&observation, "p1");
        assert_eq!(data.status, "final");
        assert_eq!(data.encounter_id, "e1");
        assert_eq!(data.subject_id, "p1");
        assert_eq!(data.unit.as_deref(), Some("F"));
    }
}
