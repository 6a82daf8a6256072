//! Issuing one-time access codes.

use super::grant::{AccessGrant, OtpCode};
use super::store::GrantStore;
use crate::clock::Clock;
use crate::delivery::{dispatch_code, Contact, ContactKind, DeliveryChannel};
use crate::records::{DoctorId, HospitalId, Patient, PatientId, RecordStore};
use crate::{PortalError, PortalResult};
use carelith_uuid::GrantId;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// A doctor's request to see a patient's record.
#[derive(Clone, Debug)]
pub struct AccessRequest {
    pub doctor: DoctorId,
    pub patient: PatientId,
    /// Organisation the record is being shared with; origin is the doctor's hospital.
    pub destination_org: Option<HospitalId>,
}

/// Result of a successful [`OtpIssuer::request_access`].
#[derive(Clone, Debug)]
pub struct IssuedGrant {
    pub grant_id: GrantId,
    pub code: OtpCode,
    pub expires_at: DateTime<Utc>,
    pub delivered_via: ContactKind,
    /// Earlier grants for the same pair that this one replaced.
    pub superseded: Vec<GrantId>,
}

pub struct OtpIssuer {
    records: Arc<dyn RecordStore>,
    grants: Arc<GrantStore>,
    channel: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl OtpIssuer {
    pub fn new(
        records: Arc<dyn RecordStore>,
        grants: Arc<GrantStore>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            records,
            grants,
            channel,
            clock,
            ttl,
        }
    }

    /// Create a fresh pending grant for the pair and send its code to the patient.
    ///
    /// Any existing grant for the same (doctor, patient) pair is deleted first, so its code stops
    /// working immediately. If delivery fails the new grant is kept (a repeated request
    /// supersedes it) and `DeliveryFailed` is returned.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the doctor, patient or destination organisation does not exist
    /// - `ContactMissing` if the patient has no address the channel can reach
    /// - `DeliveryFailed` if the channel reports an error
    /// - `StorageFailure` if the grant cannot be persisted
    pub fn request_access(&self, request: AccessRequest) -> PortalResult<IssuedGrant> {
        let doctor = self
            .records
            .doctor(&request.doctor)?
            .ok_or_else(|| PortalError::NotFound(format!("doctor {}", request.doctor)))?;
        let patient = self
            .records
            .patient(&request.patient)?
            .ok_or_else(|| PortalError::NotFound(format!("patient {}", request.patient)))?;
        if let Some(destination) = &request.destination_org {
            self.records
                .hospital(destination)?
                .ok_or_else(|| PortalError::NotFound(format!("hospital {destination}")))?;
        }

        let contact = self.resolve_contact(&patient)?;

        let now = self.clock.now();
        let grant = AccessGrant {
            id: GrantId::new(),
            doctor: doctor.id.clone(),
            patient: patient.id.clone(),
            origin_org: Some(doctor.hospital.clone()),
            destination_org: request.destination_org,
            code: OtpCode::generate(&mut rand::thread_rng()),
            verified: false,
            created_at: now,
            expires_at: now + self.ttl,
        };
        let issued = IssuedGrant {
            grant_id: grant.id.clone(),
            code: grant.code.clone(),
            expires_at: grant.expires_at,
            delivered_via: contact.kind(),
            superseded: Vec::new(),
        };

        let superseded = self.grants.supersede(grant)?;
        tracing::info!(
            grant_id = %issued.grant_id,
            doctor = %doctor.id,
            patient = %patient.id,
            superseded = superseded.len(),
            "access grant issued"
        );

        if let Err(e) = dispatch_code(
            self.channel.as_ref(),
            &contact,
            issued.code.as_str(),
            &doctor.full_name(),
            self.ttl.num_minutes(),
        ) {
            tracing::error!(
                grant_id = %issued.grant_id,
                patient = %patient.id,
                channel = self.channel.name(),
                "access code delivery failed: {}",
                e
            );
            return Err(PortalError::DeliveryFailed(e.to_string()));
        }

        Ok(IssuedGrant {
            superseded,
            ..issued
        })
    }

    /// E-mail when on file and deliverable, else phone.
    fn resolve_contact(&self, patient: &Patient) -> PortalResult<Contact> {
        if let Some(email) = &patient.email {
            if self.channel.supports(ContactKind::Email) {
                return Ok(Contact::Email(email.clone()));
            }
        }
        if let Some(phone) = &patient.phone {
            if self.channel.supports(ContactKind::Sms) {
                return Ok(Contact::Sms(phone.clone()));
            }
        }
        Err(PortalError::ContactMissing(patient.id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::OutboxChannel;
    use crate::records::fixtures::record_set;
    use crate::records::JsonRecordStore;
    use carelith_types::EmailAddress;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        grants: Arc<GrantStore>,
        outbox: Arc<OutboxChannel>,
        clock: Arc<ManualClock>,
        issuer: OtpIssuer,
    }

    fn harness_with(records: crate::records::RecordSet) -> Harness {
        let temp = TempDir::new().unwrap();
        let records: Arc<dyn RecordStore> =
            Arc::new(JsonRecordStore::create(&temp.path().join("records.json"), records).unwrap());
        let grants = Arc::new(GrantStore::open(&temp.path().join("grants.json")).unwrap());
        let outbox = Arc::new(OutboxChannel::new());
        let clock = Arc::new(ManualClock::new("2026-01-11T10:00:00Z".parse().unwrap()));
        let issuer = OtpIssuer::new(
            records,
            grants.clone(),
            outbox.clone(),
            clock.clone(),
            Duration::minutes(10),
        );
        Harness {
            _temp: temp,
            grants,
            outbox,
            clock,
            issuer,
        }
    }

    fn request(doctor: &str, patient: &str) -> AccessRequest {
        AccessRequest {
            doctor: DoctorId::new(doctor),
            patient: PatientId::new(patient),
            destination_org: None,
        }
    }

    #[test]
    fn issues_pending_grant_and_sends_code() {
        let h = harness_with(record_set());
        let issued = h.issuer.request_access(request("d1", "p1")).unwrap();

        assert_eq!(issued.delivered_via, ContactKind::Sms);
        assert_eq!(issued.expires_at, h.clock.now() + Duration::minutes(10));
        assert_eq!(h.outbox.last_code().as_deref(), Some(issued.code.as_str()));

        let stored = h.grants.get(&issued.grant_id).unwrap().unwrap();
        assert!(!stored.verified);
        assert_eq!(stored.origin_org, Some(HospitalId::new("h1")));
    }

    #[test]
    fn second_request_supersedes_first() {
        let h = harness_with(record_set());
        let first = h.issuer.request_access(request("d1", "p1")).unwrap();
        let second = h.issuer.request_access(request("d1", "p1")).unwrap();

        assert_eq!(second.superseded, vec![first.grant_id.clone()]);
        assert!(h.grants.get(&first.grant_id).unwrap().is_none());
        assert_eq!(h.grants.for_patient(&PatientId::new("p1")).unwrap().len(), 1);
    }

    #[test]
    fn unknown_parties_are_not_found() {
        let h = harness_with(record_set());
        assert!(matches!(
            h.issuer.request_access(request("nobody", "p1")),
            Err(PortalError::NotFound(_))
        ));
        assert!(matches!(
            h.issuer.request_access(request("d1", "nobody")),
            Err(PortalError::NotFound(_))
        ));
        let mut with_destination = request("d1", "p1");
        with_destination.destination_org = Some(HospitalId::new("nowhere"));
        assert!(matches!(
            h.issuer.request_access(with_destination),
            Err(PortalError::NotFound(_))
        ));
        assert!(h.outbox.sent().is_empty());
    }

    #[test]
    fn patient_without_contact_is_contact_missing() {
        let h = harness_with(record_set());
        let err = h.issuer.request_access(request("d1", "p2")).unwrap_err();
        assert!(matches!(err, PortalError::ContactMissing(ref id) if id == "p2"));
        assert!(h.grants.for_patient(&PatientId::new("p2")).unwrap().is_empty());
    }

    #[test]
    fn email_is_preferred_over_phone() {
        let mut records = record_set();
        records.patients[0].email = Some(EmailAddress::parse("asha@example.org").unwrap());
        let h = harness_with(records);

        let issued = h.issuer.request_access(request("d1", "p1")).unwrap();
        assert_eq!(issued.delivered_via, ContactKind::Email);
        assert_eq!(h.outbox.sent()[0].to, "asha@example.org");
    }

    #[test]
    fn delivery_failure_is_reported_and_grant_kept() {
        let h = harness_with(record_set());
        h.outbox.set_failing(true);

        let err = h.issuer.request_access(request("d1", "p1")).unwrap_err();
        assert!(matches!(err, PortalError::DeliveryFailed(_)));
        assert_eq!(h.grants.for_patient(&PatientId::new("p1")).unwrap().len(), 1);

        h.outbox.set_failing(false);
        let retry = h.issuer.request_access(request("d1", "p1")).unwrap();
        assert_eq!(retry.superseded.len(), 1);
        assert_eq!(h.grants.for_patient(&PatientId::new("p1")).unwrap().len(), 1);
    }
}
