//! The access gate: code verification and the authorisation check every protected
//! operation consults.

use super::grant::AccessGrant;
use super::store::GrantStore;
use crate::clock::Clock;
use crate::records::{DoctorId, PatientId};
use crate::{PortalError, PortalResult};
use carelith_uuid::GrantId;
use serde::Serialize;
use std::sync::Arc;

/// Result of submitting a code. `InvalidCode` and `Expired` are expected outcomes, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    Authorized,
    InvalidCode,
    Expired,
}

impl VerifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyOutcome::Authorized => "authorized",
            VerifyOutcome::InvalidCode => "invalid_code",
            VerifyOutcome::Expired => "expired",
        }
    }

    /// What to tell the person who submitted the code.
    pub fn message(&self) -> &'static str {
        match self {
            VerifyOutcome::Authorized => "Access granted",
            VerifyOutcome::InvalidCode => "Invalid code, please retry",
            VerifyOutcome::Expired => "OTP expired, please request access again",
        }
    }
}

pub struct AccessGate {
    grants: Arc<GrantStore>,
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    pub fn new(grants: Arc<GrantStore>, clock: Arc<dyn Clock>) -> Self {
        Self { grants, clock }
    }

    /// Check `submitted` against the grant.
    ///
    /// Expiry is checked before the code, and neither a wrong code nor an expired grant changes
    /// stored state. There is no attempt counting. Re-submitting the correct code for an
    /// already verified, unexpired grant returns `Authorized` without writing.
    ///
    /// # Errors
    ///
    /// `NotFound` if no grant has this id (including grants removed by supersession).
    pub fn verify_code(&self, grant_id: &GrantId, submitted: &str) -> PortalResult<VerifyOutcome> {
        let now = self.clock.now();
        let outcome = self
            .grants
            .update(grant_id, |grant| {
                if grant.is_expired(now) {
                    (false, VerifyOutcome::Expired)
                } else if !grant.code.matches(submitted) {
                    (false, VerifyOutcome::InvalidCode)
                } else if grant.verified {
                    (false, VerifyOutcome::Authorized)
                } else {
                    grant.verified = true;
                    (true, VerifyOutcome::Authorized)
                }
            })?
            .ok_or_else(|| PortalError::NotFound(format!("access grant {grant_id}")))?;

        match outcome {
            VerifyOutcome::Authorized => tracing::info!(%grant_id, "access grant verified"),
            VerifyOutcome::InvalidCode => tracing::warn!(%grant_id, "invalid access code submitted"),
            VerifyOutcome::Expired => tracing::info!(%grant_id, "access code submitted after expiry"),
        }
        Ok(outcome)
    }

    /// True iff the pair's grant is verified and unexpired right now.
    ///
    /// Fails closed: a store error is logged and reported as not authorised.
    pub fn check_authorized(&self, doctor: &DoctorId, patient: &PatientId) -> bool {
        match self.grants.find_for_pair(doctor, patient) {
            Ok(Some(grant)) => grant.is_authorized(self.clock.now()),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(%doctor, %patient, "grant lookup failed: {}", e);
                false
            }
        }
    }

    /// Like [`Self::check_authorized`], returning the live grant or `Unauthorized`.
    pub fn require_authorized(
        &self,
        doctor: &DoctorId,
        patient: &PatientId,
    ) -> PortalResult<AccessGrant> {
        let now = self.clock.now();
        match self.grants.find_for_pair(doctor, patient)? {
            Some(grant) if grant.is_authorized(now) => Ok(grant),
            _ => Err(PortalError::Unauthorized(
                "OTP verification required before accessing this patient's records".into(),
            )),
        }
    }

    /// A patient's own grant, only while it is authorised.
    ///
    /// Grants belonging to other patients are reported as `NotFound`.
    pub fn active_grant(&self, patient: &PatientId, grant_id: &GrantId) -> PortalResult<AccessGrant> {
        let grant = self
            .grants
            .get(grant_id)?
            .filter(|g| &g.patient == patient)
            .ok_or_else(|| PortalError::NotFound(format!("access grant {grant_id}")))?;

        if !grant.is_authorized(self.clock.now()) {
            return Err(PortalError::Unauthorized(
                "this access grant is not verified or has expired".into(),
            ));
        }
        Ok(grant)
    }
}
