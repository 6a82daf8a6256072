use crate::constants::OTP_LENGTH;
use crate::records::{DoctorId, HospitalId, PatientId};
use crate::{PortalError, PortalResult};
use carelith_uuid::GrantId;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-width numeric one-time code.
///
/// `Debug` never prints the digits.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OtpCode(String);

impl OtpCode {
    /// Uniformly random in `000000..=999999`; codes are not unique across grants.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n: u32 = rng.gen_range(0..10u32.pow(OTP_LENGTH as u32));
        Self(format!("{:0width$}", n, width = OTP_LENGTH))
    }

    pub fn parse(input: &str) -> PortalResult<Self> {
        let input = input.trim();
        if input.len() != OTP_LENGTH || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PortalError::InvalidInput(format!(
                "access code must be {OTP_LENGTH} digits"
            )));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares without short-circuiting on the first differing digit.
    pub fn matches(&self, submitted: &str) -> bool {
        let submitted = submitted.trim().as_bytes();
        let expected = self.0.as_bytes();
        if submitted.len() != expected.len() {
            return false;
        }
        expected
            .iter()
            .zip(submitted)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}

impl TryFrom<String> for OtpCode {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OtpCode> for String {
    fn from(code: OtpCode) -> Self {
        code.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Pending,
    Authorized,
    Expired,
}

impl fmt::Display for GrantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GrantState::Pending => "pending",
            GrantState::Authorized => "authorized",
            GrantState::Expired => "expired",
        })
    }
}

/// A consent record binding one doctor to one patient for a bounded window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: GrantId,
    pub doctor: DoctorId,
    pub patient: PatientId,
    #[serde(default)]
    pub origin_org: Option<HospitalId>,
    #[serde(default)]
    pub destination_org: Option<HospitalId>,
    pub code: OtpCode,
    #[serde(default)]
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Verified and not yet past expiry. Evaluated per call, never cached.
    pub fn is_authorized(&self, now: DateTime<Utc>) -> bool {
        self.verified && !self.is_expired(now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> GrantState {
        if self.is_expired(now) {
            GrantState::Expired
        } else if self.verified {
            GrantState::Authorized
        } else {
            GrantState::Pending
        }
    }

    pub fn is_for(&self, doctor: &DoctorId, patient: &PatientId) -> bool {
        &self.doctor == doctor && &self.patient == patient
    }

    pub fn view(&self, now: DateTime<Utc>) -> GrantView {
        GrantView {
            grant_id: self.id.clone(),
            doctor: self.doctor.clone(),
            patient: self.patient.clone(),
            origin_org: self.origin_org.clone(),
            destination_org: self.destination_org.clone(),
            state: self.state(now),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// A grant as shown to callers: its state at a given instant and no code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GrantView {
    pub grant_id: GrantId,
    pub doctor: DoctorId,
    pub patient: PatientId,
    pub origin_org: Option<HospitalId>,
    pub destination_org: Option<HospitalId>,
    pub state: GrantState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(verified: bool) -> AccessGrant {
        let created_at = "2026-01-11T10:00:00Z".parse().unwrap();
        AccessGrant {
            id: GrantId::new(),
            doctor: DoctorId::new("d1"),
            patient: PatientId::new("p1"),
            origin_org: Some(HospitalId::new("h1")),
            destination_org: None,
            code: OtpCode::parse("123456").unwrap(),
            verified,
            created_at,
            expires_at: created_at + Duration::minutes(10),
        }
    }

    #[test]
    fn generated_codes_are_six_digits() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let code = OtpCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn code_parse_rejects_wrong_shapes() {
        assert!(OtpCode::parse("12345").is_err());
        assert!(OtpCode::parse("1234567").is_err());
        assert!(OtpCode::parse("12a456").is_err());
        assert!(OtpCode::parse(" 000001 ").is_ok());
    }

    #[test]
    fn code_matching_is_exact() {
        let code = OtpCode::parse("123456").unwrap();
        assert!(code.matches("123456"));
        assert!(code.matches(" 123456\n"));
        assert!(!code.matches("654321"));
        assert!(!code.matches("12345"));
        assert!(!code.matches(""));
    }

    #[test]
    fn debug_hides_code() {
        let code = OtpCode::parse("123456").unwrap();
        assert!(!format!("{code:?}").contains("123456"));
    }

    #[test]
    fn authorization_is_temporal() {
        let g = grant(true);
        assert_eq!(g.state(g.created_at), GrantState::Authorized);
        assert!(g.is_authorized(g.expires_at));
        assert!(!g.is_authorized(g.expires_at + Duration::milliseconds(1)));
        assert_eq!(
            g.state(g.expires_at + Duration::minutes(1)),
            GrantState::Expired
        );
    }

    #[test]
    fn unverified_grant_is_pending_then_expired() {
        let g = grant(false);
        assert_eq!(g.state(g.created_at), GrantState::Pending);
        assert!(!g.is_authorized(g.created_at));
        assert_eq!(g.state(g.expires_at + Duration::seconds(1)), GrantState::Expired);
    }

    #[test]
    fn stored_grant_round_trips_through_json() {
        let g = grant(false);
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.contains("\"code\":\"123456\""));
        let back: AccessGrant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn view_omits_code() {
        let g = grant(false);
        let json = serde_json::to_value(g.view(g.created_at)).unwrap();
        assert!(json.get("code").is_none());
        assert_eq!(json["state"], "pending");
    }
}
