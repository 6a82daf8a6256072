//! Request and response bodies of the REST API.
//!
//! Timestamps are RFC 3339 strings; identifiers are the portal's own string ids.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Body of every non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestAccessReq {
    pub patient_id: String,
    /// Organisation the record is shared with.
    #[serde(default)]
    pub destination_org: Option<String>,
}

/// The code itself is only sent to the patient.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestAccessRes {
    pub grant_id: String,
    pub expires_at: String,
    /// `email` or `sms`.
    pub delivered_via: String,
    /// Earlier grants for the same doctor and patient that were replaced.
    pub superseded: Vec<String>,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpReq {
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpRes {
    pub grant_id: String,
    /// `authorized`, `invalid_code` or `expired`.
    pub outcome: String,
    pub authorized: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckAccessRes {
    pub patient_id: String,
    pub authorized: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantRes {
    pub grant_id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub origin_org: Option<String>,
    pub destination_org: Option<String>,
    /// `pending`, `authorized` or `expired`.
    pub state: String,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListGrantsRes {
    pub grants: Vec<GrantRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecordSummaryRes {
    pub document_id: Option<String>,
    pub description: String,
    pub author_name: String,
    pub hospital_name: String,
    pub content_type: String,
    pub file_url: Option<String>,
    pub is_mine: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordsRes {
    pub patient_id: String,
    pub patient_name: String,
    pub all: Vec<RecordSummaryRes>,
    pub mine: Vec<RecordSummaryRes>,
    pub others: Vec<RecordSummaryRes>,
    /// Set when the document service could not be read; the lists are then empty.
    pub fetch_failed: bool,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    pub file_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadRes {
    pub success: bool,
    /// Status reported by the document service.
    pub status: u16,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PatientQuery {
    pub patient: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_access_destination_is_optional() {
        let req: RequestAccessReq = serde_json::from_str(r#"{"patient_id":"p1"}"#).unwrap();
        assert_eq!(req.patient_id, "p1");
        assert!(req.destination_org.is_none());
    }
}
