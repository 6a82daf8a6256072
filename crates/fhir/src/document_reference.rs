//! FHIR `DocumentReference` wire model and translation helpers.
//!
//! A document reference describes one uploaded medical file: who it is about (the subject),
//! a free-text description, the author displays, and a single content attachment which is
//! either a resolvable URL or inline base64 data.
//!
//! Responsibilities:
//! - Define the public domain-level carrier [`DocumentReferenceData`]
//! - Define the wire model used for JSON (de)serialisation
//! - Translate between the two, validating the subject reference

use crate::{
    expect_resource_type, parse_with_path, patient_reference, subject_id_from_reference,
    FhirError, FhirResult,
};
use serde::{Deserialize, Serialize};

const RESOURCE_TYPE: &str = "DocumentReference";

/// Document type text used for every report the portal creates.
pub const MEDICAL_REPORT_TYPE: &str = "Medical Report";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Where the bytes of an attachment can be found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentSource {
    /// A URL the caller can resolve (local backend).
    Url(String),
    /// Base64-encoded file content (remote backend).
    Inline(String),
}

/// Domain-level carrier for a document attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentData {
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub source: Option<AttachmentSource>,
}

impl AttachmentData {
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            Some(AttachmentSource::Url(url)) => Some(url),
            _ => None,
        }
    }
}

/// Domain-level carrier for a `DocumentReference` resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentReferenceData {
    /// Resource id; absent before a server has assigned one.
    pub id: Option<String>,
    pub status: String,
    /// Subject id (the `<id>` in `Patient/<id>`).
    pub subject_id: String,
    pub description: Option<String>,
    /// Author display strings, in resource order.
    pub authors: Vec<String>,
    /// First content attachment, if any.
    pub attachment: Option<AttachmentData>,
    pub type_text: Option<String>,
}

impl DocumentReferenceData {
    /// A `current` medical report for `subject_id` with no id assigned yet.
    pub fn medical_report(subject_id: impl Into<String>) -> Self {
        Self {
            id: None,
            status: "current".into(),
            subject_id: subject_id.into(),
            description: None,
            authors: Vec::new(),
            attachment: None,
            type_text: Some(MEDICAL_REPORT_TYPE.into()),
        }
    }
}

// ============================================================================
// Public DocumentReference operations
// ============================================================================

/// DocumentReference resource operations.
///
/// This is a zero-sized type used for namespacing. All methods are associated functions.
pub struct DocumentReference;

impl DocumentReference {
    /// Parse a document reference from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the JSON does not match the wire schema, the resourceType is not
    /// `DocumentReference`, or the subject is not a `Patient/<id>` reference.
    pub fn parse(json_text: &str) -> FhirResult<DocumentReferenceData> {
        let wire: DocumentReferenceWire = parse_with_path(json_text, RESOURCE_TYPE)?;
        wire_to_domain(wire)
    }

    /// Translate an already-decoded JSON value (for example a bundle entry resource).
    pub fn from_value(value: serde_json::Value) -> FhirResult<DocumentReferenceData> {
        let wire: DocumentReferenceWire = serde_json::from_value(value).map_err(|e| {
            FhirError::Translation(format!("{RESOURCE_TYPE} schema mismatch: {e}"))
        })?;
        wire_to_domain(wire)
    }

    /// Render a document reference as pretty-printed JSON text.
    pub fn render(data: &DocumentReferenceData) -> FhirResult<String> {
        Ok(serde_json::to_string_pretty(&domain_to_wire(data))?)
    }

    /// Render a document reference as a JSON value.
    pub fn to_value(data: &DocumentReferenceData) -> FhirResult<serde_json::Value> {
        Ok(serde_json::to_value(domain_to_wire(data))?)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentReferenceWire {
    resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(default = "default_status")]
    status: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    type_: Option<TextWire>,

    subject: ReferenceWire,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    author: Vec<DisplayWire>,

    #[serde(default)]
    content: Vec<ContentWire>,
}

fn default_status() -> String {
    "current".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TextWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReferenceWire {
    reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DisplayWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentWire {
    #[serde(default)]
    attachment: AttachmentWire,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

// ============================================================================
// Translation
// ============================================================================

fn wire_to_domain(wire: DocumentReferenceWire) -> FhirResult<DocumentReferenceData> {
    expect_resource_type(&wire.resource_type, RESOURCE_TYPE)?;

    let subject_id = subject_id_from_reference(&wire.subject.reference)?;

    let attachment = wire.content.into_iter().next().map(|c| {
        let a = c.attachment;
        // A URL wins over inline data when a server supplies both.
        let source = match (a.url, a.data) {
            (Some(url), _) if !url.is_empty() => Some(AttachmentSource::Url(url)),
            (_, Some(data)) if !data.is_empty() => Some(AttachmentSource::Inline(data)),
            _ => None,
        };
        AttachmentData {
            content_type: a.content_type,
            title: a.title,
            source,
        }
    });

    Ok(DocumentReferenceData {
        id: wire.id,
        status: wire.status,
        subject_id,
        description: wire.description,
        authors: wire.author.into_iter().filter_map(|a| a.display).collect(),
        attachment,
        type_text: wire.type_.and_then(|t| t.text),
    })
}

fn domain_to_wire(data: &DocumentReferenceData) -> DocumentReferenceWire {
    let content = data
        .attachment
        .as_ref()
        .map(|a| {
            let (url, inline) = match &a.source {
                Some(AttachmentSource::Url(url)) => (Some(url.clone()), None),
                Some(AttachmentSource::Inline(d)) => (None, Some(d.clone())),
                None => (None, None),
            };
            vec![ContentWire {
                attachment: AttachmentWire {
                    content_type: a.content_type.clone(),
                    title: a.title.clone(),
                    url,
                    data: inline,
                },
            }]
        })
        .unwrap_or_default();

    DocumentReferenceWire {
        resource_type: RESOURCE_TYPE.into(),
        id: data.id.clone(),
        status: data.status.clone(),
        type_: data.type_text.as_ref().map(|t| TextWire {
            text: Some(t.clone()),
        }),
        subject: ReferenceWire {
            reference: patient_reference(&data.subject_id),
        },
        description: data.description.clone(),
        author: data
            .authors
            .iter()
            .map(|a| DisplayWire {
                display: Some(a.clone()),
            })
            .collect(),
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocumentReferenceData {
        DocumentReferenceData {
            id: Some("42_20260111T143522.045Z".into()),
            description: Some("Report uploaded by Dr. Alice (City Hospital)".into()),
            authors: vec!["Dr. Alice".into()],
            attachment: Some(AttachmentData {
                content_type: Some("application/pdf".into()),
                title: Some("scan.pdf".into()),
                source: Some(AttachmentSource::Url("/media/fhir_downloads/scan.pdf".into())),
            }),
            ..DocumentReferenceData::medical_report("42")
        }
    }

    #[test]
    fn render_uses_fhir_field_names() {
        let value = DocumentReference::to_value(&sample()).unwrap();
        assert_eq!(value["resourceType"], "DocumentReference");
        assert_eq!(value["subject"]["reference"], "Patient/42");
        assert_eq!(value["type"]["text"], "Medical Report");
        assert_eq!(value["author"][0]["display"], "Dr. Alice");
        assert_eq!(
            value["content"][0]["attachment"]["url"],
            "/media/fhir_downloads/scan.pdf"
        );
        assert_eq!(value["content"][0]["attachment"]["contentType"], "application/pdf");
        assert!(value["content"][0]["attachment"].get("data").is_none());
    }

    #[test]
    fn parse_reads_rendered_document() {
        let text = DocumentReference::render(&sample()).unwrap();
        assert_eq!(DocumentReference::parse(&text).unwrap(), sample());
    }

    #[test]
    fn parse_tolerates_server_metadata_and_inline_data() {
        let text = r#"{
            "resourceType": "DocumentReference",
            "id": "981",
            "meta": {"versionId": "1", "lastUpdated": "2026-01-11T14:35:22Z"},
            "status": "current",
            "subject": {"reference": "Patient/7"},
            "content": [{"attachment": {"contentType": "image/png", "title": "xray.png", "data": "iVBORw0KGgo="}}]
        }"#;
        let doc = DocumentReference::parse(text).unwrap();
        assert_eq!(doc.id.as_deref(), Some("981"));
        assert_eq!(doc.subject_id, "7");
        assert!(doc.authors.is_empty());
        assert_eq!(doc.description, None);
        let attachment = doc.attachment.unwrap();
        assert_eq!(
            attachment.source,
            Some(AttachmentSource::Inline("iVBORw0KGgo=".into()))
        );
        assert_eq!(attachment.url(), None);
    }

    #[test]
    fn parse_reports_path_of_schema_mismatch() {
        let text = r#"{"resourceType": "DocumentReference", "subject": {"reference": 7}}"#;
        let err = DocumentReference::parse(text).unwrap_err();
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("subject.reference"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_wrong_resource_type() {
        let text = r#"{"resourceType": "Patient", "subject": {"reference": "Patient/1"}}"#;
        assert!(matches!(
            DocumentReference::parse(text),
            Err(FhirError::InvalidInput(_))
        ));
    }
}
