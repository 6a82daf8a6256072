//! Attribution filter: which documents "belong" to the requesting clinician.
//!
//! Matching is a substring heuristic and can false-positive (a clinician named "Al" matches
//! an author "Dr. Albert"). The order is fixed:
//! 1. each author display is checked, in order, for the clinician's account name or full
//!    name (case-sensitive); the first match attributes the document
//! 2. only when no author matched, the description is checked for the account name,
//!    ignoring case
//!
//! Empty names never match anything.

use crate::constants::DEFAULT_RECORD_DESCRIPTION;
use carelith_files::DownloadsService;
use fhir::{AttachmentSource, DocumentReferenceData};
use serde::Serialize;

const UNKNOWN_AUTHOR: &str = "Unknown";
const UNKNOWN_HOSPITAL: &str = "Unknown Hospital";
const UNKNOWN_CONTENT_TYPE: &str = "N/A";
const UPLOADED_BY_MARKER: &str = "uploaded by Dr.";

/// The names a clinician can appear under in document text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clinician {
    /// Login/account name.
    pub account: String,
    pub full_name: String,
}

impl Clinician {
    pub fn new(account: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            full_name: full_name.into(),
        }
    }

    pub fn is_author_of(&self, document: &DocumentReferenceData) -> bool {
        let account = self.account.trim();
        let full_name = self.full_name.trim();

        let by_author = document.authors.iter().any(|author| {
            (!account.is_empty() && author.contains(account))
                || (!full_name.is_empty() && author.contains(full_name))
        });
        if by_author {
            return true;
        }

        match (&document.description, account.is_empty()) {
            (Some(description), false) => description
                .to_lowercase()
                .contains(&account.to_lowercase()),
            _ => false,
        }
    }
}

/// Documents split by attribution, each side in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition<T> {
    pub mine: Vec<T>,
    pub others: Vec<T>,
}

/// Split `documents` between the clinician's own and everyone else's.
///
/// Without a clinician (patient self-view) everything lands in `others`.
pub fn partition<I>(documents: I, clinician: Option<&Clinician>) -> Partition<DocumentReferenceData>
where
    I: IntoIterator<Item = DocumentReferenceData>,
{
    let mut out = Partition {
        mine: Vec::new(),
        others: Vec::new(),
    };
    for document in documents {
        if clinician.is_some_and(|c| c.is_author_of(&document)) {
            out.mine.push(document);
        } else {
            out.others.push(document);
        }
    }
    out
}

/// Display summary of one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub document_id: Option<String>,
    pub description: String,
    pub author_name: String,
    pub hospital_name: String,
    pub content_type: String,
    pub file_url: Option<String>,
    pub is_mine: bool,
}

impl RecordSummary {
    /// Summarise `document`, materialising inline attachment data into the download area so
    /// the summary carries a resolvable URL.
    pub fn from_document(
        document: &DocumentReferenceData,
        is_mine: bool,
        downloads: &DownloadsService,
    ) -> Self {
        let description = document
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RECORD_DESCRIPTION.to_string());

        let (author_name, hospital_name) = match parse_uploaded_by(&description) {
            Some(parsed) => parsed,
            None => (
                document
                    .authors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
                UNKNOWN_HOSPITAL.to_string(),
            ),
        };

        let attachment = document.attachment.as_ref();
        let content_type = attachment
            .and_then(|a| a.content_type.clone())
            .unwrap_or_else(|| UNKNOWN_CONTENT_TYPE.to_string());

        let file_url = attachment.and_then(|a| match &a.source {
            Some(AttachmentSource::Url(url)) => Some(url.clone()),
            Some(AttachmentSource::Inline(data)) => {
                match downloads.materialise_inline(a.title.as_deref(), data) {
                    Ok(stored) => Some(stored.url.into_inner()),
                    Err(e) => {
                        tracing::warn!(
                            document_id = document.id.as_deref().unwrap_or("-"),
                            "inline attachment could not be stored: {}",
                            e
                        );
                        None
                    }
                }
            }
            None => None,
        });

        Self {
            document_id: document.id.clone(),
            description,
            author_name,
            hospital_name,
            content_type,
            file_url,
            is_mine,
        }
    }
}

/// Parses `... uploaded by Dr. <name> (<hospital>)` into `(name, hospital)`.
///
/// Without a parenthesised hospital the remainder is the author and the hospital is unknown.
fn parse_uploaded_by(description: &str) -> Option<(String, String)> {
    let (_, after) = description.split_once(UPLOADED_BY_MARKER)?;
    let after = after.trim();

    let parsed = match after.split_once('(') {
        Some((name, rest)) if rest.contains(')') => {
            let hospital = rest.split(')').next().unwrap_or_default().trim();
            (name.trim().to_string(), non_empty_or(hospital, UNKNOWN_HOSPITAL))
        }
        _ => (after.to_string(), UNKNOWN_HOSPITAL.to_string()),
    };

    let (name, hospital) = parsed;
    Some((non_empty_or(&name, UNKNOWN_AUTHOR), hospital))
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Summaries of every document, plus the clinician's own and the rest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummaries {
    pub all: Vec<RecordSummary>,
    pub mine: Vec<RecordSummary>,
    pub others: Vec<RecordSummary>,
}

/// Summarise `documents` in input order; `all` keeps the input order across both sides.
pub fn summarise<I>(
    documents: I,
    clinician: Option<&Clinician>,
    downloads: &DownloadsService,
) -> RecordSummaries
where
    I: IntoIterator<Item = DocumentReferenceData>,
{
    let mut out = RecordSummaries::default();
    for document in documents {
        let is_mine = clinician.is_some_and(|c| c.is_author_of(&document));
        let summary = RecordSummary::from_document(&document, is_mine, downloads);
        if is_mine {
            out.mine.push(summary.clone());
        } else {
            out.others.push(summary.clone());
        }
        out.all.push(summary);
    }
    out
}
