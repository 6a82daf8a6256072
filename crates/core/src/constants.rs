//! Constants used throughout the Carelith core crate.
//!
//! This module contains all path and filename constants to ensure
//! consistency across the codebase and make maintenance easier.

/// Default directory for portal data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "carelith_data";

/// Default URL prefix under which the download area is served.
pub const DEFAULT_MEDIA_URL: &str = "/media/";

/// Directory name (under the data dir) of the download area.
pub const MEDIA_DIR_NAME: &str = "media";

/// Filename of the consent grant store.
pub const GRANTS_FILENAME: &str = "grants.json";

/// Filename of the medical-record snapshot.
pub const RECORDS_FILENAME: &str = "records.json";

/// Directory name of the local FHIR document store.
pub const LOCAL_FHIR_DIR_NAME: &str = "fhir_local";

/// Subdirectory of the local FHIR store holding one JSON file per subject.
pub const LOCAL_PATIENTS_DIR_NAME: &str = "patients";

/// Subdirectory of the local FHIR store holding one JSON file per document.
pub const LOCAL_DOCUMENTS_DIR_NAME: &str = "documents";

/// Index file mapping subject id to its ordered document ids.
pub const LOCAL_INDEX_FILENAME: &str = "index.json";

/// Number of digits in a one-time access code.
pub const OTP_LENGTH: usize = 6;

/// Minutes a grant stays usable after it is issued.
pub const DEFAULT_GRANT_TTL_MINUTES: i64 = 10;

/// Default outbound HTTP timeout (document service, SMS gateway).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// Upper bound for any outbound HTTP call, uploads included.
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 10;

/// Description shown for documents that carry none.
pub const DEFAULT_RECORD_DESCRIPTION: &str = "Medical Report";
