/// Folder under the media root holding downloadable attachments.
pub const DOWNLOADS_FOLDER_NAME: &str = "fhir_downloads";

/// Content type for any extension not explicitly recognised.
pub const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

/// File name used when an inline attachment carries no title.
pub const DEFAULT_ATTACHMENT_TITLE: &str = "report_file";
