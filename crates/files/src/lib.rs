//! Carelith download area
//!
//! This crate owns the directory from which uploaded and materialised document attachments
//! are served to portal users.
//!
//! ## Storage Model
//!
//! Files are content-addressed by SHA-256 but keep their (sanitised) original name as the
//! final path component, so a download URL still ends in something a browser can open:
//!
//! ```text
//! <media_root>/
//! └── fhir_downloads/
//!     └── ab/
//!         └── ab3f9e…/
//!             └── scan.pdf
//! ```
//!
//! - Identical content under the same name is stored once
//! - Two different files sharing a name never overwrite each other
//! - Stored files are never modified
//!
//! ## Example Usage
//!
//! ```no_run
//! use carelith_files::DownloadsService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = DownloadsService::new(Path::new("carelith_data/media"), "/media/")?;
//! let stored = service.store("scan.pdf", b"%PDF-1.7")?;
//! println!("{}", stored.url);
//! # Ok(())
//! # }
//! ```

mod constants;
mod content_type;
mod downloads;

pub use constants::{DEFAULT_ATTACHMENT_TITLE, DOWNLOADS_FOLDER_NAME, GENERIC_CONTENT_TYPE};
pub use content_type::content_type_for;
pub use downloads::{DownloadsService, FileMetadata};

/// Errors that can occur during download-area operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Media root does not exist or is not a directory
    #[error("Invalid media root: {0}")]
    InvalidRootDirectory(String),

    /// File name is empty or reduces to nothing after sanitising
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Inline attachment data is not valid base64
    #[error("Invalid attachment data: {0}")]
    InvalidAttachment(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
