//! Download area service implementation
//!
//! [`DownloadsService`] stores attachment bytes beneath `<media_root>/fhir_downloads/` and
//! reports the URL under which the portal's static file route serves them.
//!
//! # Content Addressing
//!
//! The directory holding each file is named by the SHA-256 of its content:
//!
//! - **Deduplication**: storing the same bytes under the same name twice is a no-op
//! - **Isolation**: files with equal names but different content live in different folders
//! - **Immutability**: an existing stored file is never rewritten
//!
//! Writes go to a temporary sibling first and are renamed into place, so a reader never sees a
//! partially written file.

use crate::{content_type_for, FilesError, DEFAULT_ATTACHMENT_TITLE, DOWNLOADS_FOLDER_NAME};
use base64::Engine as _;
use carelith_types::NonEmptyText;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata for a stored download
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Hexadecimal SHA-256 digest of the file content
    pub hash: NonEmptyText,

    /// Path relative to the media root
    pub relative_path: NonEmptyText,

    /// URL the file is served under (`<media_url><relative_path>`)
    pub url: NonEmptyText,

    /// Sanitised file name
    pub file_name: NonEmptyText,

    /// Content type classified from the extension
    pub content_type: NonEmptyText,

    /// Media type sniffed from the bytes, if recognisable
    ///
    /// Best-effort only; may disagree with `content_type` when the extension lies.
    pub media_type: Option<NonEmptyText>,

    pub size_bytes: u64,

    /// `true` when identical content was already stored under this name
    pub deduplicated: bool,

    pub stored_at: DateTime<Utc>,
}

/// Service for the portal's download area
#[derive(Debug, Clone)]
pub struct DownloadsService {
    media_root: PathBuf,
    media_url: String,
}

impl DownloadsService {
    /// Creates a service rooted at `media_root`, publishing files under `media_url`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if `media_root` does not exist or is not a
    /// directory.
    pub fn new(media_root: &Path, media_url: impl Into<String>) -> Result<Self, FilesError> {
        if !media_root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                media_root.display()
            )));
        }

        let mut media_url = media_url.into();
        if !media_url.ends_with('/') {
            media_url.push('/');
        }

        Ok(Self {
            media_root: media_root.to_path_buf(),
            media_url,
        })
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Stores `bytes` under `file_name` and returns where it can be downloaded.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the name sanitises to nothing or any filesystem step fails.
    pub fn store(&self, file_name: &str, bytes: &[u8]) -> Result<FileMetadata, FilesError> {
        let file_name = sanitise_file_name(file_name)?;

        let hash = hex::encode(Sha256::digest(bytes));
        let relative_path = format!(
            "{}/{}/{}/{}",
            DOWNLOADS_FOLDER_NAME,
            &hash[0..2],
            hash,
            file_name
        );
        let storage_path = self.media_root.join(&relative_path);

        let deduplicated = storage_path.is_file();
        if !deduplicated {
            write_new_file(&storage_path, bytes)?;
        }

        let media_type = infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(FileMetadata {
            hash: text(hash)?,
            url: text(format!("{}{}", self.media_url, relative_path))?,
            relative_path: text(relative_path)?,
            content_type: text(content_type_for(&file_name))?,
            file_name: text(file_name)?,
            media_type,
            size_bytes: bytes.len() as u64,
            deduplicated,
            stored_at: Utc::now(),
        })
    }

    /// Removes a file returned by [`Self::store`] that ended up unreferenced.
    ///
    /// Deduplicated files existed before the call that returned them and are left in place.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if the file cannot be removed.
    pub fn discard(&self, stored: &FileMetadata) -> Result<(), FilesError> {
        if stored.deduplicated {
            return Ok(());
        }
        let path = self.media_root.join(stored.relative_path.as_str());
        fs::remove_file(&path)?;
        // The hash folder only ever holds this content; drop it when now empty.
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir(parent);
        }
        Ok(())
    }

    /// Decodes a base64 attachment and stores it, naming it `title` or a default.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidAttachment` when `data` is not valid base64.
    pub fn materialise_inline(
        &self,
        title: Option<&str>,
        data: &str,
    ) -> Result<FileMetadata, FilesError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| FilesError::InvalidAttachment(e.to_string()))?;

        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_ATTACHMENT_TITLE);
        self.store(title, &bytes)
    }
}

fn text(value: impl AsRef<str>) -> Result<NonEmptyText, FilesError> {
    NonEmptyText::new(value.as_ref())
        .map_err(|e| FilesError::InvalidFileName(format!("{}: {}", value.as_ref(), e)))
}

/// Reduces a client-supplied name to its last path component, restricted to
/// `[A-Za-z0-9._-]` (anything else becomes `_`).
fn sanitise_file_name(file_name: &str) -> Result<String, FilesError> {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(FilesError::InvalidFileName(file_name.to_string()));
    }
    Ok(cleaned)
}

fn write_new_file(storage_path: &Path, bytes: &[u8]) -> Result<(), FilesError> {
    let parent = storage_path.parent().ok_or_else(|| {
        FilesError::InvalidFileName(format!("no parent for {}", storage_path.display()))
    })?;

    fs::create_dir_all(parent).map_err(|e| {
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create download directory {}: {}", parent.display(), e),
        ))
    })?;

    let file_name = storage_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_ATTACHMENT_TITLE);
    let tmp_path = parent.join(format!(".{file_name}.partial"));
    fs::write(&tmp_path, bytes).map_err(|e| {
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write file to {}: {}", tmp_path.display(), e),
        ))
    })?;

    fs::rename(&tmp_path, storage_path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to move file into {}: {}", storage_path.display(), e),
        ))
    })
}
