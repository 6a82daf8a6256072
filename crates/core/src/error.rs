/// Errors surfaced by portal operations.
///
/// `InvalidCode` and `Expired` are not errors: verification reports them as
/// [`crate::access::VerifyOutcome`] values.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("no e-mail address or phone number on file for patient {0}")]
    ContactMissing(String),
    #[error("could not deliver the access code: {0}")]
    DeliveryFailed(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("document service unavailable: {0}")]
    BridgeUnavailable(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialise JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("file error: {0}")]
    Files(#[from] carelith_files::FilesError),
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;
