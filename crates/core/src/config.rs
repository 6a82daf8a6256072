//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_GRANT_TTL_MINUTES, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MEDIA_URL,
    GRANTS_FILENAME, LOCAL_FHIR_DIR_NAME, MAX_HTTP_TIMEOUT_SECS, MEDIA_DIR_NAME, RECORDS_FILENAME,
};
use crate::{PortalError, PortalResult};
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which document service the bridge talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentBackend {
    /// Filesystem-backed substitute under `<data_dir>/fhir_local`.
    Local,
    /// A FHIR server reachable over HTTP.
    Remote,
}

impl FromStr for DocumentBackend {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(PortalError::InvalidInput(format!(
                "document backend must be 'local' or 'remote', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DocumentBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// How one-time codes leave the system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryConfig {
    /// Codes are written to the log (development).
    Console,
    /// Codes are posted to an SMS gateway.
    Sms { url: Url, api_key: String },
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    media_url: String,
    records_file: PathBuf,
    backend: DocumentBackend,
    fhir_base_url: Option<Url>,
    delivery: DeliveryConfig,
    http_timeout: Duration,
    grant_ttl: chrono::Duration,
}

impl CoreConfig {
    /// Create a `CoreConfig` using the local backend, console delivery and default timings.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::InvalidInput` if `data_dir` is not an existing directory or
    /// `media_url` is empty or does not end with `/`.
    pub fn new(data_dir: PathBuf, media_url: String) -> PortalResult<Self> {
        if !data_dir.is_dir() {
            return Err(PortalError::InvalidInput(format!(
                "data directory does not exist: {}",
                data_dir.display()
            )));
        }

        let media_url = media_url.trim().to_string();
        if media_url.is_empty() || !media_url.ends_with('/') {
            return Err(PortalError::InvalidInput(format!(
                "media URL must be non-empty and end with '/', got '{media_url}'"
            )));
        }

        Ok(Self {
            records_file: data_dir.join(RECORDS_FILENAME),
            data_dir,
            media_url,
            backend: DocumentBackend::Local,
            fhir_base_url: None,
            delivery: DeliveryConfig::Console,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            grant_ttl: chrono::Duration::minutes(DEFAULT_GRANT_TTL_MINUTES),
        })
    }

    pub fn with_records_file(mut self, records_file: PathBuf) -> Self {
        self.records_file = records_file;
        self
    }

    /// Switch to the remote backend at `base_url` (http or https).
    pub fn with_remote_backend(mut self, base_url: &str) -> PortalResult<Self> {
        self.fhir_base_url = Some(parse_http_url(base_url, "FHIR base URL")?);
        self.backend = DocumentBackend::Remote;
        Ok(self)
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// Outbound timeout in whole seconds; must be a single digit (1-9).
    pub fn with_http_timeout_secs(mut self, secs: u64) -> PortalResult<Self> {
        if !(1..=9).contains(&secs) {
            return Err(PortalError::InvalidInput(format!(
                "HTTP timeout must be between 1 and 9 seconds, got {secs}"
            )));
        }
        self.http_timeout = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn with_grant_ttl_minutes(mut self, minutes: i64) -> PortalResult<Self> {
        if minutes <= 0 {
            return Err(PortalError::InvalidInput(format!(
                "grant TTL must be positive, got {minutes} minutes"
            )));
        }
        self.grant_ttl = chrono::Duration::minutes(minutes);
        Ok(self)
    }

    /// Resolve the full configuration from `lookup` (normally `std::env::var(..).ok()`).
    ///
    /// Reads `CARELITH_DATA_DIR`, `CARELITH_MEDIA_URL`, `CARELITH_RECORDS_FILE`,
    /// `CARELITH_DOCUMENT_BACKEND`, `CARELITH_FHIR_BASE_URL`, `CARELITH_HTTP_TIMEOUT_SECS`,
    /// `CARELITH_GRANT_TTL_MINUTES`, `CARELITH_DELIVERY`, `CARELITH_SMS_URL` and
    /// `CARELITH_SMS_API_KEY`. Unset values take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PortalResult<Self> {
        let data_dir = non_empty(lookup("CARELITH_DATA_DIR")).unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let media_url =
            non_empty(lookup("CARELITH_MEDIA_URL")).unwrap_or_else(|| DEFAULT_MEDIA_URL.into());

        let mut cfg = Self::new(PathBuf::from(data_dir), media_url)?
            .with_http_timeout_secs(http_timeout_from_env_value(lookup(
                "CARELITH_HTTP_TIMEOUT_SECS",
            ))?)?
            .with_grant_ttl_minutes(grant_ttl_from_env_value(lookup(
                "CARELITH_GRANT_TTL_MINUTES",
            ))?)?
            .with_delivery(delivery_from_env_values(
                lookup("CARELITH_DELIVERY"),
                lookup("CARELITH_SMS_URL"),
                lookup("CARELITH_SMS_API_KEY"),
            )?);

        if let Some(records_file) = non_empty(lookup("CARELITH_RECORDS_FILE")) {
            cfg = cfg.with_records_file(PathBuf::from(records_file));
        }

        match document_backend_from_env_value(lookup("CARELITH_DOCUMENT_BACKEND"))? {
            DocumentBackend::Local => Ok(cfg),
            DocumentBackend::Remote => {
                let base_url = non_empty(lookup("CARELITH_FHIR_BASE_URL")).ok_or_else(|| {
                    PortalError::InvalidInput(
                        "CARELITH_FHIR_BASE_URL is required when the document backend is 'remote'"
                            .into(),
                    )
                })?;
                cfg.with_remote_backend(&base_url)
            }
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn media_url(&self) -> &str {
        &self.media_url
    }

    /// Directory served under [`Self::media_url`].
    pub fn media_root(&self) -> PathBuf {
        self.data_dir.join(MEDIA_DIR_NAME)
    }

    pub fn local_fhir_dir(&self) -> PathBuf {
        self.data_dir.join(LOCAL_FHIR_DIR_NAME)
    }

    pub fn grants_file(&self) -> PathBuf {
        self.data_dir.join(GRANTS_FILENAME)
    }

    pub fn records_file(&self) -> &Path {
        &self.records_file
    }

    pub fn backend(&self) -> DocumentBackend {
        self.backend
    }

    pub fn fhir_base_url(&self) -> Option<&Url> {
        self.fhir_base_url.as_ref()
    }

    pub fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Uploads carry file bodies and get twice the normal timeout, capped.
    pub fn upload_timeout(&self) -> Duration {
        (self.http_timeout * 2).min(Duration::from_secs(MAX_HTTP_TIMEOUT_SECS))
    }

    pub fn grant_ttl(&self) -> chrono::Duration {
        self.grant_ttl
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_http_url(value: &str, what: &str) -> PortalResult<Url> {
    let url = Url::parse(value.trim())
        .map_err(|e| PortalError::InvalidInput(format!("{what} '{value}' is not a URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PortalError::InvalidInput(format!(
            "{what} must use http or https, got '{value}'"
        )));
    }
    Ok(url)
}

/// Parse the document backend from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DocumentBackend::Local`].
pub fn document_backend_from_env_value(value: Option<String>) -> PortalResult<DocumentBackend> {
    non_empty(value)
        .map(|v| v.parse())
        .transpose()
        .map(|b| b.unwrap_or(DocumentBackend::Local))
}

/// Parse the outbound HTTP timeout (seconds) from an optional string value.
pub fn http_timeout_from_env_value(value: Option<String>) -> PortalResult<u64> {
    match non_empty(value) {
        None => Ok(DEFAULT_HTTP_TIMEOUT_SECS),
        Some(v) => v.parse().map_err(|_| {
            PortalError::InvalidInput(format!("HTTP timeout must be a whole number of seconds, got '{v}'"))
        }),
    }
}

/// Parse the grant lifetime (minutes) from an optional string value.
pub fn grant_ttl_from_env_value(value: Option<String>) -> PortalResult<i64> {
    match non_empty(value) {
        None => Ok(DEFAULT_GRANT_TTL_MINUTES),
        Some(v) => v.parse().map_err(|_| {
            PortalError::InvalidInput(format!("grant TTL must be a whole number of minutes, got '{v}'"))
        }),
    }
}

/// Parse the delivery channel settings.
///
/// `kind` defaults to `console`; `sms` requires both a gateway URL and an API key.
pub fn delivery_from_env_values(
    kind: Option<String>,
    sms_url: Option<String>,
    sms_api_key: Option<String>,
) -> PortalResult<DeliveryConfig> {
    let kind = non_empty(kind).map(|k| k.to_ascii_lowercase());
    match kind.as_deref() {
        None | Some("console") => Ok(DeliveryConfig::Console),
        Some("sms") => {
            let url = non_empty(sms_url).ok_or_else(|| {
                PortalError::InvalidInput("CARELITH_SMS_URL is required for sms delivery".into())
            })?;
            let api_key = non_empty(sms_api_key).ok_or_else(|| {
                PortalError::InvalidInput("CARELITH_SMS_API_KEY is required for sms delivery".into())
            })?;
            Ok(DeliveryConfig::Sms {
                url: parse_http_url(&url, "SMS gateway URL")?,
                api_key,
            })
        }
        Some(other) => Err(PortalError::InvalidInput(format!(
            "delivery must be 'console' or 'sms', got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_local_backend_and_console_delivery() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_string_lossy().to_string();
        let cfg = CoreConfig::from_lookup(lookup_from(&[("CARELITH_DATA_DIR", &dir)])).unwrap();

        assert_eq!(cfg.backend(), DocumentBackend::Local);
        assert_eq!(cfg.delivery(), &DeliveryConfig::Console);
        assert_eq!(cfg.media_url(), "/media/");
        assert_eq!(cfg.http_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.upload_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.grant_ttl(), chrono::Duration::minutes(10));
        assert_eq!(cfg.records_file(), temp.path().join("records.json"));
        assert_eq!(cfg.grants_file(), temp.path().join("grants.json"));
        assert_eq!(cfg.media_root(), temp.path().join("media"));
    }

    #[test]
    fn missing_data_dir_is_rejected() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        assert!(CoreConfig::new(missing, "/media/".into()).is_err());
    }

    #[test]
    fn media_url_must_end_with_slash() {
        let temp = TempDir::new().unwrap();
        assert!(CoreConfig::new(temp.path().to_path_buf(), "/media".into()).is_err());
        assert!(CoreConfig::new(temp.path().to_path_buf(), "  ".into()).is_err());
    }

    #[test]
    fn remote_backend_requires_http_base_url() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_string_lossy().to_string();

        let missing = CoreConfig::from_lookup(lookup_from(&[
            ("CARELITH_DATA_DIR", &dir),
            ("CARELITH_DOCUMENT_BACKEND", "remote"),
        ]));
        assert!(matches!(missing, Err(PortalError::InvalidInput(_))));

        let bad_scheme = CoreConfig::from_lookup(lookup_from(&[
            ("CARELITH_DATA_DIR", &dir),
            ("CARELITH_DOCUMENT_BACKEND", "remote"),
            ("CARELITH_FHIR_BASE_URL", "ftp://fhir.example"),
        ]));
        assert!(bad_scheme.is_err());

        let cfg = CoreConfig::from_lookup(lookup_from(&[
            ("CARELITH_DATA_DIR", &dir),
            ("CARELITH_DOCUMENT_BACKEND", "Remote"),
            ("CARELITH_FHIR_BASE_URL", "http://localhost:8080/fhir/"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend(), DocumentBackend::Remote);
        assert_eq!(
            cfg.fhir_base_url().map(|u| u.as_str()),
            Some("http://localhost:8080/fhir/")
        );
    }

    #[test]
    fn timeout_must_be_single_digit() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(temp.path().to_path_buf(), "/media/".into()).unwrap();
        assert!(cfg.clone().with_http_timeout_secs(0).is_err());
        assert!(cfg.clone().with_http_timeout_secs(10).is_err());
        let cfg = cfg.with_http_timeout_secs(3).unwrap();
        assert_eq!(cfg.upload_timeout(), Duration::from_secs(6));
        assert!(http_timeout_from_env_value(Some("soon".into())).is_err());
    }

    #[test]
    fn ttl_must_be_positive() {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(temp.path().to_path_buf(), "/media/".into()).unwrap();
        assert!(cfg.clone().with_grant_ttl_minutes(0).is_err());
        assert_eq!(grant_ttl_from_env_value(Some(" 15 ".into())).unwrap(), 15);
        assert_eq!(grant_ttl_from_env_value(None).unwrap(), 10);
    }

    #[test]
    fn sms_delivery_requires_url_and_key() {
        assert!(delivery_from_env_values(Some("sms".into()), None, Some("k".into())).is_err());
        assert!(
            delivery_from_env_values(Some("sms".into()), Some("https://sms.example/send".into()), None)
                .is_err()
        );
        let cfg = delivery_from_env_values(
            Some("SMS".into()),
            Some("https://sms.example/send".into()),
            Some("k".into()),
        )
        .unwrap();
        assert!(matches!(cfg, DeliveryConfig::Sms { .. }));
        assert!(delivery_from_env_values(Some("pigeon".into()), None, None).is_err());
    }

    #[test]
    fn backend_values_parse() {
        assert_eq!(document_backend_from_env_value(None).unwrap(), DocumentBackend::Local);
        assert_eq!(
            document_backend_from_env_value(Some(" ".into())).unwrap(),
            DocumentBackend::Local
        );
        assert!(document_backend_from_env_value(Some("hapi".into())).is_err());
    }
}
