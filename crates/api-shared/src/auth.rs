//! Request authentication.
//!
//! Every REST call presents the shared API key in `x-api-key` and the identity resolved by the
//! external identity provider in `x-caller` (`doctor:<id>` or `patient:<id>`).

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CALLER_HEADER: &str = "x-caller";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing caller identity")]
    MissingCaller,
    #[error("invalid caller identity '{0}': expected doctor:<id> or patient:<id>")]
    InvalidCaller(String),
}

/// Caller identity as asserted by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallerIdentity {
    Doctor(String),
    Patient(String),
}

/// Validates the provided API key against the key configured at startup.
pub fn validate_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), AuthError> {
    let provided_key = provided_key
        .filter(|k| !k.is_empty())
        .ok_or(AuthError::MissingApiKey)?;
    if expected_key.is_empty() || !constant_time_eq(provided_key.as_bytes(), expected_key.as_bytes())
    {
        return Err(AuthError::InvalidApiKey);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parses an `x-caller` header value.
pub fn parse_caller(value: Option<&str>) -> Result<CallerIdentity, AuthError> {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).ok_or(AuthError::MissingCaller)?;

    let (role, id) = value
        .split_once(':')
        .ok_or_else(|| AuthError::InvalidCaller(value.to_string()))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(AuthError::InvalidCaller(value.to_string()));
    }

    match role.trim().to_ascii_lowercase().as_str() {
        "doctor" => Ok(CallerIdentity::Doctor(id.to_string())),
        "patient" => Ok(CallerIdentity::Patient(id.to_string())),
        _ => Err(AuthError::InvalidCaller(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_must_match() {
        assert_eq!(validate_api_key(Some("secret"), "secret"), Ok(()));
        assert_eq!(
            validate_api_key(Some("wrong"), "secret"),
            Err(AuthError::InvalidApiKey)
        );
        assert_eq!(validate_api_key(None, "secret"), Err(AuthError::MissingApiKey));
        assert_eq!(validate_api_key(Some(""), "secret"), Err(AuthError::MissingApiKey));
    }

    #[test]
    fn unset_expected_key_rejects_everything() {
        assert_eq!(validate_api_key(Some("x"), ""), Err(AuthError::InvalidApiKey));
    }

    #[test]
    fn caller_roles_parse() {
        assert_eq!(
            parse_caller(Some("doctor:d1")),
            Ok(CallerIdentity::Doctor("d1".into()))
        );
        assert_eq!(
            parse_caller(Some(" Patient: p1 ")),
            Ok(CallerIdentity::Patient("p1".into()))
        );
    }

    #[test]
    fn malformed_callers_are_rejected() {
        assert_eq!(parse_caller(None), Err(AuthError::MissingCaller));
        assert_eq!(parse_caller(Some("  ")), Err(AuthError::MissingCaller));
        assert!(matches!(parse_caller(Some("doctor")), Err(AuthError::InvalidCaller(_))));
        assert!(matches!(parse_caller(Some("doctor:")), Err(AuthError::InvalidCaller(_))));
        assert!(matches!(parse_caller(Some("nurse:n1")), Err(AuthError::InvalidCaller(_))));
    }
}
