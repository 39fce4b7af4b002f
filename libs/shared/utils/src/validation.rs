// =====================================================================================
// INPUT VALIDATION HELPERS
// =====================================================================================

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use tracing::debug;

use shared_models::AppError;

pub const MIN_STATUS_CODE: i64 = 100;
pub const MAX_STATUS_CODE: i64 = 599;

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").ok())
        .as_ref()
}

fn invalid(field: &str, expected: impl std::fmt::Display) -> AppError {
    debug!(field = %field, "Validation failed");
    AppError::ValidationError(format!("{} must be {}", field, expected))
}

/// Identifiers are `[A-Za-z0-9_-]` with a length in `min..=max`.
pub fn validate_identifier(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let matches = identifier_pattern().is_some_and(|re| re.is_match(value));
    if !matches || value.len() < min || value.len() > max {
        return Err(invalid(
            field,
            format_args!("{}-{} characters of letters, digits, '_' or '-'", min, max),
        ));
    }
    Ok(())
}

pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(invalid(field, format_args!("between {} and {} characters", min, max)));
    }
    Ok(())
}

/// Accepts absolute `http`/`https` URLs with a host.
pub fn validate_http_url(field: &str, value: &str) -> Result<(), AppError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => Err(invalid(field, "an absolute http(s) URL")),
    }
}

pub fn validate_range(field: &str, value: i64, min: i64, max: i64) -> Result<i64, AppError> {
    if value < min || value > max {
        return Err(invalid(field, format_args!("between {} and {}", min, max)));
    }
    Ok(value)
}

pub fn validate_status_code(field: &str, value: i64) -> Result<u16, AppError> {
    validate_range(field, value, MIN_STATUS_CODE, MAX_STATUS_CODE).map(|code| code as u16)
}

pub fn validate_status_codes(field: &str, values: &[i64]) -> Result<Vec<u16>, AppError> {
    if values.is_empty() {
        return Err(invalid(field, "a non-empty list of status codes"));
    }
    values
        .iter()
        .map(|value| validate_status_code(field, *value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("api_id", "billing-api_2", 3, 50).is_ok());
        assert!(validate_identifier("api_id", "ab", 3, 50).is_err());
        assert!(validate_identifier("api_id", "has space", 3, 50).is_err());
        assert!(validate_identifier("api_id", &"x".repeat(51), 3, 50).is_err());
        assert!(validate_identifier("rule_id", &"x".repeat(64), 3, 64).is_ok());
    }

    #[test]
    fn test_http_url_rules() {
        assert!(validate_http_url("base_url", "https://example.com/health").is_ok());
        assert!(validate_http_url("base_url", "http://127.0.0.1:8080").is_ok());
        assert!(validate_http_url("base_url", "ftp://example.com").is_err());
        assert!(validate_http_url("base_url", "/relative/path").is_err());
    }

    #[test]
    fn test_status_code_bounds() {
        assert_eq!(validate_status_code("status_code", 100).unwrap(), 100);
        assert_eq!(validate_status_code("status_code", 599).unwrap(), 599);
        assert_matches!(
            validate_status_code("status_code", 600),
            Err(AppError::ValidationError(msg)) if msg.contains("status_code")
        );
        assert!(validate_status_codes("expected_status", &[]).is_err());
        assert_eq!(validate_status_codes("expected_status", &[200, 204]).unwrap(), vec![200, 204]);
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(validate_length("name", "", 1, 200).is_err());
        assert!(validate_length("name", "ünïcödé", 1, 7).is_ok());
    }
}
