//! Boundary validation. Everything here runs before any state changes.

use crate::constants::MAX_DOMAIN_CODES;
use crate::domain::DomainCatalog;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a habit may declare at most {max} domain codes, got {got}")]
    TooManyDomainCodes { max: usize, got: usize },

    #[error("unknown domain code: {0:?}")]
    UnknownDomainCode(String),

    #[error("malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("date range is inverted: from {from} is after to {to}")]
    InvertedDateRange { from: String, to: String },

    #[error("limit must be at least 1")]
    ZeroLimit,

    #[error("unknown {field} value: {value:?}")]
    UnknownVariant { field: &'static str, value: String },
}

/// Check a declared domain-code list.
///
/// The count limit always applies. Codes missing from the catalogue are
/// rejected only under `strict`; otherwise they pass through as literal
/// identifiers, empty strings included.
pub fn validate_domain_codes(
    codes: &[String],
    catalog: &DomainCatalog,
    strict: bool,
) -> Result<(), ValidationError> {
    if codes.len() > MAX_DOMAIN_CODES {
        return Err(ValidationError::TooManyDomainCodes {
            max: MAX_DOMAIN_CODES,
            got: codes.len(),
        });
    }
    if strict
        && let Some(unknown) = codes.iter().find(|c| !catalog.contains(c))
    {
        return Err(ValidationError::UnknownDomainCode(unknown.clone()));
    }
    Ok(())
}

/// Check that an optional `[from, to]` range is not inverted.
pub fn validate_date_range(from: Option<i64>, to: Option<i64>) -> Result<(), ValidationError> {
    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err(ValidationError::InvertedDateRange {
            from: crate::time::unix_to_iso8601(from),
            to: crate::time::unix_to_iso8601(to),
        });
    }
    Ok(())
}

pub fn validate_limit(limit: Option<usize>) -> Result<(), ValidationError> {
    match limit {
        Some(0) => Err(ValidationError::ZeroLimit),
        _ => Ok(()),
    }
}
