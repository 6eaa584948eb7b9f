use hl_core::ValidationError;

/// Coarse classification callers use to decide between fixing the input,
/// retrying, or giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("conflict: suggestion {id} is already {status}")]
    AlreadyResolved { id: uuid::Uuid, status: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) | StoreError::AlreadyResolved { .. } => ErrorKind::Conflict,
            StoreError::Sqlite(_)
            | StoreError::Json(_)
            | StoreError::Config(_)
            | StoreError::InvalidData(_) => ErrorKind::Internal,
        }
    }

    /// Whether a fresh attempt of the whole operation might succeed. A
    /// suggestion that is already resolved stays resolved, so that conflict
    /// is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            StoreError::from(ValidationError::ZeroLimit).kind(),
            ErrorKind::Validation
        );
        assert_eq!(StoreError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(StoreError::InvalidData("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_retryable() {
        assert!(StoreError::Conflict("x".into()).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(!StoreError::from(ValidationError::ZeroLimit).is_retryable());

        let resolved = StoreError::AlreadyResolved {
            id: uuid::Uuid::nil(),
            status: "accepted".into(),
        };
        assert_eq!(resolved.kind(), ErrorKind::Conflict);
        assert!(!resolved.is_retryable());
    }
}
