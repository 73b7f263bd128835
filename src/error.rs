use thiserror::Error;
use tonic::Status;

/// Coarse classification callers can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    Authorization,
    NotFound,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Nenhum registro encontrado para exportar")]
    EmptyExport,

    #[error("Export error: {0}")]
    Export(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Database(e) => match e {
                sqlx::Error::RowNotFound => ErrorKind::NotFound,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    ErrorKind::Network
                }
                sqlx::Error::Database(db)
                    if db.is_check_violation()
                        || db.is_unique_violation()
                        || is_invalid_text(&**db) =>
                {
                    ErrorKind::Validation
                }
                _ => ErrorKind::Internal,
            },
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidInput(_) | AppError::EmptyExport => ErrorKind::Validation,
            AppError::Unauthenticated | AppError::Forbidden(_) => ErrorKind::Authorization,
            AppError::StorageUnavailable(_) => ErrorKind::Network,
            AppError::Storage(_) | AppError::Export(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }
}

/// SQLSTATE 22P02: a value the column type cannot parse, e.g. a malformed uuid.
fn is_invalid_text(db: &dyn sqlx::error::DatabaseError) -> bool {
    db.code().as_deref() == Some("22P02")
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Database(e) => match e {
                sqlx::Error::RowNotFound => Status::not_found("Record not found"),
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    Status::unavailable(format!("Database unavailable: {}", e))
                }
                sqlx::Error::Database(ref db) if is_invalid_text(&**db) => {
                    Status::invalid_argument("malformed identifier or value")
                }
                sqlx::Error::Database(ref db)
                    if db.is_check_violation() || db.is_unique_violation() =>
                {
                    Status::invalid_argument(db.message().to_string())
                }
                other => Status::internal(format!("Database error: {}", other)),
            },
            AppError::NotFound(msg) => Status::not_found(msg),
            AppError::InvalidInput(msg) => Status::invalid_argument(msg),
            AppError::Unauthenticated => Status::unauthenticated("Authentication required"),
            AppError::Forbidden(msg) => Status::permission_denied(msg),
            AppError::Storage(msg) => Status::internal(format!("Storage error: {}", msg)),
            AppError::StorageUnavailable(msg) => {
                Status::unavailable(format!("Storage unavailable: {}", msg))
            }
            AppError::EmptyExport => {
                Status::failed_precondition("Nenhum registro encontrado para exportar")
            }
            AppError::Export(msg) => Status::internal(format!("Export error: {}", msg)),
            AppError::Internal(msg) => Status::internal(msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use tonic::Code;

    /// Server-side error carrying only a SQLSTATE.
    #[derive(Debug)]
    struct PgState(&'static str);

    impl std::fmt::Display for PgState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "invalid input syntax for type uuid: \"abc\"")
        }
    }

    impl StdError for PgState {}

    impl sqlx::error::DatabaseError for PgState {
        fn message(&self) -> &str {
            "invalid input syntax for type uuid: \"abc\""
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn pg_error(state: &'static str) -> AppError {
        AppError::Database(sqlx::Error::Database(Box::new(PgState(state))))
    }

    #[test]
    fn test_kinds() {
        assert_eq!(AppError::invalid("x").kind(), ErrorKind::Validation);
        assert_eq!(AppError::EmptyExport.kind(), ErrorKind::Validation);
        assert_eq!(AppError::Unauthenticated.kind(), ErrorKind::Authorization);
        assert_eq!(AppError::Forbidden("x".into()).kind(), ErrorKind::Authorization);
        assert_eq!(AppError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::StorageUnavailable("timeout".into()).kind(),
            ErrorKind::Network
        );
        assert_eq!(AppError::Database(sqlx::Error::PoolTimedOut).kind(), ErrorKind::Network);
        assert_eq!(AppError::Database(sqlx::Error::RowNotFound).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::invalid("bad"), Code::InvalidArgument),
            (AppError::not_found("gone"), Code::NotFound),
            (AppError::Unauthenticated, Code::Unauthenticated),
            (AppError::Forbidden("no".into()), Code::PermissionDenied),
            (AppError::StorageUnavailable("down".into()), Code::Unavailable),
            (AppError::EmptyExport, Code::FailedPrecondition),
            (AppError::Internal("boom".into()), Code::Internal),
            (AppError::Database(sqlx::Error::PoolTimedOut), Code::Unavailable),
        ];
        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn test_malformed_value_is_validation() {
        let err = pg_error("22P02");
        assert_eq!(err.kind(), ErrorKind::Validation);
        let status = Status::from(err);
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(!status.message().contains("uuid"));

        let other = pg_error("42P01");
        assert_eq!(other.kind(), ErrorKind::Internal);
        assert_eq!(Status::from(other).code(), Code::Internal);
    }
}
