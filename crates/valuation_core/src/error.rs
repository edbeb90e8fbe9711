use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("malformed key: {message}")]
    MalformedKey { message: String },
    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },
    #[error("backend request failed: {message}")]
    BackendRequestFailed { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("cancelled: {message}")]
    Cancelled { message: String },
}

impl ValuationError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn malformed_key(message: impl Into<String>) -> Self {
        Self::MalformedKey {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::BackendRequestFailed {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Prefixes the message, keeping the variant.
    pub fn with_context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::NotFound { message } => Self::not_found(format!("{context}: {message}")),
            Self::MalformedKey { message } => Self::malformed_key(format!("{context}: {message}")),
            Self::BackendUnavailable { message } => {
                Self::unavailable(format!("{context}: {message}"))
            }
            Self::BackendRequestFailed { message } => {
                Self::request_failed(format!("{context}: {message}"))
            }
            Self::Validation { message } => Self::validation(format!("{context}: {message}")),
            Self::Cancelled { message } => Self::cancelled(format!("{context}: {message}")),
        }
    }

    /// True for failures raised by the storage engine itself rather than by
    /// the access layer.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::BackendRequestFailed { .. }
        )
    }
}

pub type ValuationResult<T> = Result<T, ValuationError>;

impl From<sea_orm::DbErr> for ValuationError {
    fn from(value: sea_orm::DbErr) -> Self {
        match value {
            sea_orm::DbErr::ConnectionAcquire(_) | sea_orm::DbErr::Conn(_) => {
                ValuationError::unavailable(value.to_string())
            }
            other => ValuationError::request_failed(other.to_string()),
        }
    }
}
