/// Errors raised while configuring transform stages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OperationError {
    /// A configuration value is out of range or malformed.
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// The requested log level is not one of trace, debug, info, warn, error.
    #[error("unknown log level: {0}")]
    UnknownLogLevel(String),
}

impl OperationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type OperationResult<T> = Result<T, OperationError>;
