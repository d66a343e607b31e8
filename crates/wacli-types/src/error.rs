use std::io;

/// Errors raised while opening, walking, copying, or persisting resources.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The requested open mode is not one of `r`, `rb`, `w`, `wb`.
    #[error("unsupported mode '{0}': only 'r', 'rb', 'w' and 'wb' are supported")]
    UnsupportedMode(String),

    /// The mode is valid in general but not for this backend or handle.
    #[error("mode '{mode}' is not supported by {backend}")]
    ModeNotAllowed { backend: String, mode: String },

    /// A read was attempted on an id that does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// A write was attempted on a read-only backend.
    #[error("{0} is read only")]
    ReadOnly(String),

    /// `retrieve_stream` was called without an explicit id list.
    #[error("{backend} needs a list of explicit ids")]
    MissingSelector { backend: String },

    /// The id names a subtree where a single resource was expected.
    #[error("resource '{0}' is a subtree, not a leaf")]
    NotALeaf(String),

    /// The id cannot be mapped onto the backend's namespace.
    #[error("invalid resource id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// A reader was requested from a write-mode stream or vice versa.
    #[error("stream for '{0}' was opened in the wrong direction")]
    WrongDirection(String),

    /// The backend does not implement this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported { backend: String, operation: String },

    /// Text content was not valid UTF-8.
    #[error("encoding error in '{name}': {reason}")]
    Encoding { name: String, reason: String },

    /// A remote manifest document could not be parsed.
    #[error("malformed manifest for '{id}': {reason}")]
    Manifest { id: String, reason: String },

    /// A network transfer failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Compressed content could not be read or written.
    #[error("compression error in '{name}': {reason}")]
    Compression { name: String, reason: String },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ResourceError {
    /// Create an [`Self::Unsupported`] error.
    pub fn unsupported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    /// Create an [`Self::Encoding`] error.
    pub fn encoding(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Short, stable name of the error variant, used when reporting a
    /// failure to a catalog.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedMode(_) => "UnsupportedMode",
            Self::ModeNotAllowed { .. } => "ModeNotAllowed",
            Self::NotFound(_) => "NotFound",
            Self::ReadOnly(_) => "ReadOnly",
            Self::MissingSelector { .. } => "MissingSelector",
            Self::NotALeaf(_) => "NotALeaf",
            Self::InvalidId { .. } => "InvalidId",
            Self::WrongDirection(_) => "WrongDirection",
            Self::Unsupported { .. } => "Unsupported",
            Self::Encoding { .. } => "Encoding",
            Self::Manifest { .. } => "Manifest",
            Self::Transport(_) => "Transport",
            Self::Compression { .. } => "Compression",
            Self::Io(_) => "Io",
        }
    }

    /// Map an I/O error, turning `NotFound` into [`Self::NotFound`] for `name`.
    pub fn from_io(name: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(name.to_string())
        } else {
            Self::Io(err)
        }
    }
}

/// Result alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err = ResourceError::from_io("a/b", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ResourceError::NotFound(ref id) if id == "a/b"));
    }

    #[test]
    fn other_io_errors_stay_io() {
        let err = ResourceError::from_io("a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), "Io");
    }

    #[test]
    fn display_names_the_backend() {
        let err = ResourceError::MissingSelector {
            backend: "DirectoryStorage".into(),
        };
        assert_eq!(err.to_string(), "DirectoryStorage needs a list of explicit ids");
    }
}
