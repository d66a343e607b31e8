use thiserror::Error;

use wacli_types::ResourceError;

/// A plugin could not be constructed from its configuration entry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("role '{role}' (module: {module}): {reason}")]
pub struct ConfigurationError {
    pub role: String,
    pub module: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role '{role}' provides {found}, not {expected}")]
    WrongKind {
        role: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
