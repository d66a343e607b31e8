use std::path::PathBuf;

use flate2::Compression;
use serde::Deserialize;
use tracing::Level;

use crate::error::{OperationError, OperationResult};

fn default_log_level() -> String {
    "debug".to_string()
}

/// Configuration of the debug stage.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct DebugConfig {
    /// Prepended to every log line.
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl DebugConfig {
    pub fn level(&self) -> OperationResult<Level> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" | "warning" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => Err(OperationError::UnknownLogLevel(self.log_level.clone())),
        }
    }
}

fn default_compression_level() -> u32 {
    6
}

/// Configuration of the recompression stage.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RecompressConfig {
    /// gzip level, 0 to 9.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Directory for spool files; the system temp directory when unset.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl Default for RecompressConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            spool_dir: None,
        }
    }
}

impl RecompressConfig {
    pub fn validate(&self) -> OperationResult<()> {
        if self.compression_level > 9 {
            return Err(OperationError::invalid(
                "compression_level",
                format!("{} is not in 0..=9", self.compression_level),
            ));
        }
        Ok(())
    }

    pub fn compression(&self) -> Compression {
        Compression::new(self.compression_level)
    }
}
