use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;

/// Role configuration: every role maps to an ordered list of plugin entries.
///
/// ```toml
/// [[roles.local_repository]]
/// module = "storage.directory"
/// path = "warcs"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<PluginEntry>>,
}

impl RegistryConfig {
    pub fn from_toml_str(s: &str) -> RegistryResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Append an entry to `role`.
    pub fn add(&mut self, role: impl Into<String>, entry: PluginEntry) -> &mut Self {
        self.roles.entry(role.into()).or_default().push(entry);
        self
    }

    pub fn with(mut self, role: impl Into<String>, entry: PluginEntry) -> Self {
        self.add(role, entry);
        self
    }
}

/// One `{ module, ...params }` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub module: String,
    #[serde(flatten)]
    pub params: toml::Table,
}

impl PluginEntry {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            params: toml::Table::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// A string parameter, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(toml::Value::as_str)
    }

    /// A required, non-empty string parameter.
    pub fn require_str(&self, key: &str) -> Result<&str, String> {
        match self.params.get(key) {
            None => Err(format!("missing required parameter '{key}'")),
            Some(value) => match value.as_str() {
                Some(s) if !s.trim().is_empty() => Ok(s),
                Some(_) => Err(format!("parameter '{key}' must not be empty")),
                None => Err(format!("parameter '{key}' must be a string")),
            },
        }
    }

    /// Deserialize the parameters into a settings struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, String> {
        toml::Value::Table(self.params.clone())
            .try_into()
            .map_err(|e: toml::de::Error| e.message().to_string())
    }
}
