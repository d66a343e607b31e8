//! Plugin registry and driver workflows for wacli.
//!
//! Roles (`local_repository`, `catalog`, `recompressor`, ...) are configured
//! in TOML as ordered lists of module entries. The [`PluginRegistry`] builds
//! each entry on first use, memoizes it, and lets factories resolve other
//! roles by name.

pub mod catalog;
pub mod config;
pub mod error;
pub mod modules;
pub mod registry;
pub mod workflow;

pub use catalog::ListCatalog;
pub use config::{PluginEntry, RegistryConfig};
pub use error::{ConfigurationError, RegistryError, RegistryResult};
pub use registry::{Factory, Plugin, PluginContext, PluginRegistry};
pub use workflow::{list_catalog, load_warcs, recompress_warcs, Roles};
