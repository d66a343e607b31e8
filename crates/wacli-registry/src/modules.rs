//! Built-in plugin factories.

use std::sync::Arc;

use wacli_ops::{DebugConfig, DebugStage, RecompressConfig, RecompressStage};
use wacli_storage::{ArchiveSettings, ArchiveStorage, DirectoryStorage, FileStorage, S3Settings, S3Storage};

use crate::catalog::ListCatalog;
use crate::config::PluginEntry;
use crate::error::RegistryResult;
use crate::registry::{Plugin, PluginContext, PluginRegistry};

pub const STORAGE_DIRECTORY: &str = "storage.directory";
pub const STORAGE_FILE: &str = "storage.file";
pub const STORAGE_S3: &str = "storage.s3";
pub const STORAGE_ARAS: &str = "storage.aras";
pub const CATALOG_LIST: &str = "catalog.list";
pub const OPERATIONS_DEBUG: &str = "operations.debug";
pub const OPERATIONS_RECOMPRESS: &str = "operations.recompress";

pub(crate) fn register_builtins(registry: &mut PluginRegistry) {
    registry.register_module(STORAGE_DIRECTORY, directory);
    registry.register_module(STORAGE_FILE, file);
    registry.register_module(STORAGE_S3, s3);
    registry.register_module(STORAGE_ARAS, aras);
    registry.register_module(CATALOG_LIST, list_catalog);
    registry.register_module(OPERATIONS_DEBUG, debug);
    registry.register_module(OPERATIONS_RECOMPRESS, recompress);
}

fn directory(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    let path = entry.require_str("path").map_err(|r| ctx.invalid(r))?;
    Ok(Plugin::Storage(Arc::new(DirectoryStorage::new(path))))
}

fn file(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    let path = entry.require_str("path").map_err(|r| ctx.invalid(r))?;
    Ok(Plugin::Storage(Arc::new(FileStorage::new(path))))
}

fn s3(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    let settings: S3Settings = entry.parse().map_err(|r| ctx.invalid(r))?;
    settings.validate().map_err(|r| ctx.invalid(r))?;
    let mut storage = S3Storage::connect(&settings).map_err(|e| ctx.invalid(e.to_string()))?;
    if let Some(role) = entry.get_str("catalog") {
        storage = storage.with_catalog(ctx.registry().catalog(role)?);
    }
    Ok(Plugin::Storage(Arc::new(storage)))
}

fn aras(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    entry.require_str("rest_base").map_err(|r| ctx.invalid(r))?;
    entry.require_str("repo").map_err(|r| ctx.invalid(r))?;
    let settings: ArchiveSettings = entry.parse().map_err(|r| ctx.invalid(r))?;
    let storage = ArchiveStorage::connect(&settings).map_err(|e| ctx.invalid(e.to_string()))?;
    Ok(Plugin::Storage(Arc::new(storage)))
}

fn list_catalog(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    let role = entry.require_str("storage_backend").map_err(|r| ctx.invalid(r))?;
    let id = entry.get_str("id").unwrap_or("catalog.txt");
    let limit = match entry.params.get("limit") {
        None => None,
        Some(value) => {
            let n = value
                .as_integer()
                .filter(|n| *n >= 0)
                .ok_or_else(|| ctx.invalid("parameter 'limit' must be a non-negative integer"))?;
            Some(n as usize)
        }
    };
    let source = ctx.registry().storage(role)?;
    let mut catalog = ListCatalog::new(source, id);
    if let Some(limit) = limit {
        catalog = catalog.with_limit(limit);
    }
    Ok(Plugin::Catalog(Arc::new(catalog)))
}

fn debug(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    let config: DebugConfig = entry.parse().map_err(|r| ctx.invalid(r))?;
    let stage = DebugStage::new(&config).map_err(|e| ctx.invalid(e.to_string()))?;
    Ok(Plugin::Operation(Arc::new(stage)))
}

fn recompress(ctx: &PluginContext<'_>, entry: &PluginEntry) -> RegistryResult<Plugin> {
    let config: RecompressConfig = entry.parse().map_err(|r| ctx.invalid(r))?;
    let mut stage = RecompressStage::new(config).map_err(|e| ctx.invalid(e.to_string()))?;
    if let Some(role) = entry.get_str("catalog") {
        stage = stage.with_catalog(ctx.registry().catalog(role)?);
    }
    Ok(Plugin::Operation(Arc::new(stage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::error::RegistryError;

    fn registry(role: &str, entry: PluginEntry) -> PluginRegistry {
        PluginRegistry::new(RegistryConfig::default().with(role, entry))
    }

    fn config_reason(result: RegistryResult<impl Sized>) -> String {
        match result {
            Err(RegistryError::Configuration(e)) => e.reason,
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn s3_requires_bucket_name() {
        let reg = registry("s3", PluginEntry::new(STORAGE_S3).with("bucket_name", ""));
        assert!(config_reason(reg.storage("s3")).contains("bucket_name"));
        let reg = registry("s3", PluginEntry::new(STORAGE_S3));
        assert!(config_reason(reg.storage("s3")).contains("bucket_name"));
    }

    #[test]
    fn aras_requires_rest_base_and_repo() {
        let reg = registry("arch", PluginEntry::new(STORAGE_ARAS).with("repo", "r"));
        assert!(config_reason(reg.storage("arch")).contains("rest_base"));
        let reg = registry(
            "arch",
            PluginEntry::new(STORAGE_ARAS)
                .with("rest_base", "http://archive.test/")
                .with("repo", "example_warc"),
        );
        assert!(reg.storage("arch").is_ok());
    }

    #[test]
    fn debug_rejects_unknown_level() {
        let reg = registry("dbg", PluginEntry::new(OPERATIONS_DEBUG).with("log_level", "loud"));
        assert!(config_reason(reg.operation("dbg")).contains("loud"));
    }

    #[test]
    fn recompress_rejects_bad_level() {
        let reg = registry(
            "rc",
            PluginEntry::new(OPERATIONS_RECOMPRESS).with("compression_level", 12i64),
        );
        assert!(config_reason(reg.operation("rc")).contains("compression_level"));
    }

    #[test]
    fn list_catalog_resolves_its_storage_role() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ids.txt"), "a\nb\nc\n").unwrap();
        let config = RegistryConfig::default()
            .with(
                "catalog",
                PluginEntry::new(CATALOG_LIST)
                    .with("storage_backend", "ids")
                    .with("limit", 2i64),
            )
            .with(
                "ids",
                PluginEntry::new(STORAGE_FILE).with("path", dir.path().join("ids.txt").display().to_string()),
            );
        let registry = PluginRegistry::new(config);
        let catalog = registry.catalog("catalog").unwrap();
        assert_eq!(catalog.list().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn list_catalog_with_missing_storage_role() {
        let reg = registry("catalog", PluginEntry::new(CATALOG_LIST).with("storage_backend", "nowhere"));
        assert!(matches!(reg.catalog("catalog"), Err(RegistryError::UnknownRole(ref r)) if r == "nowhere"));
    }
}
