//! Driver workflows over configured roles.

use tracing::{debug, info};

use wacli_ops::Pipeline;
use wacli_storage::StoreSummary;
use wacli_types::OpenMode;

use crate::error::RegistryResult;
use crate::registry::PluginRegistry;

/// Role names the workflows look up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roles {
    pub catalog: String,
    pub source: String,
    pub local: String,
    pub local_clean: String,
    pub recompressor: String,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            catalog: "catalog".into(),
            source: "source_repository".into(),
            local: "local_repository".into(),
            local_clean: "local_recompressed_repository".into(),
            recompressor: "recompressor".into(),
        }
    }
}

/// Log and return the ids of the catalog.
pub fn list_catalog(registry: &PluginRegistry, roles: &Roles) -> RegistryResult<Vec<String>> {
    let ids = registry.catalog(&roles.catalog)?.list()?;
    for id in &ids {
        info!(id = %id, "catalog entry");
    }
    Ok(ids)
}

/// Copy every catalogued resource from the source repository into the local
/// repository.
pub fn load_warcs(registry: &PluginRegistry, roles: &Roles) -> RegistryResult<StoreSummary> {
    let ids = registry.catalog(&roles.catalog)?.list()?;
    if ids.is_empty() {
        info!("catalog is empty, nothing to load");
        return Ok(StoreSummary::default());
    }
    let source = registry.storage(&roles.source)?;
    let local = registry.storage(&roles.local)?;
    debug!(count = ids.len(), source = source.name(), target = local.name(), "loading WARCs");
    let summary = local.store_stream(source.retrieve_stream(&ids, OpenMode::ReadBinary)?)?;
    info!(leaves = summary.leaves, bytes = summary.bytes, "loaded WARCs");
    Ok(summary)
}

/// Run every resource of the local repository through the recompressor
/// operations and store the result in the clean repository.
pub fn recompress_warcs(registry: &PluginRegistry, roles: &Roles) -> RegistryResult<StoreSummary> {
    let local = registry.storage(&roles.local)?;
    let clean = registry.storage(&roles.local_clean)?;
    let pipeline: Pipeline = registry.operations(&roles.recompressor)?.into_iter().collect();

    let ids = local.list()?;
    if ids.is_empty() {
        info!("local repository is empty, nothing to recompress");
        return Ok(StoreSummary::default());
    }
    debug!(count = ids.len(), operations = ?pipeline.names(), "recompressing WARCs");
    let stream = pipeline.run(local.retrieve_stream(&ids, OpenMode::ReadBinary)?);
    let summary = clean.store_stream(stream)?;
    info!(leaves = summary.leaves, bytes = summary.bytes, "recompressed WARCs");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PluginEntry, RegistryConfig};
    use flate2::read::MultiGzDecoder;
    use std::fs;
    use std::io::Read;
    use std::path::Path;

    fn record(block: &str) -> String {
        format!(
            "WARC/1.0\r\nWARC-Type: resource\r\nContent-Length: {}\r\n\r\n{block}\r\n\r\n",
            block.len()
        )
    }

    fn directory(path: &Path) -> PluginEntry {
        PluginEntry::new("storage.directory").with("path", path.display().to_string())
    }

    #[test]
    fn load_then_recompress() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source");
        let local = root.path().join("local");
        let clean = root.path().join("clean");
        fs::create_dir_all(source.join("111")).unwrap();
        fs::create_dir_all(source.join("222")).unwrap();
        fs::write(source.join("111/a.warc"), record("alpha")).unwrap();
        fs::write(source.join("222/b.warc"), record("beta")).unwrap();
        fs::write(source.join("222/broken.warc"), "not a warc").unwrap();
        fs::write(root.path().join("ids.txt"), "111\n222\n").unwrap();

        let config = RegistryConfig::default()
            .with("ids", PluginEntry::new("storage.file").with("path", root.path().join("ids.txt").display().to_string()))
            .with("catalog", PluginEntry::new("catalog.list").with("storage_backend", "ids"))
            .with("source_repository", directory(&source))
            .with("local_repository", directory(&local))
            .with("local_recompressed_repository", directory(&clean))
            .with("recompressor", PluginEntry::new("operations.debug").with("prefix", "in: "))
            .with("recompressor", PluginEntry::new("operations.recompress").with("catalog", "catalog"));
        let registry = PluginRegistry::new(config);
        let roles = Roles::default();

        assert_eq!(list_catalog(&registry, &roles).unwrap(), vec!["111", "222"]);

        let loaded = load_warcs(&registry, &roles).unwrap();
        assert_eq!(loaded.leaves, 3);
        assert_eq!(fs::read_to_string(local.join("111/a.warc")).unwrap(), record("alpha"));

        let recompressed = recompress_warcs(&registry, &roles).unwrap();
        assert_eq!(recompressed.leaves, 2);
        assert!(!clean.join("222/broken.warc").exists());

        let mut decoded = String::new();
        MultiGzDecoder::new(fs::File::open(clean.join("222/b.warc")).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, record("beta"));
    }

    #[test]
    fn empty_catalog_loads_nothing() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("ids.txt"), "").unwrap();
        let config = RegistryConfig::default()
            .with("ids", PluginEntry::new("storage.file").with("path", root.path().join("ids.txt").display().to_string()))
            .with("catalog", PluginEntry::new("catalog.list").with("storage_backend", "ids"));
        let registry = PluginRegistry::new(config);
        assert_eq!(load_warcs(&registry, &Roles::default()).unwrap(), StoreSummary::default());
    }
}
