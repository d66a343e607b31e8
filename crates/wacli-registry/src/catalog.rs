use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use wacli_storage::StorageBackend;
use wacli_types::{read_to_string, Annotation, Catalog, InMemoryCatalog, OpenMode, ResourceResult};

/// Catalog whose ids are read from a newline-separated list kept in a
/// storage backend.
///
/// Blank lines and lines starting with `#` are skipped. Annotations and
/// reports are kept in memory.
pub struct ListCatalog {
    source: Arc<dyn StorageBackend>,
    id: String,
    limit: Option<usize>,
    loaded: AtomicBool,
    records: InMemoryCatalog,
}

impl ListCatalog {
    pub fn new(source: Arc<dyn StorageBackend>, id: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
            limit: None,
            loaded: AtomicBool::new(false),
            records: InMemoryCatalog::default(),
        }
    }

    /// Only list the first `limit` ids.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reports recorded for `id`.
    pub fn reports_for(&self, id: &str) -> Vec<Annotation> {
        self.records.reports_for(id)
    }
}

fn parse_ids(text: &str, limit: Option<usize>) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .take(limit.unwrap_or(usize::MAX))
        .map(str::to_string)
        .collect()
}

impl Catalog for ListCatalog {
    fn initialize(&self) -> ResourceResult<()> {
        let (handle, _) = self.source.retrieve(&self.id, OpenMode::ReadText)?;
        let ids = parse_ids(&read_to_string(handle.as_ref())?, self.limit);
        info!(source = self.source.name(), id = %self.id, count = ids.len(), "loaded catalog");
        self.records.set_ids(ids)?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn list(&self) -> ResourceResult<Vec<String>> {
        if !self.loaded.load(Ordering::SeqCst) {
            self.initialize()?;
        }
        self.records.list()
    }

    fn annotate(&self, id: &str, annotations: &[Annotation]) -> ResourceResult<()> {
        debug!(id, count = annotations.len(), "annotate");
        self.records.annotate(id, annotations)
    }

    fn report(&self, id: &str, report: &[Annotation]) -> ResourceResult<()> {
        debug!(id, count = report.len(), "report");
        self.records.report(id, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wacli_storage::FileStorage;
    use wacli_types::Report;

    fn catalog_file(content: &str) -> (tempfile::TempDir, Arc<dyn StorageBackend>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, content).unwrap();
        (dir, Arc::new(FileStorage::new(path)))
    }

    #[test]
    fn lists_ids_skipping_comments_and_blanks() {
        let (_dir, storage) = catalog_file("# ids\n111\n\n 222 \n333\n");
        let catalog = ListCatalog::new(storage, "ids.txt");
        assert_eq!(catalog.list().unwrap(), vec!["111", "222", "333"]);
    }

    #[test]
    fn limit_truncates() {
        let (_dir, storage) = catalog_file("1\n2\n3\n");
        let catalog = ListCatalog::new(storage, "ids.txt").with_limit(2);
        assert_eq!(catalog.list().unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn initialize_rereads_the_source() {
        let (dir, storage) = catalog_file("1\n");
        let catalog = ListCatalog::new(storage, "ids.txt");
        assert_eq!(catalog.list().unwrap(), vec!["1"]);
        std::fs::write(dir.path().join("ids.txt"), "1\n2\n").unwrap();
        assert_eq!(catalog.list().unwrap(), vec!["1"]);
        catalog.initialize().unwrap();
        assert_eq!(catalog.list().unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn reports_are_recorded() {
        let (_dir, storage) = catalog_file("");
        let catalog = ListCatalog::new(storage, "ids.txt");
        catalog.report("x", &Report::exception("Compression", "bad")).unwrap();
        assert_eq!(catalog.reports_for("x").len(), 4);
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ListCatalog::new(Arc::new(FileStorage::new(dir.path().join("absent"))), "absent");
        assert!(catalog.list().is_err());
    }
}
