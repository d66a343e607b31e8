use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{ResourceError, ResourceResult};

/// A `(predicate, object)` pair attached to an archived resource id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub predicate: String,
    pub object: String,
}

impl Annotation {
    pub fn new(predicate: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// Builders for failure reports.
pub struct Report;

impl Report {
    /// Annotations describing an exception of the given kind.
    pub fn exception(kind: &str, message: impl Into<String>) -> Vec<Annotation> {
        vec![
            Annotation::new("rdf:type", "wase:Report"),
            Annotation::new("rdf:type", "wase:Exception"),
            Annotation::new("rdf:type", format!("wase:Exception-{kind}")),
            Annotation::new("rdfs:comment", message),
        ]
    }

    /// Report annotations for a [`ResourceError`].
    pub fn from_error(err: &ResourceError) -> Vec<Annotation> {
        Self::exception(err.kind(), err.to_string())
    }
}

/// The catalog: authoritative list of archived resource ids and sink for
/// annotations and failure reports.
pub trait Catalog: Send + Sync {
    /// Refresh from the authoritative source.
    fn initialize(&self) -> ResourceResult<()>;

    /// Ids of all archived resources, in catalog order.
    fn list(&self) -> ResourceResult<Vec<String>>;

    /// Attach metadata to an id.
    fn annotate(&self, id: &str, annotations: &[Annotation]) -> ResourceResult<()>;

    /// Record a report (usually a failure) for an id.
    fn report(&self, id: &str, report: &[Annotation]) -> ResourceResult<()>;
}

/// Catalog over a fixed id list that records annotations and reports in
/// memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    ids: RwLock<Vec<String>>,
    annotations: RwLock<BTreeMap<String, Vec<Annotation>>>,
    reports: RwLock<BTreeMap<String, Vec<Annotation>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> ResourceError {
    ResourceError::Io(std::io::Error::other(format!("lock poisoned: {e}")))
}

impl InMemoryCatalog {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: RwLock::new(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Replace the id list.
    pub fn set_ids(&self, ids: Vec<String>) -> ResourceResult<()> {
        *self.ids.write().map_err(poisoned)? = ids;
        Ok(())
    }

    /// All reports recorded for `id`.
    pub fn reports_for(&self, id: &str) -> Vec<Annotation> {
        self.reports
            .read()
            .ok()
            .and_then(|r| r.get(id).cloned())
            .unwrap_or_default()
    }

    /// Ids with at least one report, sorted.
    pub fn reported_ids(&self) -> Vec<String> {
        self.reports
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All annotations recorded for `id`.
    pub fn annotations_for(&self, id: &str) -> Vec<Annotation> {
        self.annotations
            .read()
            .ok()
            .and_then(|a| a.get(id).cloned())
            .unwrap_or_default()
    }
}

impl Catalog for InMemoryCatalog {
    fn initialize(&self) -> ResourceResult<()> {
        Ok(())
    }

    fn list(&self) -> ResourceResult<Vec<String>> {
        Ok(self.ids.read().map_err(poisoned)?.clone())
    }

    fn annotate(&self, id: &str, annotations: &[Annotation]) -> ResourceResult<()> {
        self.annotations
            .write()
            .map_err(poisoned)?
            .entry(id.to_string())
            .or_default()
            .extend_from_slice(annotations);
        Ok(())
    }

    fn report(&self, id: &str, report: &[Annotation]) -> ResourceResult<()> {
        self.reports
            .write()
            .map_err(poisoned)?
            .entry(id.to_string())
            .or_default()
            .extend_from_slice(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_preserves_order() {
        let catalog = InMemoryCatalog::new(["b", "a", "c"]);
        assert_eq!(catalog.list().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn reports_accumulate_per_id() {
        let catalog = InMemoryCatalog::new(Vec::<String>::new());
        catalog
            .report("x.warc.gz", &Report::exception("Compression", "bad header"))
            .unwrap();
        catalog
            .report("x.warc.gz", &[Annotation::new("rdfs:comment", "second")])
            .unwrap();
        let reports = catalog.reports_for("x.warc.gz");
        assert_eq!(reports.len(), 5);
        assert!(reports.contains(&Annotation::new("rdf:type", "wase:Exception-Compression")));
        assert_eq!(catalog.reported_ids(), vec!["x.warc.gz".to_string()]);
    }

    #[test]
    fn report_from_error_uses_variant_name() {
        let report = Report::from_error(&ResourceError::NotFound("x".into()));
        assert!(report.contains(&Annotation::new("rdf:type", "wase:Exception-NotFound")));
        assert!(report.contains(&Annotation::new("rdfs:comment", "resource not found: x")));
    }
}
