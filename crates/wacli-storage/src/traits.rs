use wacli_types::{
    Metadata, OpenMode, Payload, ResourceError, ResourceHandle, ResourceResult, ResourceStream,
};

/// Counters returned by [`StorageBackend::store_stream`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Leaves written.
    pub leaves: usize,
    /// Subtrees descended into.
    pub subtrees: usize,
    /// Total bytes written across all leaves.
    pub bytes: u64,
    /// Leaves that failed and were reported to a catalog instead of aborting.
    pub reported: usize,
}

/// A place resource streams are read from and written to.
///
/// All implementations must satisfy these invariants:
/// - `retrieve_stream` never enumerates "everything": the selector is an
///   explicit, non-empty list of ids, otherwise `MissingSelector`.
/// - Streams are lazy. Nothing is opened or fetched before the consumer
///   pulls an element and opens its handle.
/// - The tree shape of a stored stream is preserved: retrieving the same
///   ids yields the same leaves and subtrees.
/// - Storing and retrieving a leaf is byte-exact regardless of the stream
///   kinds the source and destination were opened with, as long as text is
///   valid UTF-8.
pub trait StorageBackend: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &str;

    /// Copy one resource into the backend under `id`. Returns bytes written.
    fn store(&self, id: &str, source: &dyn ResourceHandle, metadata: &Metadata) -> ResourceResult<u64>;

    /// Consume a whole stream, writing every leaf.
    ///
    /// The default implementation maps every leaf to the id formed by
    /// joining its path segments with `/` and calls [`store`](Self::store).
    fn store_stream(&self, stream: ResourceStream) -> ResourceResult<StoreSummary> {
        walk_leaves(stream, &mut |path, handle, metadata| {
            self.store(&path.join("/"), handle, metadata)
        })
    }

    /// A handle on a single leaf, plus its metadata.
    fn retrieve(&self, id: &str, mode: OpenMode) -> ResourceResult<(Box<dyn ResourceHandle>, Metadata)>;

    /// A lazy stream over the selected ids.
    fn retrieve_stream(&self, selector: &[String], mode: OpenMode) -> ResourceResult<ResourceStream>;

    /// First-level ids, one per archived resource.
    fn list(&self) -> ResourceResult<Vec<String>>;

    /// Every leaf path in the backend, optionally filtered.
    fn list_files(&self, filter: Option<&dyn Fn(&str) -> bool>) -> ResourceResult<Vec<String>>;
}

/// Walk `stream` depth-first and call `visit` with the path segments of
/// every leaf. Subtrees are descended in stream order.
pub fn walk_leaves(
    stream: ResourceStream,
    visit: &mut dyn FnMut(&[String], &dyn ResourceHandle, &Metadata) -> ResourceResult<u64>,
) -> ResourceResult<StoreSummary> {
    let mut summary = StoreSummary::default();
    let mut path = Vec::new();
    walk(stream, &mut path, visit, &mut summary)?;
    Ok(summary)
}

fn walk(
    stream: ResourceStream,
    path: &mut Vec<String>,
    visit: &mut dyn FnMut(&[String], &dyn ResourceHandle, &Metadata) -> ResourceResult<u64>,
    summary: &mut StoreSummary,
) -> ResourceResult<()> {
    for entry in stream {
        let entry = entry?;
        path.push(entry.id);
        match entry.payload {
            Payload::Leaf(handle) => {
                summary.bytes += visit(path, handle.as_ref(), &entry.metadata)?;
                summary.leaves += 1;
            }
            Payload::Subtree(children) => {
                summary.subtrees += 1;
                walk(children, path, visit, summary)?;
            }
        }
        path.pop();
    }
    Ok(())
}

/// Reject an empty selector.
pub(crate) fn require_selector(backend: &str, selector: &[String]) -> ResourceResult<()> {
    if selector.is_empty() {
        return Err(ResourceError::MissingSelector {
            backend: backend.to_string(),
        });
    }
    Ok(())
}

/// Validate a single path segment used as a resource id.
pub(crate) fn validate_segment(id: &str) -> ResourceResult<()> {
    let reason = if id.is_empty() {
        "empty id"
    } else if id == "." || id == ".." {
        "relative path component"
    } else if id.contains('/') || id.contains('\\') {
        "contains a path separator"
    } else {
        return Ok(());
    };
    Err(ResourceError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    })
}

/// Validate a `/`-joined relative path, one segment at a time.
pub(crate) fn validate_path(id: &str) -> ResourceResult<Vec<&str>> {
    let segments: Vec<&str> = id.split('/').collect();
    for segment in &segments {
        validate_segment(segment).map_err(|err| match err {
            ResourceError::InvalidId { reason, .. } => ResourceError::InvalidId {
                id: id.to_string(),
                reason,
            },
            other => other,
        })?;
    }
    Ok(segments)
}
