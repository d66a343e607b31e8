//! S3 storage backend.
//!
//! Stream positions map to flat object keys by joining path segments with
//! `/`. A key that names an object is a leaf; a key with objects below
//! `key/` is a subtree.

mod aws;
mod bucket;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use wacli_types::{
    copy_resource, Catalog, CopyProgress, Metadata, OpenMode, Report, ResourceEntry, ResourceError,
    ResourceHandle, ResourceResult, ResourceStream, ScopedReader, ScopedStream, ScopedWriter, StreamKind,
};

use crate::traits::{require_selector, walk_leaves, StorageBackend, StoreSummary};

pub use aws::{AwsBucket, MultipartWriter, PART_SIZE};
pub use bucket::{InMemoryBucket, ObjectBucket};

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Connection settings for [`AwsBucket`].
#[derive(Clone, Debug, Deserialize)]
pub struct S3Settings {
    pub bucket_name: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub credentials: Option<S3Credentials>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl S3Settings {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            endpoint_url: None,
            region: default_region(),
            credentials: None,
        }
    }

    /// Reject settings that cannot address a bucket.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket_name.trim().is_empty() {
            return Err("bucket_name must not be empty".to_string());
        }
        if self.region.trim().is_empty() {
            return Err("region must not be empty".to_string());
        }
        Ok(())
    }
}

/// Storage backend over an [`ObjectBucket`].
pub struct S3Storage {
    bucket: Arc<dyn ObjectBucket>,
    catalog: Option<Arc<dyn Catalog>>,
    bucket_ready: AtomicBool,
}

impl S3Storage {
    pub fn new(bucket: Arc<dyn ObjectBucket>) -> Self {
        Self {
            bucket,
            catalog: None,
            bucket_ready: AtomicBool::new(false),
        }
    }

    /// Connect to S3 with the AWS SDK.
    pub fn connect(settings: &S3Settings) -> ResourceResult<Self> {
        Ok(Self::new(Arc::new(AwsBucket::connect(settings)?)))
    }

    /// Report per-leaf encoding failures in `store_stream` to `catalog`
    /// instead of aborting.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn bucket(&self) -> &Arc<dyn ObjectBucket> {
        &self.bucket
    }

    fn ensure_bucket(&self) -> ResourceResult<()> {
        if self.bucket_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.bucket.exists()? {
            self.bucket.create()?;
        }
        self.bucket_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn handle(&self, key: &str, kind: StreamKind) -> S3Handle {
        S3Handle {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            kind,
        }
    }
}

impl StorageBackend for S3Storage {
    fn name(&self) -> &str {
        "S3Storage"
    }

    fn store(&self, id: &str, source: &dyn ResourceHandle, metadata: &Metadata) -> ResourceResult<u64> {
        self.ensure_bucket()?;
        let target = self.handle(id, StreamKind::Binary);
        let written = copy_resource(
            source,
            OpenMode::read(source.kind()),
            &target,
            OpenMode::WriteBinary,
            &CopyProgress::from_metadata(id, metadata),
        )?;
        debug!(bucket = self.bucket.name(), key = id, bytes = written, "uploaded object");
        Ok(written)
    }

    fn store_stream(&self, stream: ResourceStream) -> ResourceResult<StoreSummary> {
        let mut reported = 0;
        let mut summary = walk_leaves(stream, &mut |path, handle, metadata| {
            let key = path.join("/");
            match (self.store(&key, handle, metadata), &self.catalog) {
                (Err(err @ ResourceError::Encoding { .. }), Some(catalog)) => {
                    warn!(key = %key, error = %err, "upload failed, reported to catalog");
                    catalog.report(&key, &Report::from_error(&err))?;
                    reported += 1;
                    Ok(0)
                }
                (result, _) => result,
            }
        })?;
        summary.leaves -= reported;
        summary.reported = reported;
        info!(
            bucket = self.bucket.name(),
            leaves = summary.leaves,
            reported = summary.reported,
            "stored stream"
        );
        Ok(summary)
    }

    fn retrieve(&self, id: &str, mode: OpenMode) -> ResourceResult<(Box<dyn ResourceHandle>, Metadata)> {
        if mode.is_write() {
            return Ok((Box::new(self.handle(id, mode.kind())), Metadata::new()));
        }
        match self.bucket.head(id)? {
            Some(size) => Ok((
                Box::new(self.handle(id, mode.kind())),
                Metadata::new().with_size(size),
            )),
            None if !self.bucket.list_keys(&format!("{id}/"))?.is_empty() => {
                Err(ResourceError::NotALeaf(id.to_string()))
            }
            None => Err(ResourceError::NotFound(id.to_string())),
        }
    }

    fn retrieve_stream(&self, selector: &[String], mode: OpenMode) -> ResourceResult<ResourceStream> {
        require_selector(self.name(), selector)?;
        Ok(key_stream(self.bucket.clone(), String::new(), selector.to_vec(), mode))
    }

    fn list(&self) -> ResourceResult<Vec<String>> {
        Err(ResourceError::unsupported(self.name(), "list"))
    }

    fn list_files(&self, filter: Option<&dyn Fn(&str) -> bool>) -> ResourceResult<Vec<String>> {
        let mut keys = self.bucket.list_keys("")?;
        if let Some(keep) = filter {
            keys.retain(|k| keep(k));
        }
        Ok(keys)
    }
}

fn key_stream(bucket: Arc<dyn ObjectBucket>, prefix: String, ids: Vec<String>, mode: OpenMode) -> ResourceStream {
    ResourceStream::new(
        ids.into_iter()
            .map(move |id| resolve_key(&bucket, &prefix, id, mode)),
    )
}

fn resolve_key(
    bucket: &Arc<dyn ObjectBucket>,
    prefix: &str,
    id: String,
    mode: OpenMode,
) -> ResourceResult<ResourceEntry> {
    let key = if prefix.is_empty() {
        id.clone()
    } else {
        format!("{prefix}/{id}")
    };
    let handle = |key: String| S3Handle {
        bucket: bucket.clone(),
        key,
        kind: mode.kind(),
    };

    if let Some(size) = bucket.head(&key)? {
        return Ok(ResourceEntry::leaf(id, handle(key), Metadata::new().with_size(size)));
    }

    let children = child_segments(&key, &bucket.list_keys(&format!("{key}/"))?);
    if !children.is_empty() {
        let stream = key_stream(bucket.clone(), key, children, mode);
        return Ok(ResourceEntry::subtree(id, stream, Metadata::new()));
    }
    if mode.is_write() {
        return Ok(ResourceEntry::leaf(id, handle(key), Metadata::new()));
    }
    Err(ResourceError::NotFound(key))
}

/// Distinct next path segments of `keys` below `parent/`, sorted.
fn child_segments(parent: &str, keys: &[String]) -> Vec<String> {
    let below = format!("{parent}/");
    keys.iter()
        .filter_map(|k| k.strip_prefix(&below))
        .filter_map(|rest| rest.split('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Handle on one object key.
pub struct S3Handle {
    bucket: Arc<dyn ObjectBucket>,
    key: String,
    kind: StreamKind,
}

impl ResourceHandle for S3Handle {
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        if mode.is_read() {
            Ok(ScopedStream::Reader(ScopedReader::new(
                self.key.clone(),
                mode.kind(),
                self.bucket.get(&self.key)?,
            )))
        } else {
            Ok(ScopedStream::Writer(ScopedWriter::new(
                self.key.clone(),
                mode.kind(),
                self.bucket.put(&self.key)?,
            )))
        }
    }

    fn kind(&self) -> StreamKind {
        self.kind
    }
}
