use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use wacli_types::{ResourceError, ResourceResult, ResourceSink};

/// The object-store operations the S3 backend relies on.
///
/// Keys are flat strings; any hierarchy is encoded with `/` by the caller.
pub trait ObjectBucket: Send + Sync {
    /// Bucket name, for logs and errors.
    fn name(&self) -> &str;

    fn exists(&self) -> ResourceResult<bool>;

    /// Create the bucket. Callers check [`exists`](Self::exists) first.
    fn create(&self) -> ResourceResult<()>;

    /// Size of the object at `key`, or `None` when there is no such object.
    fn head(&self, key: &str) -> ResourceResult<Option<u64>>;

    /// Stream the object at `key`. A missing key is `NotFound`.
    fn get(&self, key: &str) -> ResourceResult<Box<dyn Read + Send>>;

    /// Start an upload to `key`; the object appears when the sink is finished.
    fn put(&self, key: &str) -> ResourceResult<Box<dyn ResourceSink>>;

    /// All keys starting with `prefix`, sorted.
    fn list_keys(&self, prefix: &str) -> ResourceResult<Vec<String>>;
}

type Objects = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// In-memory bucket for tests and embedding.
///
/// Starts out absent unless built with [`InMemoryBucket::existing`]; uploads
/// to an absent bucket fail like they would against a real service.
#[derive(Debug)]
pub struct InMemoryBucket {
    name: String,
    created: AtomicBool,
    create_calls: AtomicUsize,
    objects: Objects,
}

fn poisoned<E: std::fmt::Display>(e: E) -> ResourceError {
    ResourceError::Io(io::Error::other(format!("lock poisoned: {e}")))
}

impl InMemoryBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            objects: Arc::default(),
        }
    }

    /// A bucket that already exists.
    pub fn existing(name: impl Into<String>) -> Self {
        let bucket = Self::new(name);
        bucket.created.store(true, Ordering::SeqCst);
        bucket
    }

    /// Insert an object directly.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> ResourceResult<()> {
        self.objects.write().map_err(poisoned)?.insert(key.into(), data.into());
        Ok(())
    }

    /// Contents of the object at `key`.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().ok().and_then(|o| o.get(key).cloned())
    }

    /// How many times `create` was called.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

struct MemoryUpload {
    key: String,
    buffer: Vec<u8>,
    objects: Objects,
}

impl Write for MemoryUpload {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResourceSink for MemoryUpload {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let this = *self;
        this.objects
            .write()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))?
            .insert(this.key, this.buffer);
        Ok(())
    }
}

impl ObjectBucket for InMemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> ResourceResult<bool> {
        Ok(self.created.load(Ordering::SeqCst))
    }

    fn create(&self) -> ResourceResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.created.swap(true, Ordering::SeqCst) {
            return Err(ResourceError::Transport(format!(
                "bucket {} already exists",
                self.name
            )));
        }
        Ok(())
    }

    fn head(&self, key: &str) -> ResourceResult<Option<u64>> {
        Ok(self
            .objects
            .read()
            .map_err(poisoned)?
            .get(key)
            .map(|data| data.len() as u64))
    }

    fn get(&self, key: &str) -> ResourceResult<Box<dyn Read + Send>> {
        let data = self
            .objects
            .read()
            .map_err(poisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn put(&self, key: &str) -> ResourceResult<Box<dyn ResourceSink>> {
        if !self.created.load(Ordering::SeqCst) {
            return Err(ResourceError::Transport(format!("no such bucket: {}", self.name)));
        }
        Ok(Box::new(MemoryUpload {
            key: key.to_string(),
            buffer: Vec::new(),
            objects: self.objects.clone(),
        }))
    }

    fn list_keys(&self, prefix: &str) -> ResourceResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .map_err(poisoned)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
