use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Media type written into [`Metadata::compression`] for gzip containers.
pub const GZIP_MEDIA_TYPE: &str = "application/gzip";

/// One progress notification, fired once per copied chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Name of the resource being transferred (its id or path).
    pub name: String,
    /// Bytes transferred since the previous notification.
    pub advance: u64,
    /// Total size of the resource, if known.
    pub total: Option<u64>,
}

/// A progress callback attached to a resource's metadata.
///
/// Callbacks run synchronously inside the copy loop and should be cheap.
#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(&Progress) + Send + Sync>);

impl ProgressCallback {
    pub fn new(f: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, progress: &Progress) {
        (self.0)(progress)
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressCallback(..)")
    }
}

/// Metadata travelling with every element of a resource stream.
///
/// The recognized keys are typed fields; anything else lives in
/// `extensions` and must be carried along by stages that do not understand it.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Media type of the content.
    pub content_type: Option<String>,
    /// Media type of the compression container, if the content is compressed.
    pub compression: Option<String>,
    /// Progress callback fired while the resource is copied.
    pub progress: Option<ProgressCallback>,
    /// Keys without a dedicated field.
    pub extensions: BTreeMap<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// Whether no key at all is set.
    pub fn is_empty(&self) -> bool {
        self.size.is_none()
            && self.content_type.is_none()
            && self.compression.is_none()
            && self.progress.is_none()
            && self.extensions.is_empty()
    }

    /// Overlay `other` on top of `self`: fields set in `other` win, extension
    /// keys are merged.
    pub fn merged_with(mut self, other: Metadata) -> Self {
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.content_type.is_some() {
            self.content_type = other.content_type;
        }
        if other.compression.is_some() {
            self.compression = other.compression;
        }
        if other.progress.is_some() {
            self.progress = other.progress;
        }
        self.extensions.extend(other.extensions);
        self
    }

    /// Names of all keys that are set, for logging.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if self.size.is_some() {
            keys.push("size".to_string());
        }
        if self.content_type.is_some() {
            keys.push("content_type".to_string());
        }
        if self.compression.is_some() {
            keys.push("compression".to_string());
        }
        if self.progress.is_some() {
            keys.push("progress".to_string());
        }
        keys.extend(self.extensions.keys().cloned());
        keys
    }
}
