//! The resource stream: a lazy, ordered tree of named resources.
//!
//! Every element is a [`ResourceEntry`] whose payload is either a leaf
//! ([`Payload::Leaf`], an openable [`ResourceHandle`]) or a nested
//! [`ResourceStream`] ([`Payload::Subtree`]). Nothing is opened or fetched
//! until a consumer pulls an element and opens its handle.

use std::fmt;

use crate::error::ResourceResult;
use crate::handle::ResourceHandle;
use crate::metadata::Metadata;

/// Payload of a stream element.
pub enum Payload {
    Leaf(Box<dyn ResourceHandle>),
    Subtree(ResourceStream),
}

impl Payload {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(_) => f.write_str("Leaf"),
            Self::Subtree(_) => f.write_str("Subtree"),
        }
    }
}

/// One `(id, payload, metadata)` element of a resource stream.
#[derive(Debug)]
pub struct ResourceEntry {
    /// Unique within its level only.
    pub id: String,
    pub payload: Payload,
    pub metadata: Metadata,
}

impl ResourceEntry {
    pub fn leaf(id: impl Into<String>, handle: impl ResourceHandle + 'static, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Leaf(Box::new(handle)),
            metadata,
        }
    }

    pub fn subtree(id: impl Into<String>, stream: ResourceStream, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Subtree(stream),
            metadata,
        }
    }
}

type EntryIter = Box<dyn Iterator<Item = ResourceResult<ResourceEntry>> + Send>;

/// A lazily evaluated sequence of [`ResourceEntry`] values.
///
/// Errors are yielded in-band so that a consumer can decide whether a failing
/// element aborts the walk.
pub struct ResourceStream {
    inner: EntryIter,
}

impl ResourceStream {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = ResourceResult<ResourceEntry>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// A stream over already constructed entries. The entries' handles are
    /// still only opened on demand.
    pub fn from_entries(entries: Vec<ResourceEntry>) -> Self {
        Self::new(entries.into_iter().map(Ok))
    }

    /// Defer building the stream until its first element is pulled.
    pub fn lazy<F>(build: F) -> Self
    where
        F: FnOnce() -> ResourceResult<ResourceStream> + Send + 'static,
    {
        Self::new(LazyStream::Pending(Some(build)))
    }

    /// Consume the stream into its tree shape without opening any leaf.
    pub fn shape(self) -> ResourceResult<Vec<TreeShape>> {
        let mut shape = Vec::new();
        for entry in self {
            let entry = entry?;
            shape.push(match entry.payload {
                Payload::Leaf(_) => TreeShape::Leaf(entry.id),
                Payload::Subtree(stream) => TreeShape::Subtree(entry.id, stream.shape()?),
            });
        }
        Ok(shape)
    }
}

impl Iterator for ResourceStream {
    type Item = ResourceResult<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for ResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResourceStream(..)")
    }
}

enum LazyStream<F> {
    Pending(Option<F>),
    Ready(ResourceStream),
    Done,
}

impl<F> Iterator for LazyStream<F>
where
    F: FnOnce() -> ResourceResult<ResourceStream>,
{
    type Item = ResourceResult<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self {
                Self::Pending(build) => {
                    let build = build.take()?;
                    match build() {
                        Ok(stream) => *self = Self::Ready(stream),
                        Err(e) => {
                            *self = Self::Done;
                            return Some(Err(e));
                        }
                    }
                }
                Self::Ready(stream) => return stream.next(),
                Self::Done => return None,
            }
        }
    }
}

/// Structural view of a stream: which ids are leaves and which are subtrees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeShape {
    Leaf(String),
    Subtree(String, Vec<TreeShape>),
}
