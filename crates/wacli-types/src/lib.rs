//! Resource stream model for wacli.
//!
//! Every other wacli crate depends on `wacli-types`. It defines the lazy,
//! tree-shaped stream of named resources that flows from storage readers
//! through transform stages into storage writers.
//!
//! # Key Types
//!
//! - [`OpenMode`] / [`StreamKind`] — the four open modes and their declared kind
//! - [`ResourceHandle`] — deferred opener producing a [`ScopedStream`]
//! - [`ResourceStream`] — lazy sequence of [`ResourceEntry`] values
//! - [`Payload`] — `Leaf(handle)` or `Subtree(stream)`
//! - [`Metadata`] — typed metadata with an extension map
//! - [`Catalog`] — id source and failure sink
//! - [`ResourceError`] — error taxonomy shared by all crates

pub mod catalog;
pub mod copy;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod mode;
pub mod stream;

pub use catalog::{Annotation, Catalog, InMemoryCatalog, Report};
pub use copy::{copy_resource, copy_stream, read_all, read_to_string, CopyProgress, Transcode, COPY_BUFFER_SIZE};
pub use error::{ResourceError, ResourceResult};
pub use handle::{
    FileHandle, FlushOnFinish, FnHandle, MemoryHandle, ResourceHandle, ResourceSink, ScopedReader,
    ScopedStream, ScopedWriter,
};
pub use metadata::{Metadata, Progress, ProgressCallback, GZIP_MEDIA_TYPE};
pub use mode::{OpenMode, StreamKind};
pub use stream::{Payload, ResourceEntry, ResourceStream, TreeShape};
