//! Storage backends for wacli resource streams.
//!
//! A [`StorageBackend`] turns an explicit id selector into a lazy
//! [`ResourceStream`](wacli_types::ResourceStream) and persists streams it is
//! given, preserving their tree shape.
//!
//! # Backends
//!
//! - [`DirectoryStorage`]: a local directory tree; directories are subtrees
//! - [`FileStorage`]: a single file seen as a one-id store
//! - [`S3Storage`]: flat object keys in an S3 bucket
//! - [`ArchiveStorage`]: a read-only remote archive described by manifests

pub mod archive;
pub mod directory;
pub mod file;
pub mod s3;
pub mod traits;

pub use archive::{ArchiveHandle, ArchiveSettings, ArchiveStorage, ArchiveTransport, HttpTransport, ManifestEntry};
pub use directory::DirectoryStorage;
pub use file::FileStorage;
pub use s3::{AwsBucket, InMemoryBucket, ObjectBucket, S3Credentials, S3Handle, S3Settings, S3Storage};
pub use traits::{walk_leaves, StorageBackend, StoreSummary};
