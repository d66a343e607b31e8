//! Transform stages for wacli resource streams.
//!
//! An [`Operation`] maps a lazy stream to a lazy stream; a [`Pipeline`]
//! chains operations in order.
//!
//! # Stages
//!
//! - [`DebugStage`]: logs ids and shape without opening leaves
//! - [`RecompressStage`]: rewrites WARC leaves as per-record gzip

pub mod config;
pub mod error;
pub mod operation;
pub mod pipeline;
pub mod stages;
pub mod warc;

pub use config::{DebugConfig, RecompressConfig};
pub use error::{OperationError, OperationResult};
pub use operation::Operation;
pub use pipeline::Pipeline;
pub use stages::{DebugStage, RecompressStage};
