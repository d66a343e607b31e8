use wacli_types::ResourceStream;

/// A transform stage over resource streams.
///
/// `run` returns immediately with a lazy stream; work for an element happens
/// when the consumer pulls it. Ids and tree shape are preserved except where
/// a stage documents that it drops failing leaves.
///
/// The trait is object-safe and `Send + Sync` so stages can be shared as
/// `Arc<dyn Operation>`.
pub trait Operation: Send + Sync {
    /// Human-readable name of this stage (e.g., "debug", "recompress").
    fn name(&self) -> &str;

    fn run(&self, stream: ResourceStream) -> ResourceStream;
}
