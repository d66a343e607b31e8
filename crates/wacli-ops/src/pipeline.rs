use std::sync::Arc;

use tracing::debug;
use wacli_types::ResourceStream;

use crate::operation::Operation;

/// An ordered chain of operations.
#[derive(Clone, Default)]
pub struct Pipeline {
    operations: Vec<Arc<dyn Operation>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to the end of the chain.
    pub fn push(&mut self, operation: Arc<dyn Operation>) {
        self.operations.push(operation);
    }

    pub fn with(mut self, operation: Arc<dyn Operation>) -> Self {
        self.push(operation);
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Thread `stream` through every operation in order.
    pub fn run(&self, stream: ResourceStream) -> ResourceStream {
        self.operations.iter().fold(stream, |stream, op| {
            debug!(operation = op.name(), "chaining operation");
            op.run(stream)
        })
    }
}

impl FromIterator<Arc<dyn Operation>> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Operation>>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}
