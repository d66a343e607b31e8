use tracing::{debug, error, info, trace, warn, Level};

use wacli_types::{Payload, ResourceEntry, ResourceResult, ResourceStream};

use crate::config::DebugConfig;
use crate::error::OperationResult;
use crate::operation::Operation;

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == Level::TRACE {
            trace!($($arg)+)
        } else if level == Level::DEBUG {
            debug!($($arg)+)
        } else if level == Level::INFO {
            info!($($arg)+)
        } else if level == Level::WARN {
            warn!($($arg)+)
        } else {
            error!($($arg)+)
        }
    }};
}

/// Pass-through stage that logs the structure of a stream.
///
/// Leaves are never opened: only ids, payload shape and metadata keys are
/// reported.
#[derive(Clone, Debug)]
pub struct DebugStage {
    prefix: String,
    level: Level,
}

impl DebugStage {
    pub fn new(config: &DebugConfig) -> OperationResult<Self> {
        Ok(Self {
            prefix: config.prefix.clone(),
            level: config.level()?,
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for DebugStage {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            level: Level::DEBUG,
        }
    }
}

impl Operation for DebugStage {
    fn name(&self) -> &str {
        "debug"
    }

    fn run(&self, stream: ResourceStream) -> ResourceStream {
        ResourceStream::new(DebugIter {
            stage: self.clone(),
            inner: stream,
            path: String::new(),
            started: false,
            finished: false,
        })
    }
}

struct DebugIter {
    stage: DebugStage,
    inner: ResourceStream,
    path: String,
    started: bool,
    finished: bool,
}

impl DebugIter {
    fn observe(&self, entry: ResourceEntry) -> ResourceEntry {
        let prefix = &self.stage.prefix;
        let path = if self.path.is_empty() {
            entry.id.clone()
        } else {
            format!("{}/{}", self.path, entry.id)
        };
        let keys = entry.metadata.keys().join(",");
        match entry.payload {
            Payload::Leaf(handle) => {
                log_at!(self.stage.level, "{prefix}leaf {path} [{keys}]");
                ResourceEntry {
                    payload: Payload::Leaf(handle),
                    ..entry
                }
            }
            Payload::Subtree(children) => {
                log_at!(self.stage.level, "{prefix}descend {path} [{keys}]");
                let children = ResourceStream::new(DebugIter {
                    stage: self.stage.clone(),
                    inner: children,
                    path,
                    started: false,
                    finished: false,
                });
                ResourceEntry {
                    payload: Payload::Subtree(children),
                    ..entry
                }
            }
        }
    }
}

impl Iterator for DebugIter {
    type Item = ResourceResult<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let prefix = &self.stage.prefix;
        let level_name = if self.path.is_empty() { "<root>" } else { self.path.as_str() };
        if !self.started {
            self.started = true;
            log_at!(self.stage.level, "{prefix}start of stream {level_name}");
        }
        match self.inner.next() {
            Some(Ok(entry)) => Some(Ok(self.observe(entry))),
            Some(Err(err)) => {
                log_at!(self.stage.level, "{prefix}error in stream {level_name}: {err}");
                Some(Err(err))
            }
            None => {
                if !self.finished {
                    self.finished = true;
                    log_at!(self.stage.level, "{prefix}end of stream {level_name}");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wacli_types::{read_all, FnHandle, MemoryHandle, Metadata, OpenMode, ResourceHandle, TreeShape};

    fn counting_leaf(id: &str, opens: Arc<AtomicUsize>) -> ResourceEntry {
        let data = id.as_bytes().to_vec();
        ResourceEntry::leaf(
            id,
            FnHandle::new(move |mode| {
                opens.fetch_add(1, Ordering::SeqCst);
                MemoryHandle::new("leaf", data.clone()).open(mode)
            }),
            Metadata::new().with_size(1).with_extension("source", "test"),
        )
    }

    fn sample(opens: &Arc<AtomicUsize>) -> ResourceStream {
        ResourceStream::from_entries(vec![
            counting_leaf("a", opens.clone()),
            ResourceEntry::subtree(
                "dir",
                ResourceStream::from_entries(vec![counting_leaf("b", opens.clone())]),
                Metadata::new(),
            ),
        ])
    }

    #[test]
    fn never_opens_leaves() {
        let opens = Arc::new(AtomicUsize::new(0));
        let shape = DebugStage::default().run(sample(&opens)).shape().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(
            shape,
            vec![
                TreeShape::Leaf("a".into()),
                TreeShape::Subtree("dir".into(), vec![TreeShape::Leaf("b".into())]),
            ]
        );
    }

    #[test]
    fn passes_handles_and_metadata_through() {
        let opens = Arc::new(AtomicUsize::new(0));
        let config = DebugConfig {
            prefix: "[dbg] ".into(),
            log_level: "info".into(),
        };
        let stage = DebugStage::new(&config).unwrap();
        assert_eq!(stage.level(), Level::INFO);

        let first = stage.run(sample(&opens)).next().unwrap().unwrap();
        assert_eq!(first.metadata.size, Some(1));
        assert_eq!(first.metadata.extension("source"), Some(&serde_json::json!("test")));
        let Payload::Leaf(handle) = first.payload else {
            panic!("expected a leaf");
        };
        assert_eq!(read_all(handle.as_ref(), OpenMode::ReadBinary).unwrap(), b"a");
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_errors_pass_through() {
        let stream = ResourceStream::new(std::iter::once(Err(wacli_types::ResourceError::NotFound(
            "gone".into(),
        ))));
        let mut out = DebugStage::default().run(stream);
        assert!(matches!(out.next(), Some(Err(_))));
        assert!(out.next().is_none());
    }
}
