//! Normalizes WARC leaves to per-record gzip.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek};
use std::sync::Arc;

use flate2::bufread::MultiGzDecoder;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use wacli_types::{
    Catalog, Metadata, OpenMode, Payload, Report, ResourceEntry, ResourceError, ResourceHandle,
    ResourceResult, ResourceStream, ScopedReader, ScopedStream, GZIP_MEDIA_TYPE,
};

use crate::config::RecompressConfig;
use crate::error::OperationResult;
use crate::operation::Operation;
use crate::warc::write_per_record_gzip;

/// Rewrites every leaf as per-record gzip.
///
/// A leaf is recompressed when its output element is pulled. The result is
/// spooled to a temporary file which backs the emitted handle. Leaves that
/// fail are reported to the attached catalog (or logged) and left out of
/// the output; errors of the input stream itself are passed on.
#[derive(Clone)]
pub struct RecompressStage {
    config: RecompressConfig,
    catalog: Option<Arc<dyn Catalog>>,
}

impl RecompressStage {
    pub fn new(config: RecompressConfig) -> OperationResult<Self> {
        config.validate()?;
        Ok(Self { config, catalog: None })
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn spool(&self) -> std::io::Result<NamedTempFile> {
        match &self.config.spool_dir {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
    }

    /// Recompress one leaf into a spool file.
    fn recompress_leaf(
        &self,
        path: &str,
        source: &dyn ResourceHandle,
        metadata: &Metadata,
    ) -> ResourceResult<(SpoolHandle, Metadata)> {
        let compressed = is_compressed(path, metadata);
        let mut reader = BufReader::new(source.reader(OpenMode::ReadBinary)?);
        // An empty source stays empty, even when it claims to be gzip.
        let empty = reader
            .fill_buf()
            .map_err(|e| ResourceError::from_io(path, e))?
            .is_empty();
        let input: Box<dyn BufRead> = if compressed && !empty {
            Box::new(BufReader::new(MultiGzDecoder::new(reader)))
        } else {
            Box::new(reader)
        };

        let spool = self.spool()?;
        let mut out = BufWriter::new(spool.as_file());
        let records = write_per_record_gzip(path, input, &mut out, self.config.compression())?;
        drop(out);
        let mut file = spool.as_file();
        let size = file.stream_position()?;

        debug!(path, records, size, compressed, "recompressed leaf");
        let metadata = metadata
            .clone()
            .with_compression(GZIP_MEDIA_TYPE)
            .with_size(size);
        Ok((
            SpoolHandle {
                name: path.to_string(),
                spool: Arc::new(spool),
            },
            metadata,
        ))
    }

    fn report_failure(&self, path: &str, err: &ResourceError) {
        match &self.catalog {
            Some(catalog) => {
                warn!(path, error = %err, "recompression failed, leaf dropped and reported");
                if let Err(report_err) = catalog.report(path, &Report::from_error(err)) {
                    warn!(path, error = %report_err, "could not report recompression failure");
                }
            }
            None => warn!(path, error = %err, "recompression failed, leaf dropped"),
        }
    }
}

impl Operation for RecompressStage {
    fn name(&self) -> &str {
        "recompress"
    }

    fn run(&self, stream: ResourceStream) -> ResourceStream {
        ResourceStream::new(RecompressIter {
            stage: self.clone(),
            inner: stream,
            path: String::new(),
        })
    }
}

/// Compressed when the metadata says so, else when the id ends in `.gz`.
fn is_compressed(path: &str, metadata: &Metadata) -> bool {
    metadata.compression.is_some() || path.ends_with(".gz")
}

struct RecompressIter {
    stage: RecompressStage,
    inner: ResourceStream,
    path: String,
}

impl Iterator for RecompressIter {
    type Item = ResourceResult<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            let path = if self.path.is_empty() {
                entry.id.clone()
            } else {
                format!("{}/{}", self.path, entry.id)
            };
            match entry.payload {
                Payload::Subtree(children) => {
                    let children = ResourceStream::new(RecompressIter {
                        stage: self.stage.clone(),
                        inner: children,
                        path,
                    });
                    return Some(Ok(ResourceEntry::subtree(entry.id, children, entry.metadata)));
                }
                Payload::Leaf(handle) => {
                    match self.stage.recompress_leaf(&path, handle.as_ref(), &entry.metadata) {
                        Ok((spooled, metadata)) => {
                            return Some(Ok(ResourceEntry::leaf(entry.id, spooled, metadata)))
                        }
                        Err(err) => self.stage.report_failure(&path, &err),
                    }
                }
            }
        }
    }
}

/// Read-only handle over a spooled result. The spool file is removed when
/// the last handle is dropped.
struct SpoolHandle {
    name: String,
    spool: Arc<NamedTempFile>,
}

impl ResourceHandle for SpoolHandle {
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        if mode.is_write() {
            return Err(ResourceError::ReadOnly(self.name.clone()));
        }
        let file = File::open(self.spool.path()).map_err(|e| ResourceError::from_io(&self.name, e))?;
        Ok(ScopedStream::Reader(ScopedReader::new(
            self.name.clone(),
            mode.kind(),
            Box::new(BufReader::new(file)),
        )))
    }
}
