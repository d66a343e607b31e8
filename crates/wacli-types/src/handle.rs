//! Resource handles and the scoped streams they open.
//!
//! A [`ResourceHandle`] is a deferred opener: holding one costs nothing, and
//! every call to [`ResourceHandle::open`] produces an independent, freshly
//! positioned [`ScopedStream`]. Streams release their underlying resource when
//! dropped; writers additionally expose [`ScopedWriter::finish`] so that
//! flush/commit failures are reported instead of swallowed by `Drop`.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{ResourceError, ResourceResult};
use crate::mode::{OpenMode, StreamKind};

// ---------------------------------------------------------------------------
// ResourceSink
// ---------------------------------------------------------------------------

/// Write side of a scoped stream.
///
/// `finish` completes the transfer (flush, commit an upload, ...). A sink
/// dropped without `finish` leaves its destination in whatever state the
/// partial writes produced.
pub trait ResourceSink: Write + Send {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Adapts any `Write` into a [`ResourceSink`] whose `finish` is a flush.
pub struct FlushOnFinish<W: Write + Send>(pub W);

impl<W: Write + Send> Write for FlushOnFinish<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Send> ResourceSink for FlushOnFinish<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

// ---------------------------------------------------------------------------
// Scoped streams
// ---------------------------------------------------------------------------

/// Read side of an opened resource.
pub struct ScopedReader {
    name: String,
    kind: StreamKind,
    inner: Box<dyn Read + Send>,
}

impl ScopedReader {
    pub fn new(name: impl Into<String>, kind: StreamKind, inner: Box<dyn Read + Send>) -> Self {
        Self {
            name: name.into(),
            kind,
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Read for ScopedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for ScopedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedReader")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Write side of an opened resource.
pub struct ScopedWriter {
    name: String,
    kind: StreamKind,
    inner: Box<dyn ResourceSink>,
}

impl ScopedWriter {
    pub fn new(name: impl Into<String>, kind: StreamKind, inner: Box<dyn ResourceSink>) -> Self {
        Self {
            name: name.into(),
            kind,
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Complete the write and release the destination.
    pub fn finish(self) -> ResourceResult<()> {
        self.inner.finish()?;
        Ok(())
    }
}

impl Write for ScopedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl fmt::Debug for ScopedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedWriter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A stream produced by [`ResourceHandle::open`].
#[derive(Debug)]
pub enum ScopedStream {
    Reader(ScopedReader),
    Writer(ScopedWriter),
}

impl ScopedStream {
    pub fn kind(&self) -> StreamKind {
        match self {
            Self::Reader(r) => r.kind(),
            Self::Writer(w) => w.kind(),
        }
    }

    pub fn into_reader(self) -> ResourceResult<ScopedReader> {
        match self {
            Self::Reader(r) => Ok(r),
            Self::Writer(w) => Err(ResourceError::WrongDirection(w.name)),
        }
    }

    pub fn into_writer(self) -> ResourceResult<ScopedWriter> {
        match self {
            Self::Writer(w) => Ok(w),
            Self::Reader(r) => Err(ResourceError::WrongDirection(r.name)),
        }
    }
}

// ---------------------------------------------------------------------------
// ResourceHandle trait
// ---------------------------------------------------------------------------

/// Capability to open one physical resource.
pub trait ResourceHandle: Send + Sync {
    /// Open a fresh stream in the given mode.
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream>;

    /// The kind the resource is natively read as. Storage backends open a
    /// source in the read mode of this kind.
    fn kind(&self) -> StreamKind {
        StreamKind::Binary
    }

    /// Convenience: open for reading.
    fn reader(&self, mode: OpenMode) -> ResourceResult<ScopedReader> {
        self.open(mode.as_read())?.into_reader()
    }

    /// Convenience: open for writing.
    fn writer(&self, mode: OpenMode) -> ResourceResult<ScopedWriter> {
        self.open(mode.as_write())?.into_writer()
    }
}

impl<H: ResourceHandle + ?Sized> ResourceHandle for Arc<H> {
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        (**self).open(mode)
    }

    fn kind(&self) -> StreamKind {
        (**self).kind()
    }
}

impl<H: ResourceHandle + ?Sized> ResourceHandle for Box<H> {
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        (**self).open(mode)
    }

    fn kind(&self) -> StreamKind {
        (**self).kind()
    }
}

// ---------------------------------------------------------------------------
// FileHandle
// ---------------------------------------------------------------------------

/// Handle for a file on the local filesystem.
///
/// Opening for write creates missing parent directories.
#[derive(Clone, Debug)]
pub struct FileHandle {
    name: String,
    path: PathBuf,
    kind: StreamKind,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: StreamKind::Binary,
        }
    }

    pub fn with_kind(mut self, kind: StreamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResourceHandle for FileHandle {
    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        if mode.is_read() {
            let file = File::open(&self.path).map_err(|e| ResourceError::from_io(&self.name, e))?;
            Ok(ScopedStream::Reader(ScopedReader::new(
                self.name.clone(),
                mode.kind(),
                Box::new(BufReader::new(file)),
            )))
        } else {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(&self.path)?;
            Ok(ScopedStream::Writer(ScopedWriter::new(
                self.name.clone(),
                mode.kind(),
                Box::new(FlushOnFinish(BufWriter::new(file))),
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryHandle
// ---------------------------------------------------------------------------

/// Handle over an in-memory buffer.
///
/// Reads see a snapshot of the buffer; a write replaces the buffer when the
/// writer is finished. Clones share the same buffer.
#[derive(Clone, Debug)]
pub struct MemoryHandle {
    name: String,
    data: Arc<RwLock<Vec<u8>>>,
    kind: StreamKind,
}

impl MemoryHandle {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(RwLock::new(data.into())),
            kind: StreamKind::Binary,
        }
    }

    /// A buffer holding text; it is natively read in text mode.
    pub fn text(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, text.as_bytes().to_vec()).with_kind(StreamKind::Text)
    }

    pub fn with_kind(mut self, kind: StreamKind) -> Self {
        self.kind = kind;
        self
    }

    /// An empty buffer, typically used as a write target.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Current contents of the buffer.
    pub fn contents(&self) -> Vec<u8> {
        self.data.read().map(|d| d.clone()).unwrap_or_default()
    }
}

struct MemorySink {
    buffer: Vec<u8>,
    target: Arc<RwLock<Vec<u8>>>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResourceSink for MemorySink {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut target = self
            .target
            .write()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))?;
        *target = self.buffer;
        Ok(())
    }
}

impl ResourceHandle for MemoryHandle {
    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        if mode.is_read() {
            Ok(ScopedStream::Reader(ScopedReader::new(
                self.name.clone(),
                mode.kind(),
                Box::new(Cursor::new(self.contents())),
            )))
        } else {
            Ok(ScopedStream::Writer(ScopedWriter::new(
                self.name.clone(),
                mode.kind(),
                Box::new(MemorySink {
                    buffer: Vec::new(),
                    target: self.data.clone(),
                }),
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// FnHandle
// ---------------------------------------------------------------------------

/// Handle backed by a closure that opens the stream on demand.
pub struct FnHandle<F> {
    open: F,
    kind: StreamKind,
}

impl<F> FnHandle<F>
where
    F: Fn(OpenMode) -> ResourceResult<ScopedStream> + Send + Sync,
{
    pub fn new(open: F) -> Self {
        Self {
            open,
            kind: StreamKind::Binary,
        }
    }

    pub fn with_kind(mut self, kind: StreamKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> ResourceHandle for FnHandle<F>
where
    F: Fn(OpenMode) -> ResourceResult<ScopedStream> + Send + Sync,
{
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        (self.open)(mode)
    }

    fn kind(&self) -> StreamKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_handle_reads_are_independent() {
        let handle = MemoryHandle::new("m", b"hello".to_vec());
        let mut first = handle.reader(OpenMode::ReadBinary).unwrap();
        let mut buf = [0u8; 2];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"he");

        let mut second = String::new();
        handle
            .reader(OpenMode::ReadText)
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert_eq!(second, "hello");
    }

    #[test]
    fn memory_handle_write_replaces_on_finish() {
        let handle = MemoryHandle::new("m", b"old".to_vec());
        let mut writer = handle.writer(OpenMode::WriteBinary).unwrap();
        writer.write_all(b"new content").unwrap();
        assert_eq!(handle.contents(), b"old");
        writer.finish().unwrap();
        assert_eq!(handle.contents(), b"new content");
    }

    #[test]
    fn wrong_direction_is_an_error() {
        let handle = MemoryHandle::empty("m");
        let stream = handle.open(OpenMode::ReadBinary).unwrap();
        assert!(matches!(
            stream.into_writer(),
            Err(ResourceError::WrongDirection(ref n)) if n == "m"
        ));
    }

    #[test]
    fn file_handle_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("c.txt");
        let handle = FileHandle::new("c.txt", &path);

        let mut writer = handle.writer(OpenMode::WriteText).unwrap();
        writer.write_all("Hallo".as_bytes()).unwrap();
        writer.finish().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "Hallo");
    }

    #[test]
    fn file_handle_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handle = FileHandle::new("missing", dir.path().join("missing"));
        let err = handle.open(OpenMode::ReadBinary).unwrap_err();
        assert!(matches!(err, ResourceError::NotFound(ref id) if id == "missing"));
    }

    #[test]
    fn fn_handle_opens_lazily() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = FnHandle::new(move |mode: OpenMode| {
            counter.fetch_add(1, Ordering::SeqCst);
            MemoryHandle::new("f", b"x".to_vec()).open(mode)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        handle.open(OpenMode::ReadBinary).unwrap();
        handle.open(OpenMode::ReadBinary).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
