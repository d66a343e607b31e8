//! Chunked copying between scoped streams.
//!
//! A copy uses a single [`COPY_BUFFER_SIZE`] buffer no matter how large the
//! resource is. The transcoding path is chosen once from the stream kinds
//! declared at open time and kept for the whole transfer.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};
use crate::handle::{ResourceHandle, ScopedReader, ScopedWriter};
use crate::metadata::{Metadata, Progress, ProgressCallback};
use crate::mode::{OpenMode, StreamKind};

/// Size of the copy buffer, and the granularity of progress callbacks.
pub const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// How bytes move from source to target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transcode {
    /// Same stream kind on both sides: bytes are written as read.
    Direct,
    /// Text on one side, bytes on the other: the text must be valid UTF-8
    /// and is written as its UTF-8 encoding.
    Utf8,
}

impl Transcode {
    pub fn between(source: StreamKind, target: StreamKind) -> Self {
        if source == target {
            Self::Direct
        } else {
            Self::Utf8
        }
    }
}

/// Progress reporting for one transfer.
#[derive(Clone, Debug, Default)]
pub struct CopyProgress {
    name: String,
    total: Option<u64>,
    callbacks: Vec<ProgressCallback>,
}

impl CopyProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: None,
            callbacks: Vec::new(),
        }
    }

    /// Take total size and callback from the source's metadata.
    pub fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> Self {
        let mut progress = Self::new(name);
        progress.total = metadata.size;
        progress.callbacks.extend(metadata.progress.clone());
        progress
    }

    pub fn with_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callbacks.extend(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn advance(&self, advance: u64) {
        if self.callbacks.is_empty() {
            return;
        }
        let progress = Progress {
            name: self.name.clone(),
            advance,
            total: self.total,
        };
        for callback in &self.callbacks {
            callback.call(&progress);
        }
    }
}

/// Incremental UTF-8 validation that tolerates sequences split across chunks.
#[derive(Debug, Default)]
struct Utf8Validator {
    pending: [u8; 4],
    len: usize,
}

impl Utf8Validator {
    fn feed(&mut self, mut chunk: &[u8]) -> Result<(), String> {
        while self.len > 0 {
            let Some((&byte, rest)) = chunk.split_first() else {
                return Ok(());
            };
            self.pending[self.len] = byte;
            self.len += 1;
            chunk = rest;
            match std::str::from_utf8(&self.pending[..self.len]) {
                Ok(_) => self.len = 0,
                Err(e) if e.error_len().is_some() => {
                    return Err(format!("invalid UTF-8 sequence {:?}", &self.pending[..self.len]));
                }
                Err(_) if self.len == 4 => {
                    return Err("invalid UTF-8 sequence".to_string());
                }
                Err(_) => {}
            }
        }
        match std::str::from_utf8(chunk) {
            Ok(_) => Ok(()),
            Err(e) if e.error_len().is_none() => {
                let tail = &chunk[e.valid_up_to()..];
                self.pending[..tail.len()].copy_from_slice(tail);
                self.len = tail.len();
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn finish(&self) -> Result<(), String> {
        if self.len > 0 {
            Err("truncated UTF-8 sequence at end of stream".to_string())
        } else {
            Ok(())
        }
    }
}

/// Copy everything from `reader` into `writer`. The writer is not finished.
///
/// Returns the number of bytes written.
pub fn copy_stream(
    reader: &mut ScopedReader,
    writer: &mut ScopedWriter,
    progress: &CopyProgress,
) -> ResourceResult<u64> {
    let transcode = Transcode::between(reader.kind(), writer.kind());
    let mut validator = Utf8Validator::default();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let chunk = &buf[..n];
        if transcode == Transcode::Utf8 {
            validator
                .feed(chunk)
                .map_err(|reason| ResourceError::encoding(progress.name(), reason))?;
        }
        writer.write_all(chunk)?;
        written += n as u64;
        progress.advance(n as u64);
    }

    if transcode == Transcode::Utf8 {
        validator
            .finish()
            .map_err(|reason| ResourceError::encoding(progress.name(), reason))?;
    }

    debug!(name = progress.name(), bytes = written, ?transcode, "copied resource");
    Ok(written)
}

/// Open `source` and `target`, copy, and finish the target.
pub fn copy_resource(
    source: &dyn ResourceHandle,
    source_mode: OpenMode,
    target: &dyn ResourceHandle,
    target_mode: OpenMode,
    progress: &CopyProgress,
) -> ResourceResult<u64> {
    let mut reader = source.reader(source_mode)?;
    let mut writer = target.writer(target_mode)?;
    let written = copy_stream(&mut reader, &mut writer, progress)?;
    writer.finish()?;
    Ok(written)
}

/// Read a whole resource into memory. Intended for small resources such as
/// id lists; bulk content should go through [`copy_resource`].
pub fn read_all(handle: &dyn ResourceHandle, mode: OpenMode) -> ResourceResult<Vec<u8>> {
    let mut reader = handle.reader(mode)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// Read a whole resource as UTF-8 text.
pub fn read_to_string(handle: &dyn ResourceHandle) -> ResourceResult<String> {
    let mut reader = handle.reader(OpenMode::ReadText)?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let name = reader.name().to_string();
    String::from_utf8(bytes).map_err(|e| ResourceError::encoding(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::MemoryHandle;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn copy(source: &[u8], source_mode: OpenMode, target_mode: OpenMode) -> ResourceResult<Vec<u8>> {
        let src = MemoryHandle::new("src", source.to_vec());
        let dst = MemoryHandle::empty("dst");
        copy_resource(&src, source_mode, &dst, target_mode, &CopyProgress::new("src"))?;
        Ok(dst.contents())
    }

    // -----------------------------------------------------------------------
    // Transcoding paths
    // -----------------------------------------------------------------------

    #[test]
    fn transcode_is_chosen_from_kinds() {
        assert_eq!(Transcode::between(StreamKind::Text, StreamKind::Text), Transcode::Direct);
        assert_eq!(Transcode::between(StreamKind::Text, StreamKind::Binary), Transcode::Utf8);
        assert_eq!(Transcode::between(StreamKind::Binary, StreamKind::Text), Transcode::Utf8);
    }

    #[test]
    fn single_char_text_to_binary_is_one_byte() {
        let out = copy(b"a", OpenMode::ReadText, OpenMode::WriteBinary).unwrap();
        assert_eq!(out, vec![b'a']);
    }

    #[test]
    fn empty_source_gives_empty_target() {
        let out = copy(b"", OpenMode::ReadBinary, OpenMode::WriteText).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_utf8_into_text_is_an_encoding_error() {
        let err = copy(&[0x61, 0xff, 0x62], OpenMode::ReadBinary, OpenMode::WriteText).unwrap_err();
        assert!(matches!(err, ResourceError::Encoding { ref name, .. } if name == "src"));
    }

    #[test]
    fn invalid_utf8_binary_to_binary_is_copied() {
        let out = copy(&[0xff, 0xfe], OpenMode::ReadBinary, OpenMode::WriteBinary).unwrap();
        assert_eq!(out, vec![0xff, 0xfe]);
    }

    #[test]
    fn truncated_multibyte_sequence_is_rejected() {
        // First two bytes of a three byte sequence.
        let err = copy(&[0xe2, 0x82], OpenMode::ReadText, OpenMode::WriteBinary).unwrap_err();
        assert_eq!(err.kind(), "Encoding");
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let mut data = vec![b'x'; COPY_BUFFER_SIZE - 1];
        data.extend_from_slice("€".as_bytes());
        let out = copy(&data, OpenMode::ReadText, OpenMode::WriteBinary).unwrap();
        assert_eq!(out, data);
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    #[test]
    fn progress_fires_per_chunk() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let meta = Metadata::new()
            .with_size((COPY_BUFFER_SIZE * 2 + 5) as u64)
            .with_progress(ProgressCallback::new(move |p| {
                sink.lock().unwrap().push((p.advance, p.total));
            }));

        let src = MemoryHandle::new("big", vec![0u8; COPY_BUFFER_SIZE * 2 + 5]);
        let dst = MemoryHandle::empty("out");
        let written = copy_resource(
            &src,
            OpenMode::ReadBinary,
            &dst,
            OpenMode::WriteBinary,
            &CopyProgress::from_metadata("big", &meta),
        )
        .unwrap();

        assert_eq!(written, (COPY_BUFFER_SIZE * 2 + 5) as u64);
        let events = events.lock().unwrap();
        let total: u64 = events.iter().map(|(a, _)| a).sum();
        assert_eq!(total, written);
        assert!(events.iter().all(|(a, t)| *a <= COPY_BUFFER_SIZE as u64 && *t == Some(written)));
    }

    proptest! {
        #[test]
        fn text_round_trip_is_mode_independent(s in ".*", src_bin in any::<bool>(), dst_bin in any::<bool>()) {
            let src_mode = if src_bin { OpenMode::ReadBinary } else { OpenMode::ReadText };
            let dst_mode = if dst_bin { OpenMode::WriteBinary } else { OpenMode::WriteText };
            let out = copy(s.as_bytes(), src_mode, dst_mode).unwrap();
            prop_assert_eq!(out, s.as_bytes().to_vec());
        }

        #[test]
        fn utf8_validator_accepts_any_chunking(s in ".{0,64}", cut in 0usize..64) {
            let bytes = s.as_bytes();
            let cut = cut.min(bytes.len());
            let mut validator = Utf8Validator::default();
            prop_assert!(validator.feed(&bytes[..cut]).is_ok());
            prop_assert!(validator.feed(&bytes[cut..]).is_ok());
            prop_assert!(validator.finish().is_ok());
        }
    }
}
