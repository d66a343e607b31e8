//! WARC record framing and per-record gzip.
//!
//! A record is a `WARC/<version>` line, header lines up to an empty line, a
//! block of `Content-Length` bytes, and a blank-line trailer. The canonical
//! compressed form writes every record as its own gzip member with a fixed
//! header, so compressing canonical output again yields the same bytes.

use std::io::{self, BufRead, Read, Write};

use flate2::{Compression, GzBuilder};

use wacli_types::{ResourceError, ResourceResult};

const RECORD_TRAILER: &[u8] = b"\r\n\r\n";

fn malformed(name: &str, reason: impl Into<String>) -> ResourceError {
    ResourceError::Compression {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn read_failed(name: &str, err: io::Error) -> ResourceError {
    malformed(name, err.to_string())
}

/// Header block of one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// Version line and header lines, including the terminating empty line.
    pub raw: Vec<u8>,
    pub content_length: u64,
}

/// Reads consecutive records from a decompressed WARC stream.
pub struct RecordReader<R> {
    name: String,
    inner: R,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(name: impl Into<String>, inner: R) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    /// Read the next header, leaving the reader positioned at the block.
    /// Returns `None` at end of input.
    pub fn next_header(&mut self) -> ResourceResult<Option<RecordHeader>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut line)
                .map_err(|e| read_failed(&self.name, e))?;
            if n == 0 {
                return Ok(None);
            }
            if !line.trim_ascii().is_empty() {
                break;
            }
        }
        if !line.starts_with(b"WARC/") {
            return Err(malformed(&self.name, "expected a WARC version line"));
        }

        let mut raw = std::mem::take(&mut line);
        let mut content_length = None;
        loop {
            line.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut line)
                .map_err(|e| read_failed(&self.name, e))?;
            if n == 0 {
                return Err(malformed(&self.name, "truncated record header"));
            }
            raw.extend_from_slice(&line);
            if line.trim_ascii().is_empty() {
                break;
            }
            if let Some(value) = header_value(&line, "content-length") {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| malformed(&self.name, format!("invalid Content-Length {value:?}")))?;
                content_length = Some(parsed);
            }
        }

        let content_length =
            content_length.ok_or_else(|| malformed(&self.name, "record without Content-Length"))?;
        Ok(Some(RecordHeader { raw, content_length }))
    }

    /// Copy exactly `len` block bytes into `out`.
    pub fn copy_block(&mut self, len: u64, out: &mut dyn Write) -> ResourceResult<()> {
        let copied = io::copy(&mut (&mut self.inner).take(len), out).map_err(|e| read_failed(&self.name, e))?;
        if copied != len {
            return Err(malformed(
                &self.name,
                format!("record block truncated: expected {len} bytes, got {copied}"),
            ));
        }
        Ok(())
    }
}

fn header_value(line: &[u8], name: &str) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let (key, value) = line.split_once(':')?;
    key.trim()
        .eq_ignore_ascii_case(name)
        .then(|| value.trim().to_string())
}

/// Rewrite a decompressed WARC stream as per-record gzip members.
///
/// Returns the number of records written.
pub fn write_per_record_gzip<R: BufRead, W: Write>(
    name: &str,
    input: R,
    mut output: W,
    level: Compression,
) -> ResourceResult<u64> {
    let mut records = RecordReader::new(name, input);
    let mut count = 0;
    while let Some(header) = records.next_header()? {
        let mut member = GzBuilder::new().mtime(0).write(&mut output, level);
        member.write_all(&header.raw)?;
        records.copy_block(header.content_length, &mut member)?;
        member.write_all(RECORD_TRAILER)?;
        member.finish()?;
        count += 1;
    }
    output.flush()?;
    Ok(count)
}
