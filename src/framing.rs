//! Length-prefixed document framing over byte streams.
//!
//! # Wire Format
//!
//! ```text
//! <i32 little-endian total length><length - 4 bytes of document payload>
//! ```
//!
//! The length counts its own four bytes, matching the document format's
//! self-describing size field, so a record is exactly one encoded document.
//! Records above [`MAX_RECORD_SIZE`] are a fatal stream error.

use std::io::{self, Read, Write};

use serde::Serialize;

use crate::error::{Result, ShimError};

/// Maximum record size (16MiB), the largest document the helper produces.
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Bytes in the length prefix.
const PREFIX_LEN: usize = 4;

/// A pull-based source of raw, framed documents.
///
/// Implemented by [`BsonSource`] for plain streams and by
/// [`ShimDocSource`](crate::ShimDocSource) for a live helper process.
pub trait RawDocSource {
    /// Read the next record into `buf`, growing it as needed.
    ///
    /// Returns the record length, or `None` at end of stream or after an
    /// error. Use [`err`](RawDocSource::err) to tell the two apart.
    fn load_next_into(&mut self, buf: &mut Vec<u8>) -> Option<usize>;

    /// The error that stopped the stream, if any.
    fn err(&self) -> Option<&ShimError>;

    /// Release the stream, returning its terminal error.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Reads framed documents from any byte stream.
pub struct BsonSource<R> {
    reader: R,
    err: Option<ShimError>,
    exhausted: bool,
}

impl<R: Read> BsonSource<R> {
    /// Wrap a byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            err: None,
            exhausted: false,
        }
    }

    fn fail(&mut self, err: ShimError) -> Option<usize> {
        self.err = Some(err);
        None
    }
}

impl<R: Read> RawDocSource for BsonSource<R> {
    fn load_next_into(&mut self, buf: &mut Vec<u8>) -> Option<usize> {
        if self.exhausted || self.err.is_some() {
            return None;
        }

        let mut prefix = [0u8; PREFIX_LEN];
        match read_full(&mut self.reader, &mut prefix) {
            Ok(0) => {
                self.exhausted = true;
                return None;
            }
            Ok(n) if n < PREFIX_LEN => {
                return self.fail(ShimError::Truncated {
                    expected: PREFIX_LEN,
                    read: n,
                })
            }
            Ok(_) => {}
            Err(e) => return self.fail(ShimError::Read(e)),
        }

        let len = match record_len(i32::from_le_bytes(prefix)) {
            Ok(len) => len,
            Err(e) => return self.fail(e),
        };

        if buf.len() < len {
            buf.resize(len, 0);
        }
        buf[..PREFIX_LEN].copy_from_slice(&prefix);

        match read_full(&mut self.reader, &mut buf[PREFIX_LEN..len]) {
            Ok(n) if n == len - PREFIX_LEN => Some(len),
            Ok(n) => self.fail(ShimError::Truncated {
                expected: len,
                read: PREFIX_LEN + n,
            }),
            Err(e) => self.fail(ShimError::Read(e)),
        }
    }

    fn err(&self) -> Option<&ShimError> {
        self.err.as_ref()
    }

    /// Consumes the source; the reader is dropped here, which closes the
    /// underlying pipe or file.
    fn close(self) -> Result<()> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Writes framed documents to any byte stream.
pub struct BsonSink<W> {
    writer: W,
}

impl<W: Write> BsonSink<W> {
    /// Wrap a byte stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encode `doc` and write it as one record.
    pub fn write_doc<T: Serialize>(&mut self, doc: &T) -> Result<()> {
        let bytes = bson::to_vec(doc)?;
        self.write_raw(&bytes)
    }

    /// Write an already-encoded record. Its prefix must match its length.
    pub fn write_raw(&mut self, record: &[u8]) -> Result<()> {
        if record.len() < PREFIX_LEN {
            return Err(ShimError::Truncated {
                expected: PREFIX_LEN,
                read: record.len(),
            });
        }
        let declared = i32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let len = record_len(declared)?;
        if len != record.len() {
            return Err(ShimError::Truncated {
                expected: len,
                read: record.len(),
            });
        }
        self.writer.write_all(record).map_err(ShimError::Write)
    }

    /// Flush and release the stream.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush().map_err(ShimError::Write)
    }
}

/// Validate a declared record length.
fn record_len(declared: i32) -> Result<usize> {
    let len = usize::try_from(declared).map_err(|_| ShimError::InvalidRecordLength(declared))?;
    if len < PREFIX_LEN {
        return Err(ShimError::InvalidRecordLength(declared));
    }
    if len > MAX_RECORD_SIZE {
        return Err(ShimError::RecordTooLarge {
            len,
            max: MAX_RECORD_SIZE,
        });
    }
    Ok(len)
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
