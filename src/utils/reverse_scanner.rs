//! Backward line scanner
//!
//! Reads a random-access source from its end towards its start, one line at
//! a time, without loading the whole source into memory. The event store
//! uses it to learn an aggregate's current version from the last line of
//! its log, which costs O(last record) instead of O(file size).
//!
//! ```text
//!   source:  [ ......... unread ......... | buffered | ]
//!                                        pos        len
//!   scan():  read 1 KiB chunks before `pos` into the buffer until it holds
//!            a '\n', then hand out everything after the last '\n'.
//! ```

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Default number of bytes read per step
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Positional reads from a byte-addressable source
pub trait ReadAt {
    /// Fill `buf` completely with the bytes starting at `offset`
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= self.len())
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }
}

impl ReadAt for File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut file = self;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }
}

/// Scans lines from the end of a source towards its start
///
/// Empty lines are skipped and a trailing `\r` is stripped from every line.
///
/// ```
/// use es_filestore::utils::ReverseScanner;
///
/// let mut scanner = ReverseScanner::from_text("first\nsecond\n\nthird\n");
/// let mut lines = Vec::new();
/// while scanner.scan() {
///     lines.push(scanner.text().into_owned());
/// }
/// assert_eq!(lines, ["third", "second", "first"]);
/// assert!(scanner.scan_err().is_none());
/// ```
pub struct ReverseScanner<R> {
    reader: R,
    len: u64,
    /// Bytes in `[0, pos)` have not been read yet
    pos: u64,
    chunk_size: usize,
    /// Unreturned bytes immediately before the last returned line
    buf: Vec<u8>,
    /// Set once the start of the source has been consumed
    exhausted: bool,
    err: Option<io::Error>,
    /// Set once a read has failed, even after the error was taken
    failed: bool,

    line: Vec<u8>,
    line_start: u64,
}

impl<R: ReadAt> ReverseScanner<R> {
    /// Scan the first `len` bytes of `reader`
    pub fn new(reader: R, len: u64) -> Self {
        Self {
            reader,
            len,
            pos: len,
            chunk_size: DEFAULT_CHUNK_SIZE,
            buf: Vec::new(),
            exhausted: false,
            err: None,
            failed: false,
            line: Vec::new(),
            line_start: 0,
        }
    }

    /// Change the number of bytes read per step (minimum 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Advance to the previous non-empty line
    ///
    /// Returns false once the start of the source is reached or a read
    /// fails; [`ReverseScanner::scan_err`] tells the two apart.
    pub fn scan(&mut self) -> bool {
        if self.failed {
            return false;
        }
        loop {
            match self.next_line() {
                Ok(Some(())) if self.line.is_empty() => continue,
                Ok(Some(())) => return true,
                Ok(None) => {
                    self.line.clear();
                    return false;
                }
                Err(e) => {
                    self.line.clear();
                    self.err = Some(e);
                    self.failed = true;
                    return false;
                }
            }
        }
    }

    /// The most recently scanned line
    pub fn bytes(&self) -> &[u8] {
        &self.line
    }

    /// The most recently scanned line as text (lossy UTF-8)
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.line)
    }

    /// Byte offset of the most recently scanned line within the source
    pub fn offset(&self) -> u64 {
        self.line_start
    }

    /// The I/O failure that stopped scanning, `None` at a clean end-of-stream
    pub fn scan_err(&self) -> Option<&io::Error> {
        self.err.as_ref()
    }

    /// Take the I/O failure out of the scanner; scanning stays stopped
    pub fn take_err(&mut self) -> Option<io::Error> {
        self.err.take()
    }

    /// Total length of the scanned source in bytes
    pub fn source_len(&self) -> u64 {
        self.len
    }

    /// True once every line has been handed out without error
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && !self.failed && self.buf.is_empty()
    }

    fn next_line(&mut self) -> io::Result<Option<()>> {
        loop {
            if let Some(newline) = self.buf.iter().rposition(|&b| b == b'\n') {
                self.line.clear();
                self.line.extend_from_slice(drop_cr(&self.buf[newline + 1..]));
                self.line_start = self.pos + newline as u64 + 1;
                self.buf.truncate(newline);
                return Ok(Some(()));
            }

            if self.pos == 0 {
                self.exhausted = true;
                if self.buf.is_empty() {
                    return Ok(None);
                }
                // First line of the source: no '\n' before it
                self.line.clear();
                self.line.extend_from_slice(drop_cr(&self.buf));
                self.line_start = 0;
                self.buf.clear();
                return Ok(Some(()));
            }

            self.read_more()?;
        }
    }

    fn read_more(&mut self) -> io::Result<()> {
        let size = self.pos.min(self.chunk_size as u64) as usize;
        let offset = self.pos - size as u64;

        let mut chunk = vec![0u8; size];
        chunk.reserve(self.buf.len());
        self.reader.read_exact_at(&mut chunk, offset)?;
        chunk.append(&mut self.buf);

        self.buf = chunk;
        self.pos = offset;
        Ok(())
    }
}

impl ReverseScanner<File> {
    /// Scan a whole file; its length is taken from the metadata
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self::new(file, len))
    }
}

impl ReverseScanner<Vec<u8>> {
    /// Scan in-memory text
    pub fn from_text(text: impl Into<String>) -> Self {
        let bytes = text.into().into_bytes();
        let len = bytes.len() as u64;
        Self::new(bytes, len)
    }
}

impl<R: ReadAt> ReverseScanner<R> {
    /// Iterate over the remaining lines, last to first
    pub fn lines(self) -> Lines<R> {
        Lines { scanner: self }
    }
}

/// Owned lines of a [`ReverseScanner`], last to first
///
/// Yields a read failure once and then stops.
pub struct Lines<R> {
    scanner: ReverseScanner<R>,
}

impl<R: ReadAt> Iterator for Lines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.scanner.scan() {
            return Some(Ok(self.scanner.bytes().to_vec()));
        }
        self.scanner.take_err().map(Err)
    }
}

fn drop_cr(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r").unwrap_or(data)
}
