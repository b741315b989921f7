//! Newline-delimited record reassembly over a chunked transport.
//!
//! BLE notifications carry at most one ATT payload each, so a single firmware
//! line usually arrives split across several chunks, and one chunk may also
//! complete one line and start the next. [`LineReassembler`] buffers raw
//! bytes and hands back every completed line exactly once, in stream order.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use uart_types::Record;

/// Record delimiter written by the firmware.
pub const DELIMITER: u8 = b'\n';

/// Accumulates raw chunks and extracts newline-delimited [`Record`]s.
///
/// After every [`append`](Self::append) the internal buffer holds only the
/// trailing bytes of the next, not yet delimited, record.
///
/// # Example
///
/// ```
/// use uart_core::LineReassembler;
///
/// let mut reassembler = LineReassembler::new();
/// assert!(reassembler.append(b"12.0,1,").is_empty());
/// let records = reassembler.append(b"2,3\n34.0");
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].as_str(), "12.0,1,2,3");
/// assert_eq!(reassembler.pending_len(), 4);
/// ```
#[derive(Debug, Default)]
pub struct LineReassembler {
    buffer: BytesMut,
    emitted: u64,
    dropped: u64,
}

impl LineReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every record it completes, in order.
    ///
    /// Lines that are not valid UTF-8 are dropped and counted; scanning
    /// continues with the next line.
    pub fn append(&mut self, chunk: &[u8]) -> Vec<Record> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == DELIMITER) {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            match std::str::from_utf8(&line) {
                Ok(text) => {
                    self.emitted += 1;
                    records.push(Record::new(text));
                }
                Err(e) => {
                    self.dropped += 1;
                    warn!(
                        len = line.len(),
                        error = %e,
                        "Dropping malformed record (invalid UTF-8)"
                    );
                }
            }
        }

        records
    }

    /// Number of buffered bytes not yet terminated by a delimiter.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// The buffered, not yet delimited bytes.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discard the buffered partial record.
    ///
    /// Returns the number of bytes discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.advance(discarded);
        if discarded > 0 {
            debug!("Discarded {} pending bytes", discarded);
        }
        discarded
    }

    /// Total records emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Total malformed lines dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
