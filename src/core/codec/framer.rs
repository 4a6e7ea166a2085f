//! Carriage-return line framing

use super::LINE_TERMINATOR;

/// Longest line (excluding terminator) the framer will accumulate.
/// Anything longer is discarded up to the next terminator.
pub const MAX_LINE_LEN: usize = 256;

/// Accumulates raw chunks and splits them into terminator-delimited lines.
///
/// Output depends only on the concatenated byte stream, never on how it was
/// chunked. A leading `\n` (left over from a `\r\n` line ending) is stripped
/// from each line.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    /// Set while skipping the tail of an overlong line
    discarding: bool,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == LINE_TERMINATOR {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(Self::finish_line(&self.buffer));
                }
                self.buffer.clear();
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buffer.push(byte);
            if self.buffer.len() > MAX_LINE_LEN {
                tracing::warn!("Dropping line longer than {} bytes", MAX_LINE_LEN);
                self.buffer.clear();
                self.discarding = true;
            }
        }

        lines
    }

    /// Bytes of the current unterminated line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    fn finish_line(raw: &[u8]) -> String {
        let raw = raw.strip_prefix(b"\n").unwrap_or(raw);
        String::from_utf8_lossy(raw).into_owned()
    }
}
