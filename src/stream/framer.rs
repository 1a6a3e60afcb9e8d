use bytes::{Buf, BytesMut};
use memchr::memchr_iter;

/// Upper bound on bytes buffered for a single unterminated line.
pub const MAX_PENDING_LINE_BYTES: usize = 4 * 1024 * 1024;

/// An upstream line grew past the framer's limit without a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unterminated upstream line exceeds {limit} bytes")]
pub struct LineOverflow {
    pub limit: usize,
}

/// Reassembles newline-terminated lines from arbitrarily split body chunks.
///
/// Bytes are buffered raw and only decoded once a full line is available.
/// A `\n` byte never occurs inside a multi-byte UTF-8 sequence, so a chunk
/// boundary that splits a character cannot corrupt a line.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    limit: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_PENDING_LINE_BYTES)
    }

    /// Framer that rejects unterminated lines longer than `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096.min(limit)),
            limit,
        }
    }

    /// Feed one chunk and return every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, LineOverflow> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out)?;
        Ok(out)
    }

    /// Feed one chunk and append completed lines (without `\n`) to `out`.
    ///
    /// Lines completed by `chunk` are appended even when the remaining
    /// fragment overflows. On overflow the fragment is discarded.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) -> Result<(), LineOverflow> {
        let scan_start = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut consumed = 0usize;
        for rel_pos in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel_pos;
            out.push(String::from_utf8_lossy(&self.buffer[consumed..line_end]).into_owned());
            consumed = line_end + 1;
        }
        if consumed > 0 {
            self.buffer.advance(consumed);
        }
        if self.buffer.len() > self.limit {
            self.buffer.clear();
            return Err(LineOverflow { limit: self.limit });
        }
        Ok(())
    }

    /// Number of buffered bytes not yet terminated by a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Take the unterminated trailing fragment, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
