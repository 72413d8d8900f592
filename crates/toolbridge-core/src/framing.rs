//! Newline-delimited JSON framing
//!
//! Both hops speak one JSON document per line. [`LineFramer`] turns an
//! arbitrarily chunked byte stream back into those lines, and
//! [`FrameReader`] drives it from any `AsyncRead`.

use crate::error::{BridgeError, BridgeResult};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Size of a single read from the underlying stream
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Incremental splitter for `\n`-terminated messages
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    /// Bytes before this offset are known not to contain a terminator
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, oldest first.
    ///
    /// Returned lines do not include the terminator (or a preceding `\r`).
    /// Empty lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;

        while let Some(offset) = self.buffer[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            let mut line = &self.buffer[start..end];
            if let [head @ .., b'\r'] = line {
                line = head;
            }
            if !line.is_empty() {
                lines.push(line.to_vec());
            }
            start = end + 1;
            cursor = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Number of buffered bytes not yet terminated
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

/// Pulls complete lines out of an async byte stream
pub struct FrameReader<R> {
    reader: R,
    framer: LineFramer,
    ready: std::collections::VecDeque<Vec<u8>>,
    chunk: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            ready: std::collections::VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Next complete line, or `None` once the stream reports end-of-file.
    ///
    /// Unterminated bytes still buffered at end-of-file are discarded.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.framer.buffered() > 0 {
                    debug!(
                        "Discarding {} unterminated bytes at end of stream",
                        self.framer.buffered()
                    );
                    self.framer.clear();
                }
                return Ok(None);
            }

            self.ready.extend(self.framer.push(&self.chunk[..n]));
        }
    }
}

/// Encode a message as one JSON document followed by `\n`
pub fn encode_line<T: Serialize>(message: &T) -> BridgeResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)
        .map_err(|e| BridgeError::serialization(e.to_string()).with_context("encoding line"))?;
    bytes.push(b'\n');
    Ok(bytes)
}
