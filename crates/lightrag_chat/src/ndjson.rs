//! NDJSON decoding for streamed answers.
//!
//! Transport chunk boundaries never line up with record boundaries, so bytes
//! are buffered until a `\n` completes a line. The trailing partial segment is
//! carried into the next chunk; whatever is still buffered at end of stream
//! is not a record and is dropped.

use futures_util::{Stream, StreamExt};

use crate::messages::Envelope;

/// Line-reassembly buffer.
///
/// Splitting happens on raw bytes: `\n` cannot occur inside a multi-byte UTF-8
/// sequence, so a character split across chunks is decoded intact once its
/// line completes.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order, without
    /// their terminators (`\n` or `\r\n`).
    ///
    /// Only `chunk` is scanned: the buffered tail holds no `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let offset = self.buf.len();
        self.buf.extend_from_slice(chunk);
        let Some(i) = chunk.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let last_newline = offset + i;
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Bytes of the current partial line.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// End of input. Returns the unterminated remainder, if any, so the caller
    /// can report it; it is never a deliverable record.
    pub fn finish(self) -> Option<String> {
        (!self.buf.is_empty()).then(|| String::from_utf8_lossy(&self.buf).into_owned())
    }
}

/// Decode one complete line into a text delta.
///
/// Blank lines, lines that are not a JSON object of the expected shape, and
/// envelopes without a non-empty `response` yield `None`.
pub fn decode_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Envelope>(trimmed) {
        Ok(envelope) => envelope.delta(),
        Err(e) => {
            tracing::debug!(error = %e, line = trimmed, "skipping non-envelope line");
            None
        }
    }
}

/// Turn a byte stream into a stream of text deltas.
///
/// Deltas are yielded in line order. The first transport error is yielded
/// once and ends the stream.
pub fn decode_stream<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut lines = LineBuffer::new();
        let mut byte_stream = std::pin::pin!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for line in lines.push(chunk.as_ref()) {
                if let Some(delta) = decode_line(&line) {
                    yield Ok(delta);
                }
            }
        }

        if let Some(rest) = lines.finish() {
            tracing::debug!(remainder = %rest, "discarding unterminated final line");
        }
    }
}
