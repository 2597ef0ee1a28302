/// Splitting of a chunked response body into text lines.
use crate::error::StreamError;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;

/// A boxed stream of decoded response lines.
pub type LineStream = BoxStream<'static, Result<String, StreamError>>;

/// Accumulates raw body chunks and hands out complete lines.
///
/// Chunk boundaries are arbitrary: a line (or a multi-byte character) may be
/// split across any number of chunks. Lines are terminated by `\n`, an
/// optional trailing `\r` is dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, StreamError> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8(line).map_err(|_| StreamError::InvalidUtf8)?);
        }
        Ok(lines)
    }

    /// Flush the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Result<Option<String>, StreamError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| StreamError::InvalidUtf8)
    }
}

struct LineState<S> {
    chunks: S,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    exhausted: bool,
}

/// Turn a stream of body chunks into a stream of lines.
///
/// The first error ends the stream after being yielded.
pub fn into_lines<S, B>(chunks: S) -> LineStream
where
    S: Stream<Item = Result<B, StreamError>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = LineState {
        chunks,
        buffer: LineBuffer::new(),
        ready: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.exhausted {
                return None;
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => match state.buffer.push(chunk.as_ref()) {
                    Ok(lines) => state.ready.extend(lines),
                    Err(e) => {
                        state.exhausted = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.exhausted = true;
                    match state.buffer.finish() {
                        Ok(Some(line)) => state.ready.push_back(line),
                        Ok(None) => {}
                        Err(e) => return Some((Err(e), state)),
                    }
                }
            }
        }
    })
    .boxed()
}
