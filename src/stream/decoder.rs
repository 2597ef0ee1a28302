/// Decoder for `data: `-prefixed chat-completion stream events.
use crate::error::StreamError;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::time::Instant;

/// Prefix carried by every payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload signalling a normal end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One streamed chunk. Every field is optional on the wire.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl ChatChunk {
    fn into_content(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|content| !content.is_empty())
    }
}

/// Classification of a single response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Not a payload line, or a payload with no text delta.
    Ignored,
    /// The terminal sentinel.
    Done,
    /// A payload line that failed to decode.
    Malformed,
    /// A non-empty text delta.
    Fragment(String),
}

/// Classify one line of a streamed response.
pub fn classify_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignored;
    };
    if data == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) => chunk
            .into_content()
            .map(LineEvent::Fragment)
            .unwrap_or(LineEvent::Ignored),
        Err(_) => LineEvent::Malformed,
    }
}

/// Everything a fully drained stream produced.
#[derive(Debug, Clone, Default)]
pub struct DrainedResponse {
    pub text: String,
    pub token_count: u64,
    pub first_fragment_at: Option<Instant>,
}

/// Lazily yields text fragments from one response's line stream.
///
/// Tied to a single response: once the sentinel is seen, the line stream
/// ends, or a transport error is returned, every further call yields
/// `Ok(None)`. Malformed payload lines are skipped. A stream that ends
/// without the sentinel is not an error here; callers decide what an empty
/// result means.
pub struct StreamDecoder<S> {
    lines: S,
    token_count: u64,
    first_fragment_at: Option<Instant>,
    finished: bool,
}

impl<S> StreamDecoder<S>
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    pub fn new(lines: S) -> Self {
        Self {
            lines,
            token_count: 0,
            first_fragment_at: None,
            finished: false,
        }
    }

    /// Next non-empty text fragment, or `None` once the stream is over.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, StreamError> {
        while !self.finished {
            let line = match self.lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => {
                    self.finished = true;
                    break;
                }
            };

            match classify_line(&line) {
                LineEvent::Fragment(text) => {
                    self.token_count += 1;
                    self.first_fragment_at.get_or_insert_with(Instant::now);
                    return Ok(Some(text));
                }
                LineEvent::Done => self.finished = true,
                LineEvent::Malformed => {
                    tracing::trace!(line = %line, "skipping malformed stream payload");
                }
                LineEvent::Ignored => {}
            }
        }
        Ok(None)
    }

    /// Number of fragments yielded so far.
    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    /// When the first fragment was yielded.
    pub fn first_fragment_at(&self) -> Option<Instant> {
        self.first_fragment_at
    }

    /// Consume the rest of the stream and concatenate its fragments.
    pub async fn drain(mut self) -> Result<DrainedResponse, StreamError> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await? {
            text.push_str(&fragment);
        }
        Ok(DrainedResponse {
            text,
            token_count: self.token_count,
            first_fragment_at: self.first_fragment_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn lines(raw: &[&str]) -> impl Stream<Item = Result<String, StreamError>> + Unpin {
        stream::iter(
            raw.iter()
                .map(|l| Ok(l.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn classify_recognises_each_line_kind() {
        assert_eq!(classify_line(": keep-alive"), LineEvent::Ignored);
        assert_eq!(classify_line(""), LineEvent::Ignored);
        assert_eq!(classify_line("data: [DONE]"), LineEvent::Done);
        assert_eq!(classify_line("data: {not json"), LineEvent::Malformed);
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            LineEvent::Fragment("Hi".into())
        );
    }

    #[test]
    fn classify_treats_missing_or_empty_content_as_noise() {
        assert_eq!(classify_line(r#"data: {"choices":[]}"#), LineEvent::Ignored);
        assert_eq!(classify_line(r#"data: {"id":"x"}"#), LineEvent::Ignored);
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Ignored
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            LineEvent::Ignored
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":null}}]}"#),
            LineEvent::Ignored
        );
    }

    #[test]
    fn prefix_must_include_the_space() {
        assert_eq!(classify_line("data:[DONE]"), LineEvent::Ignored);
    }

    #[tokio::test]
    async fn yields_fragments_until_sentinel() {
        let mut decoder = StreamDecoder::new(lines(&[
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":" there"}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"ignored"}}]}"#,
        ]));

        assert_eq!(decoder.next_fragment().await.unwrap().as_deref(), Some("Hi"));
        assert_eq!(
            decoder.next_fragment().await.unwrap().as_deref(),
            Some(" there")
        );
        assert_eq!(decoder.next_fragment().await.unwrap(), None);
        assert_eq!(decoder.next_fragment().await.unwrap(), None);
        assert_eq!(decoder.token_count(), 2);
        assert!(decoder.first_fragment_at().is_some());
    }

    #[tokio::test]
    async fn malformed_line_between_valid_ones_is_skipped() {
        let drained = StreamDecoder::new(lines(&[
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
            "data: {\"choices\": [",
            r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
            "data: [DONE]",
        ]))
        .drain()
        .await
        .unwrap();

        assert_eq!(drained.text, "ab");
        assert_eq!(drained.token_count, 2);
    }

    #[tokio::test]
    async fn stream_without_sentinel_just_ends() {
        let drained = StreamDecoder::new(lines(&[
            r#"data: {"choices":[{"delta":{"content":"partial"}}]}"#,
        ]))
        .drain()
        .await
        .unwrap();
        assert_eq!(drained.text, "partial");
        assert_eq!(drained.token_count, 1);
    }

    #[tokio::test]
    async fn empty_stream_drains_to_empty_text() {
        let drained = StreamDecoder::new(lines(&["data: [DONE]"]))
            .drain()
            .await
            .unwrap();
        assert!(drained.text.is_empty());
        assert_eq!(drained.token_count, 0);
        assert!(drained.first_fragment_at.is_none());
    }

    #[tokio::test]
    async fn transport_error_is_returned_once() {
        let mut decoder = StreamDecoder::new(stream::iter(vec![
            Ok(r#"data: {"choices":[{"delta":{"content":"a"}}]}"#.to_string()),
            Err(StreamError::Timeout),
        ]));
        assert_eq!(decoder.next_fragment().await.unwrap().as_deref(), Some("a"));
        assert!(matches!(
            decoder.next_fragment().await,
            Err(StreamError::Timeout)
        ));
        assert_eq!(decoder.next_fragment().await.unwrap(), None);
    }
}
