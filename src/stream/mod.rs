/// Incremental decoding of server-sent chat-completion streams.
pub mod decoder;
pub mod lines;

pub use decoder::{classify_line, DrainedResponse, LineEvent, StreamDecoder};
pub use lines::{into_lines, LineBuffer, LineStream};
