/// HTTP access to the chat-completion server.
pub mod client;
pub mod providers;

pub use client::{ChatClient, ChatMessage, ChatRequest, ClientConfig, StreamResponse};
pub use providers::openai::OpenAICompatClient;
