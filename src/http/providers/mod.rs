/// Concrete [`ChatClient`](super::client::ChatClient) implementations.
pub mod openai;
