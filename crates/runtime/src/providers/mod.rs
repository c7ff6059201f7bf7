//! Planner provider adapters.
//!
//! Each provider implements [`ModelClient`](crate::ModelClient) for its API.

mod openai;

pub use openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiClient, OpenAiClientBuilder};
