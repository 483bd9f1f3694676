//! volley-ai: streaming chat completion client layer
//!
//! This crate describes a chat completion request, the incremental text
//! fragments a model streams back, and the clients that speak to
//! OpenAI-compatible endpoints.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::StreamingClient;
pub use stream::{CompletionStream, Fragment, ResponseBuilder};
pub use types::*;
