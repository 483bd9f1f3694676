//! Streaming client implementations

pub mod openai;

use crate::{CompletionRequest, CompletionStream, Error, Result};
use async_trait::async_trait;

/// Trait for clients that stream chat completions
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Issue a completion request and return its fragment stream.
    ///
    /// Errors returned here mean the request never started streaming.
    async fn open_stream(&self, request: CompletionRequest) -> Result<CompletionStream>;
}

/// Get an API key from the provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}
