//! Streaming fragment types and utilities

use crate::error::Result;
use crate::types::FinishReason;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// One incremental chunk of generated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Text delta; may be empty on the final chunk
    pub text: String,
    /// Set on the chunk that ends the choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl Fragment {
    /// Create a text fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }

    /// Create a fragment that closes the choice
    pub fn finished(text: impl Into<String>, reason: FinishReason) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(reason),
        }
    }
}

/// A stream of completion fragments.
///
/// The stream ending (`None`) is the end-of-stream signal; an `Err` item is a
/// failure and no further items are read. Dropping the stream aborts the
/// underlying request.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// Accumulates fragments into the response text
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    text: String,
    fragments: usize,
    finish_reason: Option<FinishReason>,
}

impl ResponseBuilder {
    /// Create a new response builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a fragment. Returns `true` if the accumulated text grew.
    pub fn push(&mut self, fragment: &Fragment) -> bool {
        self.fragments += 1;
        if let Some(ref reason) = fragment.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
        if fragment.text.is_empty() {
            return false;
        }
        self.text.push_str(&fragment.text);
        true
    }

    /// Text accumulated so far
    pub fn current_text(&self) -> &str {
        &self.text
    }

    /// Number of fragments processed, empty ones included
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Finish reason, if the endpoint reported one
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    /// Consume the builder and return the full text
    pub fn finish(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_in_order() {
        let mut builder = ResponseBuilder::new();
        assert!(builder.push(&Fragment::text("Hel")));
        assert!(builder.push(&Fragment::text("lo")));
        assert_eq!(builder.current_text(), "Hello");
        assert_eq!(builder.finish(), "Hello");
    }

    #[test]
    fn test_builder_empty_fragment_does_not_grow() {
        let mut builder = ResponseBuilder::new();
        builder.push(&Fragment::text("a"));
        assert!(!builder.push(&Fragment::finished("", FinishReason::Stop)));
        assert_eq!(builder.current_text(), "a");
        assert_eq!(builder.fragment_count(), 2);
        assert_eq!(builder.finish_reason(), Some(&FinishReason::Stop));
    }
}
