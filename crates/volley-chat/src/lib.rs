//! volley-chat: token-budgeted chat sessions
//!
//! A [`Session`] keeps an ordered conversation whose token cost, plus the
//! tokens reserved for the next completion, never exceeds the model's
//! context. The [`CompletionOrchestrator`] runs one turn at a time: it loads
//! or creates the session, streams the model's answer to an [`OutputSink`],
//! and persists the finished exchange through a [`SessionStore`].

pub mod error;
pub mod generation;
pub mod message;
pub mod model;
pub mod orchestrator;
pub mod session;
pub mod sink;
pub mod store;

pub use error::{Error, ExecuteError, Result, Stage, StoreOp};
pub use generation::{GenerationConfig, MAX_STOP_SEQUENCES};
pub use message::Message;
pub use model::ModelDescriptor;
pub use orchestrator::{
    ChatCompletionConfig, ChatCompletionInput, ChatCompletionResult, CompletionOrchestrator,
};
pub use session::{Session, SessionStatus};
pub use sink::{ChatCompletionOutput, OutputSink};
pub use store::{InMemorySessionStore, SessionStore, StoreError};

// Re-export the transcript role so callers need not depend on volley-ai
pub use volley_ai::Role;
