//! One chat turn: resolve the session, append the user message, stream the
//! completion to a sink, then finalize and persist.
//!
//! The store only ever sees the session before the turn (on creation) and
//! after the turn has fully succeeded. A failure anywhere in between leaves
//! the stored session as it was, so retrying the same input appends the user
//! message exactly once.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use volley_ai::{ResponseBuilder, Role, StreamingClient};

use crate::{
    error::{Error, ExecuteError, Result, Stage, StoreOp},
    generation::GenerationConfig,
    message::Message,
    model::ModelDescriptor,
    session::Session,
    sink::{ChatCompletionOutput, OutputSink},
    store::SessionStore,
};

/// How to build a session when the chat id is not known yet
#[derive(Debug, Clone)]
pub struct ChatCompletionConfig {
    pub model: ModelDescriptor,
    pub generation: GenerationConfig,
    pub initial_system_message: String,
}

/// Input of one `execute` call
#[derive(Debug, Clone)]
pub struct ChatCompletionInput {
    /// Chat to continue; an empty id starts a chat under a generated id
    pub chat_id: String,
    pub user_id: String,
    pub user_message: String,
    pub config: ChatCompletionConfig,
}

/// Final answer of a persisted turn
pub type ChatCompletionResult = ChatCompletionOutput;

/// Drives chat turns against a session store and a streaming client
pub struct CompletionOrchestrator {
    store: Arc<dyn SessionStore>,
    client: Arc<dyn StreamingClient>,
}

impl CompletionOrchestrator {
    pub fn new(store: Arc<dyn SessionStore>, client: Arc<dyn StreamingClient>) -> Self {
        Self { store, client }
    }

    /// Run one turn, publishing the growing answer to `sink`.
    ///
    /// Cancelling `cancel` aborts the store call or stream in flight and
    /// returns [`Error::Cancelled`]; any assistant text received so far is
    /// discarded.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        input: ChatCompletionInput,
        sink: &dyn OutputSink,
    ) -> std::result::Result<ChatCompletionResult, ExecuteError> {
        let ChatCompletionInput {
            chat_id,
            user_id,
            user_message,
            config,
        } = input;

        let mut session = self
            .resolve(cancel, chat_id, user_id.clone(), config)
            .await
            .map_err(|e| ExecuteError::new(Stage::Resolve, e))?;

        Message::new(Role::User, user_message, session.model())
            .and_then(|msg| session.append_message(msg))
            .map_err(|e| ExecuteError::new(Stage::Append, e))?;

        let content = self
            .stream_completion(cancel, &session, &user_id, sink)
            .await
            .map_err(|e| ExecuteError::new(Stage::Stream, e))?;

        Message::new(Role::Assistant, content.clone(), session.model())
            .and_then(|msg| session.append_message(msg))
            .map_err(|e| ExecuteError::new(Stage::Finalize, e))?;

        cancellable(cancel, self.store.save(&session))
            .await
            .and_then(|saved| saved.map_err(|e| Error::store(StoreOp::Save, e)))
            .map_err(|e| ExecuteError::new(Stage::Persist, e))?;

        tracing::info!(
            session_id = %session.id(),
            messages = session.messages().len(),
            token_usage = session.token_usage(),
            "turn persisted"
        );

        Ok(ChatCompletionResult {
            chat_id: session.id().to_string(),
            user_id,
            content,
        })
    }

    /// Load the session, or create and store a new one when the id is unknown
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        chat_id: String,
        user_id: String,
        config: ChatCompletionConfig,
    ) -> Result<Session> {
        if !chat_id.is_empty() {
            match cancellable(cancel, self.store.find_by_id(&chat_id)).await? {
                Ok(session) => {
                    tracing::debug!(session_id = %chat_id, "resumed session");
                    return Ok(session);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(Error::store(StoreOp::Lookup, e)),
            }
        }

        let id = if chat_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            chat_id
        };

        let system = Message::new(Role::System, config.initial_system_message, &config.model)?;
        let session = Session::create_with_id(id, user_id, system, config.model, config.generation)?;

        cancellable(cancel, self.store.create(&session))
            .await?
            .map_err(|e| Error::store(StoreOp::Create, e))?;

        tracing::info!(
            session_id = %session.id(),
            model = %session.model().name(),
            "created session"
        );
        Ok(session)
    }

    /// Stream the completion for the session's transcript, publishing the
    /// accumulated text to `user_id` every time it grows
    async fn stream_completion(
        &self,
        cancel: &CancellationToken,
        session: &Session,
        user_id: &str,
        sink: &dyn OutputSink,
    ) -> Result<String> {
        let request = session.completion_request();
        tracing::debug!(
            session_id = %session.id(),
            messages = request.messages.len(),
            "opening completion stream"
        );

        let mut stream = cancellable(cancel, self.client.open_stream(request)).await??;
        let mut builder = ResponseBuilder::new();

        loop {
            // Dropping the stream on return aborts the request
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(session_id = %session.id(), "stream cancelled");
                    return Err(Error::Cancelled);
                }
                next = stream.next() => next,
            };

            let Some(fragment) = next else { break };
            if builder.push(&fragment?) {
                let output = ChatCompletionOutput {
                    chat_id: session.id().to_string(),
                    user_id: user_id.to_string(),
                    content: builder.current_text().to_string(),
                };
                cancellable(cancel, sink.publish(output)).await??;
            }
        }

        tracing::debug!(
            session_id = %session.id(),
            fragments = builder.fragment_count(),
            finish_reason = ?builder.finish_reason(),
            "stream finished"
        );
        Ok(builder.finish())
    }
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}
