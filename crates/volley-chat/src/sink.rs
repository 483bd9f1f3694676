//! Where partial completions go while a stream is being consumed

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// The accumulated assistant text of a chat, published after every fragment
/// that added text and returned once the completion is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletionOutput {
    pub chat_id: String,
    pub user_id: String,
    /// Everything generated so far; each emission extends the previous one
    pub content: String,
}

/// Consumer of partial outputs.
///
/// A slow `publish` slows the stream consumer down; the network read is not
/// resumed until it returns.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn publish(&self, output: ChatCompletionOutput) -> Result<()>;
}

#[async_trait]
impl OutputSink for mpsc::Sender<ChatCompletionOutput> {
    async fn publish(&self, output: ChatCompletionOutput) -> Result<()> {
        self.send(output).await.map_err(|_| Error::SinkClosed)
    }
}

#[async_trait]
impl OutputSink for mpsc::UnboundedSender<ChatCompletionOutput> {
    async fn publish(&self, output: ChatCompletionOutput) -> Result<()> {
        self.send(output).map_err(|_| Error::SinkClosed)
    }
}
