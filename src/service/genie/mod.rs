pub mod rest;

use std::{ops::Deref, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::base::types::{Answer, FeedbackTarget, MessageHandle, Polarity};

// Types.

/// Backend-side status of one submitted question.
///
/// Genie reports a handful of intermediate stages; the bot only cares whether
/// a status is terminal, so unrecognized strings land on `Unknown` and keep
/// the poll loop going instead of failing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    #[default]
    Submitted,
    FetchingMetadata,
    FilteringContext,
    AskingAi,
    PendingWarehouse,
    ExecutingQuery,
    Completed,
    Failed,
    Cancelled,
    QueryResultExpired,
    #[serde(other)]
    Unknown,
}

impl MessageStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::QueryResultExpired)
    }
}

/// Errors from the Genie backend client.
#[derive(Debug, thiserror::Error)]
pub enum GenieError {
    #[error("genie rejected the credentials (http {status})")]
    Auth { status: u16 },
    #[error("conversation `{conversation_id}` is unknown to genie")]
    ConversationNotFound { conversation_id: String },
    #[error("genie request failed (http {status}): {message}")]
    Backend { status: u16, message: String },
    #[error("message `{message_id}` finished with status {status:?}")]
    Failed { message_id: String, status: MessageStatus },
    #[error("timed out after {waited:?} waiting for message `{message_id}`")]
    Timeout { message_id: String, waited: Duration },
    #[error("transport error talking to genie: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response shape from genie: {0}")]
    Malformed(String),
}

// Traits.

/// Generic Genie backend trait that clients must implement.
///
/// This trait wraps the question-answering backend behind four operations so
/// the routing layer never sees HTTP, and tests can substitute a mock.
#[async_trait]
pub trait GenericGenieClient: Send + Sync + 'static {
    /// Start a new conversation with an initial question.
    async fn start_conversation(&self, question: &str) -> Result<MessageHandle, GenieError>;

    /// Send a follow-up question inside an existing conversation.
    ///
    /// Fails with [`GenieError::ConversationNotFound`] when the backend does
    /// not know the conversation id; it never silently starts a new one.
    async fn continue_conversation(&self, conversation_id: &str, question: &str) -> Result<MessageHandle, GenieError>;

    /// Poll until the message reaches a terminal status or the deadline passes.
    ///
    /// On success the completed message is normalized into an [`Answer`].
    /// The deadline is explicit so callers stay in control of how long the
    /// loop may block.
    async fn wait_for_answer(&self, handle: &MessageHandle, deadline: Instant) -> Result<Answer, GenieError>;

    /// Forward user feedback about an answer, best-effort.
    ///
    /// Failures are logged and swallowed; feedback is never worth failing a
    /// user interaction over.
    async fn submit_feedback(&self, target: &FeedbackTarget, polarity: Polarity);

    /// The poll deadline for a question submitted right now.
    fn answer_deadline(&self) -> Instant;
}

// Structs.

/// Genie client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct GenieClient {
    inner: Arc<dyn GenericGenieClient>,
}

impl Deref for GenieClient {
    type Target = dyn GenericGenieClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl GenieClient {
    pub fn new(inner: Arc<dyn GenericGenieClient>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_deserialize_from_genie_strings() {
        let status: MessageStatus = serde_json::from_str("\"EXECUTING_QUERY\"").unwrap();
        assert_eq!(status, MessageStatus::ExecutingQuery);

        let status: MessageStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(status, MessageStatus::Completed);
    }

    #[test]
    fn unknown_status_strings_are_non_terminal() {
        let status: MessageStatus = serde_json::from_str("\"SOME_FUTURE_STAGE\"").unwrap();
        assert_eq!(status, MessageStatus::Unknown);
        assert!(!status.is_terminal());
    }

    #[test]
    fn only_finished_statuses_are_terminal() {
        for status in [MessageStatus::Completed, MessageStatus::Failed, MessageStatus::Cancelled, MessageStatus::QueryResultExpired] {
            assert!(status.is_terminal());
        }
        for status in [MessageStatus::Submitted, MessageStatus::AskingAi, MessageStatus::PendingWarehouse, MessageStatus::ExecutingQuery, MessageStatus::Unknown] {
            assert!(!status.is_terminal());
        }
    }
}
