pub mod memory;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

// Traits.

/// Generic conversation-store trait that backends must implement.
///
/// Holds the Slack thread → Genie conversation mapping and the per-thread
/// in-flight guard. It is passed through the runtime rather than living as a
/// module-level singleton, so a persistent or distributed backend can replace
/// the in-memory one without touching the routing logic.
#[async_trait]
pub trait GenericConversationStore: Send + Sync + 'static {
    /// The Genie conversation bound to a thread, if any.
    async fn conversation_for_thread(&self, thread_ts: &str) -> Option<String>;

    /// Bind a thread to a Genie conversation, replacing any prior binding.
    async fn bind_conversation(&self, thread_ts: &str, conversation_id: &str);

    /// Drop a thread's binding (used when the backend no longer knows it).
    async fn forget_conversation(&self, thread_ts: &str);

    /// Claim the thread for a question.
    ///
    /// Returns `false` when a question is already in flight for the thread;
    /// the caller must not start another one.
    async fn begin_question(&self, thread_ts: &str) -> bool;

    /// Release a thread claimed with [`Self::begin_question`].
    async fn finish_question(&self, thread_ts: &str);
}

// Structs.

/// Conversation store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<dyn GenericConversationStore>,
}

impl Deref for ConversationStore {
    type Target = dyn GenericConversationStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ConversationStore {
    pub fn new(inner: Arc<dyn GenericConversationStore>) -> Self {
        Self { inner }
    }
}
