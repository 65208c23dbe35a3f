//! In-memory conversation store.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{ConversationStore, GenericConversationStore};

// Extra methods on `ConversationStore` applied by the memory implementation.

impl ConversationStore {
    /// Creates a new in-memory conversation store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryConversationStore::default()))
    }
}

// Specific implementations.

/// Process-memory conversation store.
///
/// Mappings live for the lifetime of the process and are never persisted.
/// Entries for distinct threads are independent, so a pair of maps behind
/// async locks is all the coordination concurrent dispatch needs.
#[derive(Default)]
pub struct MemoryConversationStore {
    threads: RwLock<HashMap<String, String>>,
    in_flight: Mutex<HashSet<String>>,
}

#[async_trait]
impl GenericConversationStore for MemoryConversationStore {
    async fn conversation_for_thread(&self, thread_ts: &str) -> Option<String> {
        self.threads.read().await.get(thread_ts).cloned()
    }

    async fn bind_conversation(&self, thread_ts: &str, conversation_id: &str) {
        debug!("Binding thread `{thread_ts}` to conversation `{conversation_id}`.");
        self.threads.write().await.insert(thread_ts.to_string(), conversation_id.to_string());
    }

    async fn forget_conversation(&self, thread_ts: &str) {
        debug!("Forgetting conversation binding for thread `{thread_ts}`.");
        self.threads.write().await.remove(thread_ts);
    }

    async fn begin_question(&self, thread_ts: &str) -> bool {
        self.in_flight.lock().await.insert(thread_ts.to_string())
    }

    async fn finish_question(&self, thread_ts: &str) {
        self.in_flight.lock().await.remove(thread_ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_and_reads_thread_mappings() {
        let store = MemoryConversationStore::default();

        assert_eq!(store.conversation_for_thread("t1").await, None);

        store.bind_conversation("t1", "c1").await;
        assert_eq!(store.conversation_for_thread("t1").await, Some("c1".to_string()));

        // Rebinding replaces.
        store.bind_conversation("t1", "c2").await;
        assert_eq!(store.conversation_for_thread("t1").await, Some("c2".to_string()));

        store.forget_conversation("t1").await;
        assert_eq!(store.conversation_for_thread("t1").await, None);
    }

    #[tokio::test]
    async fn threads_are_independent() {
        let store = MemoryConversationStore::default();

        store.bind_conversation("t1", "c1").await;
        store.bind_conversation("t2", "c2").await;

        assert_eq!(store.conversation_for_thread("t1").await, Some("c1".to_string()));
        assert_eq!(store.conversation_for_thread("t2").await, Some("c2".to_string()));
    }

    #[tokio::test]
    async fn in_flight_guard_admits_one_question_per_thread() {
        let store = MemoryConversationStore::default();

        assert!(store.begin_question("t1").await);
        assert!(!store.begin_question("t1").await);

        // A different thread is unaffected.
        assert!(store.begin_question("t2").await);

        store.finish_question("t1").await;
        assert!(store.begin_question("t1").await);
    }
}
