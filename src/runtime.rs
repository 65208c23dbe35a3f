//! Runtime services and shared state for the genie-bot.

use tracing::instrument;

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{chat::ChatClient, genie::GenieClient, store::ConversationStore},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the conversation store, Genie client, chat client, and
/// configuration. It is designed to be trivially cloneable, allowing it to be
/// passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The thread → conversation store.
    pub store: ConversationStore,
    /// The Genie backend client instance.
    pub genie: GenieClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the conversation store.
        let store = ConversationStore::memory();

        // Initialize the Genie client.
        let genie = GenieClient::rest(&config)?;

        // Initialize the chat client.
        let chat = ChatClient::slack(&config, store.clone(), genie.clone()).await?;

        Ok(Self { config, store, genie, chat })
    }

    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
