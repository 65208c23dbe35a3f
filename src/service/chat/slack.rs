//! Chat service integration for genie-bot.
//!
//! This module provides functionality for interacting with chat platforms like Slack:
//! - Receiving question events (mentions, DMs, thread replies)
//! - Receiving feedback button clicks
//! - Sending, updating, and reacting to messages
//!
//! It implements the `GenericChatClient` trait for Slack over socket mode.

use crate::{
    base::{
        config::Config,
        types::{FeedbackTarget, Polarity, Res, Void},
    },
    interaction::{
        feedback::{FeedbackEvent, handle_feedback},
        question::{QuestionEvent, handle_question},
    },
    service::{genie::GenieClient, store::ConversationStore},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{info, instrument, warn};

use std::{ops::Deref, sync::Arc};

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Block action ids carried by the feedback buttons.

pub const FEEDBACK_POSITIVE_ACTION: &str = "feedback_positive";
pub const FEEDBACK_NEGATIVE_ACTION: &str = "feedback_negative";

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, store: ConversationStore, genie: GenieClient) -> Res<Self> {
        let client = SlackChatClient::new(config, store, genie).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    store: ConversationStore,
    genie: GenieClient,
    chat: ChatClient,
    bot_user_id: String,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    bot_user_id: String,
    client: Arc<FullClient>,
    store: ConversationStore,
    genie: GenieClient,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, store: ConversationStore, genie: GenieClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            store,
            genie,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            store: self.store.clone(),
            genie: self.genie.clone(),
            chat: ChatClient::from(self.clone()),
            bot_user_id: self.bot_user_id.clone(),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections calling Slack API to get WS url for the token,
        // and wait for Ctrl-C to shutdown.
        // There are also `.start()`/`.shutdown()` available to manage manually
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
            .with_as_user(true)
            .with_thread_ts(SlackTs(thread_ts.to_string()))
            .with_link_names(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, target))]
    async fn send_feedback_prompt(&self, channel_id: &str, thread_ts: &str, target: &FeedbackTarget) -> Void {
        let value = target.encode();

        let blocks: Vec<SlackBlock> = slack_blocks![
            some_into(SlackSectionBlock::new().with_text(md!("*Was this answer helpful?*"))),
            some_into(SlackActionsBlock::new(slack_blocks![
                some_into(SlackBlockButtonElement::new(FEEDBACK_POSITIVE_ACTION.into(), pt!("Helpful")).with_value(value.clone())),
                some_into(SlackBlockButtonElement::new(FEEDBACK_NEGATIVE_ACTION.into(), pt!("Not helpful")).with_value(value))
            ]))
        ];

        let message = SlackMessageContent::new().with_text("Was this answer helpful?".to_string()).with_blocks(blocks);

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
            .with_as_user(true)
            .with_thread_ts(SlackTs(thread_ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send feedback prompt: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn update_message(&self, channel_id: &str, ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatUpdateRequest::new(SlackChannelId(channel_id.to_string()), message, SlackTs(ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_update(&request).await.map_err(|e| anyhow::anyhow!("Failed to update message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn react_to_message(&self, channel_id: &str, ts: &str, emoji: &str) -> Void {
        let request = SlackApiReactionsAddRequest {
            channel: SlackChannelId(channel_id.to_string()),
            name: SlackReactionName(emoji.to_string()),
            timestamp: SlackTs(ts.to_string()),
        };

        let session = self.client.open_session(&self.bot_token);

        let _ = session.reactions_add(&request).await.map_err(|e| anyhow::anyhow!("Failed to react to message: {}", e))?;

        Ok(())
    }
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    warn!("[COMMAND] {:#?}", event);
    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text("No app commands are currently supported.".into())))
}

/// Handles interaction events from Slack (feedback button clicks).
#[instrument(skip_all)]
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackInteractionEvent::BlockActions(block_actions) => {
            let Some(actions) = &block_actions.actions else {
                return Ok(());
            };

            for action in actions {
                let polarity = match action.action_id.0.as_str() {
                    FEEDBACK_POSITIVE_ACTION => Polarity::Positive,
                    FEEDBACK_NEGATIVE_ACTION => Polarity::Negative,
                    _ => continue,
                };

                let Some(value) = action.value.clone() else {
                    warn!("Feedback action without a value; ignoring.");
                    continue;
                };

                // The prompt message's channel and ts come from the action container.
                let (channel_id, message_ts) = match &block_actions.container {
                    SlackInteractionActionContainer::Message(container) => {
                        let channel_id = block_actions
                            .channel
                            .as_ref()
                            .map(|c| c.id.0.clone())
                            .or_else(|| container.channel_id.as_ref().map(|c| c.0.clone()));

                        (channel_id, container.message_ts.0.clone())
                    }
                    _ => {
                        warn!("Feedback action outside a message container; ignoring.");
                        continue;
                    }
                };

                let Some(channel_id) = channel_id else {
                    warn!("Feedback action without a channel; ignoring.");
                    continue;
                };

                handle_feedback(
                    FeedbackEvent {
                        channel_id,
                        message_ts,
                        value,
                        polarity,
                    },
                    user_state.genie.clone(),
                    user_state.chat.clone(),
                );
            }
        }
        _ => {
            warn!("Received unhandled interaction event.")
        }
    }

    Ok(())
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            // The bot's own replies also arrive as message events; never answer those.
            if slack_message_event.sender.bot_id.is_some() {
                return Ok(());
            }

            let text = slack_message_event.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default();

            // If the message @mentions the bot, skip, and let the app mention handler take care of it.
            if text.contains(&user_state.bot_user_id) {
                return Ok(());
            }

            // Only answer direct messages and thread replies; ambient channel chatter is not for us.
            let is_dm = slack_message_event.origin.channel_type.as_ref().is_some_and(|ct| ct.0 == "im");
            let in_thread = slack_message_event.origin.thread_ts.is_some();
            if !is_dm && !in_thread {
                return Ok(());
            }

            let channel_id = slack_message_event.origin.channel.as_ref().ok_or(anyhow::anyhow!("Failed to get channel ID"))?.0.to_owned();
            let ts = slack_message_event.origin.ts.0.clone();
            let thread_ts = slack_message_event.origin.thread_ts.clone().map(|t| t.0).unwrap_or_else(|| ts.clone());

            handle_question(
                QuestionEvent { channel_id, ts, thread_ts, text },
                user_state.store.clone(),
                user_state.genie.clone(),
                user_state.chat.clone(),
            );
        }
        SlackEventCallbackBody::AppMention(slack_app_mention_event) => {
            info!("Received app mention event ...");

            let channel_id = slack_app_mention_event.channel.0.to_owned();
            let text = slack_app_mention_event.content.text.clone().unwrap_or_default();
            let ts = slack_app_mention_event.origin.ts.0.clone();
            let thread_ts = slack_app_mention_event.origin.thread_ts.clone().map(|t| t.0).unwrap_or_else(|| ts.clone());

            handle_question(
                QuestionEvent { channel_id, ts, thread_ts, text },
                user_state.store.clone(),
                user_state.genie.clone(),
                user_state.chat.clone(),
            );
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}
