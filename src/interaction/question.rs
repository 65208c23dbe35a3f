//! The question flow: Slack thread → Genie → rendered reply.

use tracing::{Instrument, error, instrument, warn};

use crate::{
    base::{
        render::render_answer,
        types::{FeedbackTarget, MessageHandle, Void},
    },
    service::{
        chat::ChatClient,
        genie::{GenieClient, GenieError},
        store::ConversationStore,
    },
};

/// A user question extracted from a chat event.
#[derive(Debug, Clone)]
pub struct QuestionEvent {
    /// Channel the question was asked in.
    pub channel_id: String,
    /// Timestamp of the asking message itself.
    pub ts: String,
    /// Thread root the reply goes to (equals `ts` for top-level messages).
    pub thread_ts: String,
    /// Raw message text, mention markup included.
    pub text: String,
}

/// Handles a question event.
///
/// Spawns a task so the socket listener is never blocked by the poll loop;
/// errors are logged, not surfaced.
#[instrument(skip_all)]
pub fn handle_question(event: QuestionEvent, store: ConversationStore, genie: GenieClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the event.
        let result = answer_question(&event, &store, &genie, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

/// Run one question through Genie and post the outcome to the thread.
#[instrument(skip_all)]
pub async fn answer_question(event: &QuestionEvent, store: &ConversationStore, genie: &GenieClient, chat: &ChatClient) -> Void {
    let question = strip_mentions(&event.text);

    if question.is_empty() {
        return chat.send_message(&event.channel_id, &event.thread_ts, "Ask me a question about your data and I'll run it past Genie.").await;
    }

    // One question at a time per thread; reject rather than queue.
    if !store.begin_question(&event.thread_ts).await {
        return chat
            .send_message(&event.channel_id, &event.thread_ts, "I'm still working on the previous question in this thread. One moment.")
            .await;
    }

    let outcome = run_question(event, &question, store, genie, chat).await;
    store.finish_question(&event.thread_ts).await;

    outcome
}

async fn run_question(event: &QuestionEvent, question: &str, store: &ConversationStore, genie: &GenieClient, chat: &ChatClient) -> Void {
    // Let the asker know we are on it without posting an extra message.
    let _ = chat.react_to_message(&event.channel_id, &event.ts, "hourglass_flowing_sand").await;

    let handle = match submit_question(store, genie, &event.thread_ts, question).await {
        Ok(handle) => handle,
        Err(err) => {
            error!("Failed to submit question: {}", err);
            return chat.send_message(&event.channel_id, &event.thread_ts, &user_facing_error(&err)).await;
        }
    };

    // Bind before waiting: even a timed-out message leaves the thread with a
    // usable conversation for follow-ups.
    store.bind_conversation(&event.thread_ts, &handle.conversation_id).await;

    match genie.wait_for_answer(&handle, genie.answer_deadline()).await {
        Ok(answer) => {
            chat.send_message(&event.channel_id, &event.thread_ts, &render_answer(&answer)).await?;
            chat.send_feedback_prompt(&event.channel_id, &event.thread_ts, &FeedbackTarget::from_handle(&handle)).await
        }
        Err(err) => {
            warn!("No answer for message `{}`: {}", handle.message_id, err);
            chat.send_message(&event.channel_id, &event.thread_ts, &user_facing_error(&err)).await
        }
    }
}

/// Submit the question, reusing the thread's conversation when one is bound.
///
/// A stale binding (the backend forgot the conversation) is dropped and the
/// question retried as a fresh conversation instead of failing the user.
async fn submit_question(store: &ConversationStore, genie: &GenieClient, thread_ts: &str, question: &str) -> Result<MessageHandle, GenieError> {
    match store.conversation_for_thread(thread_ts).await {
        Some(conversation_id) => match genie.continue_conversation(&conversation_id, question).await {
            Err(GenieError::ConversationNotFound { .. }) => {
                warn!("Conversation for thread `{thread_ts}` is stale; starting fresh.");
                store.forget_conversation(thread_ts).await;

                genie.start_conversation(question).await
            }
            other => other,
        },
        None => genie.start_conversation(question).await,
    }
}

/// What the user sees when a question cannot be answered.
fn user_facing_error(err: &GenieError) -> String {
    match err {
        GenieError::Timeout { .. } => "Genie is still working on that one. Give it a moment and ask again.".to_string(),
        GenieError::Auth { .. } => "I couldn't authenticate with Genie. The operator has been notified.".to_string(),
        GenieError::Backend { .. } | GenieError::Failed { .. } => format!("Sorry, Genie couldn't answer that: {err}"),
        _ => "Sorry, something went wrong answering that. Please try asking again.".to_string(),
    }
}

/// Drop `<@U...>` mention markup and surrounding whitespace.
fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn strips_leading_mention() {
        assert_eq!(strip_mentions("<@U12345> what is total revenue?"), "what is total revenue?");
    }

    #[test]
    fn strips_every_mention_but_keeps_the_question() {
        assert_eq!(strip_mentions("hey <@U12345>, ask <@U67890> about revenue"), "hey , ask  about revenue");
    }

    #[test]
    fn bare_mention_strips_to_empty() {
        assert_eq!(strip_mentions("<@U12345>"), "");
        assert_eq!(strip_mentions("   "), "");
    }

    #[test]
    fn unterminated_mention_markup_is_left_alone() {
        assert_eq!(strip_mentions("what about <@U123"), "what about <@U123");
    }

    #[test]
    fn timeout_gets_a_try_again_message() {
        let err = GenieError::Timeout {
            message_id: "m1".to_string(),
            waited: Duration::from_secs(90),
        };

        assert!(user_facing_error(&err).contains("still working"));
    }

    #[test]
    fn backend_errors_carry_short_detail() {
        let err = GenieError::Backend {
            status: 500,
            message: "warehouse down".to_string(),
        };

        assert!(user_facing_error(&err).contains("warehouse down"));
    }
}
