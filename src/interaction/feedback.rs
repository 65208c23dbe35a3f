//! The feedback flow: button click → Genie feedback endpoint → acknowledgement.

use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::types::{FeedbackTarget, Polarity, Void},
    service::{chat::ChatClient, genie::GenieClient},
};

/// A feedback button click extracted from an interaction event.
#[derive(Debug, Clone)]
pub struct FeedbackEvent {
    /// Channel holding the feedback prompt message.
    pub channel_id: String,
    /// Timestamp of the prompt message (the one to acknowledge).
    pub message_ts: String,
    /// Encoded [`FeedbackTarget`] from the button value.
    pub value: String,
    /// Which button was clicked.
    pub polarity: Polarity,
}

/// Handles a feedback button click.
#[instrument(skip_all)]
pub fn handle_feedback(event: FeedbackEvent, genie: GenieClient, chat: ChatClient) {
    tokio::spawn(async move {
        // Process the event.
        let result = process_feedback(&event, &genie, &chat).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

/// Forward the feedback and acknowledge on the prompt message.
///
/// Repeated clicks simply re-send the feedback; the acknowledgement update is
/// idempotent.
#[instrument(skip_all)]
pub async fn process_feedback(event: &FeedbackEvent, genie: &GenieClient, chat: &ChatClient) -> Void {
    let Some(target) = FeedbackTarget::decode(&event.value) else {
        warn!("Feedback click with undecodable value `{}`; ignoring.", event.value);
        return Ok(());
    };

    info!("Forwarding {:?} feedback for message `{}`.", event.polarity, target.message_id);

    // Best-effort by contract; the user always gets the acknowledgement.
    genie.submit_feedback(&target, event.polarity).await;

    chat.update_message(&event.channel_id, &event.message_ts, "Thanks for the feedback!").await
}
