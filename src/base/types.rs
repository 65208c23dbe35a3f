//! Common types and result aliases shared across the genie-bot.

use serde::{Deserialize, Serialize};

/// Boxed error type used throughout the crate.
pub type Err = anyhow::Error;
/// Result type parameterized over the crate's [`Err`].
pub type Res<T> = Result<T, Err>;
/// A result carrying no success value.
pub type Void = Res<()>;

/// Identifies one in-flight question on the Genie side.
///
/// Returned when a question is submitted, and required by every subsequent
/// call about that question (polling, query results, feedback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Genie conversation this question belongs to.
    pub conversation_id: String,
    /// Genie message id for this question.
    pub message_id: String,
}

/// A normalized Genie answer.
///
/// Genie attaches either a plain text answer or a reference to tabular query
/// results; the client resolves that into one of these two shapes so the
/// router never inspects raw attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Answer {
    /// A plain-text answer.
    Text {
        /// The answer text.
        text: String,
    },
    /// A tabular answer with an optional summary.
    Table {
        /// Optional natural-language summary of the table.
        summary: Option<String>,
        /// The resolved query results.
        table: QueryTable,
    },
}

/// Tabular query results: named columns and ordered rows.
///
/// `total_rows` is the backend-reported count, which may exceed `rows.len()`
/// when the result set was truncated upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTable {
    /// Named columns, in order.
    pub columns: Vec<String>,
    /// Ordered rows, each aligned to `columns`.
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Backend-reported total row count, which may exceed `rows.len()`.
    pub total_rows: usize,
}

/// Feedback direction for a Genie answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    /// Thumbs-up feedback.
    Positive,
    /// Thumbs-down feedback.
    Negative,
}

/// The Genie message a feedback button points at.
///
/// Encoded into the button's action value when the prompt is posted, and
/// decoded back out of the interaction payload on click, so no local state
/// has to survive between the two events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTarget {
    /// Genie conversation the feedback targets.
    pub conversation_id: String,
    /// Genie message the feedback targets.
    pub message_id: String,
}

impl FeedbackTarget {
    /// Build a target from an in-flight message handle.
    pub fn from_handle(handle: &MessageHandle) -> Self {
        Self {
            conversation_id: handle.conversation_id.clone(),
            message_id: handle.message_id.clone(),
        }
    }

    /// Serialize for use as a block-action value.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode from a block-action value.
    pub fn decode(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_target_round_trips_through_action_value() {
        let target = FeedbackTarget {
            conversation_id: "conv-1".to_string(),
            message_id: "msg-1".to_string(),
        };

        let decoded = FeedbackTarget::decode(&target.encode()).unwrap();

        assert_eq!(decoded, target);
    }

    #[test]
    fn feedback_target_decode_rejects_garbage() {
        assert!(FeedbackTarget::decode("not json").is_none());
        assert!(FeedbackTarget::decode("{\"conversation_id\":\"c\"}").is_none());
    }

    #[test]
    fn polarity_serializes_to_genie_rating_strings() {
        assert_eq!(serde_json::to_string(&Polarity::Positive).unwrap(), "\"POSITIVE\"");
        assert_eq!(serde_json::to_string(&Polarity::Negative).unwrap(), "\"NEGATIVE\"");
    }
}
