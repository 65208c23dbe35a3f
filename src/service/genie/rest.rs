//! REST implementation of the Genie backend client.
//!
//! This module holds all HTTP interaction with the Databricks Genie
//! conversation API: submitting questions, polling message status, fetching
//! query-result rows, and forwarding feedback. Everything else in the
//! application works against the normalized [`Answer`] shape.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::base::{
    config::Config,
    types::{Answer, FeedbackTarget, MessageHandle, Polarity, QueryTable, Res},
};

use super::{GenericGenieClient, GenieClient, GenieError, MessageStatus};

// Extra methods on `GenieClient` applied by the rest implementation.

impl GenieClient {
    /// Creates a new REST-backed Genie client.
    pub fn rest(config: &Config) -> Res<Self> {
        let client = RestGenieClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }
}

// Wire types.

/// Response to `start-conversation`.
#[derive(Debug, Deserialize)]
struct StartConversationResponse {
    conversation: ConversationRef,
    message: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct ConversationRef {
    id: String,
}

/// Follow-up submissions come back either as a bare message or nested under
/// a `message` key, depending on the endpoint generation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateMessageResponse {
    Nested { message: MessagePayload },
    Flat(MessagePayload),
}

impl CreateMessageResponse {
    fn into_message(self) -> MessagePayload {
        match self {
            Self::Nested { message } => message,
            Self::Flat(message) => message,
        }
    }
}

/// One Genie message as reported by the poll endpoint.
#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    status: MessageStatus,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    attachments: Option<Vec<AttachmentPayload>>,
    #[serde(default)]
    error: Option<MessageError>,
}

#[derive(Debug, Deserialize)]
struct MessageError {
    #[serde(default)]
    message: Option<String>,
}

/// A completed message attaches either a text answer or a query reference.
#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    #[serde(default)]
    attachment_id: Option<String>,
    #[serde(default)]
    text: Option<TextAttachment>,
    #[serde(default)]
    query: Option<QueryAttachment>,
}

#[derive(Debug, Deserialize)]
struct TextAttachment {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct QueryAttachment {
    #[serde(default)]
    description: Option<String>,
}

/// Query-result rows and schema; newer endpoints nest these under
/// `statement_response`.
#[derive(Debug, Deserialize)]
struct QueryResultResponse {
    #[serde(default)]
    statement_response: Option<StatementResponse>,
    #[serde(default)]
    manifest: Option<ResultManifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    manifest: Option<ResultManifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct ResultManifest {
    #[serde(default)]
    schema: Option<ResultSchema>,
}

#[derive(Debug, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    columns: Vec<ColumnMeta>,
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
    #[serde(default)]
    row_count: Option<usize>,
}

// Specific implementations.

/// REST Genie client implementation.
#[derive(Clone)]
pub struct RestGenieClient {
    http: reqwest::Client,
    space_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl RestGenieClient {
    /// Create a new REST Genie client from configuration.
    pub fn new(config: &Config) -> Res<Self> {
        Self::with_timing(
            &config.databricks_host,
            &config.databricks_token,
            &config.genie_space_id,
            config.poll_interval(),
            config.max_wait(),
        )
    }

    fn with_timing(host: &str, token: &str, space_id: &str, poll_interval: Duration, max_wait: Duration) -> Res<Self> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        let space_url = format!("{}/api/2.0/genie/spaces/{}", host.trim_end_matches('/'), space_id);

        Ok(Self { http, space_url, poll_interval, max_wait })
    }

    /// Map a non-2xx response to the error taxonomy, consuming the body for context.
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, GenieError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let message: String = response.text().await.unwrap_or_default().chars().take(500).collect();

        if code == 401 || code == 403 {
            error!("Genie rejected the configured credentials (http {code}).");
            return Err(GenieError::Auth { status: code });
        }

        error!("Genie request failed (http {code}): {message}");
        Err(GenieError::Backend { status: code, message })
    }

    /// Fetch the current state of a message.
    async fn fetch_message(&self, handle: &MessageHandle) -> Result<MessagePayload, GenieError> {
        let url = format!("{}/conversations/{}/messages/{}", self.space_url, handle.conversation_id, handle.message_id);
        let response = self.check(self.http.get(url).send().await?).await?;

        Ok(response.json().await?)
    }

    /// Fetch the query-result rows for an attachment.
    async fn fetch_query_result(&self, handle: &MessageHandle, attachment_id: &str) -> Result<QueryResultResponse, GenieError> {
        let url = format!(
            "{}/conversations/{}/messages/{}/attachments/{}/query-result",
            self.space_url, handle.conversation_id, handle.message_id, attachment_id
        );
        let response = self.check(self.http.get(url).send().await?).await?;

        Ok(response.json().await?)
    }

    /// Normalize a completed message into an [`Answer`].
    ///
    /// Text attachments and query descriptions are joined into a summary; a
    /// query attachment additionally pulls its result rows. A failed result
    /// fetch degrades to the text answer rather than failing the question.
    async fn assemble_answer(&self, handle: &MessageHandle, message: MessagePayload) -> Result<Answer, GenieError> {
        let mut text_parts: Vec<String> = Vec::new();
        let mut table = None;

        for attachment in message.attachments.unwrap_or_default() {
            if let Some(text) = attachment.text
                && !text.content.is_empty()
            {
                text_parts.push(text.content);
            }

            if let Some(query) = attachment.query {
                if let Some(description) = query.description
                    && !description.is_empty()
                {
                    text_parts.push(description);
                }

                if let Some(attachment_id) = attachment.attachment_id {
                    match self.fetch_query_result(handle, &attachment_id).await {
                        Ok(response) => table = normalize_table(response),
                        Err(err) => warn!("Failed to fetch query result for attachment `{attachment_id}`: {err}"),
                    }
                }
            }
        }

        let summary = (!text_parts.is_empty()).then(|| text_parts.join("\n\n"));

        match table {
            Some(table) => Ok(Answer::Table { summary, table }),
            None => Ok(Answer::Text {
                text: summary.or(message.content).unwrap_or_default(),
            }),
        }
    }
}

/// Flatten a query-result response into a [`QueryTable`].
///
/// Returns `None` when the response carries no columns or no rows, which the
/// caller treats as a text-only answer.
fn normalize_table(response: QueryResultResponse) -> Option<QueryTable> {
    let (manifest, result) = match response.statement_response {
        Some(statement) => (statement.manifest, statement.result),
        None => (response.manifest, response.result),
    };

    let columns: Vec<String> = manifest?.schema?.columns.into_iter().map(|c| c.name).collect();
    let result = result?;

    if columns.is_empty() || result.data_array.is_empty() {
        return None;
    }

    let total_rows = result.row_count.unwrap_or(result.data_array.len());

    Some(QueryTable {
        columns,
        rows: result.data_array,
        total_rows,
    })
}

#[async_trait]
impl GenericGenieClient for RestGenieClient {
    #[instrument(skip(self, question))]
    async fn start_conversation(&self, question: &str) -> Result<MessageHandle, GenieError> {
        let url = format!("{}/start-conversation", self.space_url);
        let response = self.check(self.http.post(url).json(&json!({ "content": question })).send().await?).await?;

        let body: StartConversationResponse = response.json().await?;

        info!("Started Genie conversation `{}`.", body.conversation.id);

        Ok(MessageHandle {
            conversation_id: body.message.conversation_id.unwrap_or(body.conversation.id),
            message_id: body.message.id,
        })
    }

    #[instrument(skip(self, question))]
    async fn continue_conversation(&self, conversation_id: &str, question: &str) -> Result<MessageHandle, GenieError> {
        let url = format!("{}/conversations/{}/messages", self.space_url, conversation_id);
        let response = self.http.post(url).json(&json!({ "content": question })).send().await?;

        if response.status().as_u16() == 404 {
            warn!("Genie does not know conversation `{conversation_id}`.");
            return Err(GenieError::ConversationNotFound {
                conversation_id: conversation_id.to_string(),
            });
        }

        let message = self.check(response).await?.json::<CreateMessageResponse>().await?.into_message();

        Ok(MessageHandle {
            conversation_id: message.conversation_id.unwrap_or_else(|| conversation_id.to_string()),
            message_id: message.id,
        })
    }

    #[instrument(skip(self, deadline))]
    async fn wait_for_answer(&self, handle: &MessageHandle, deadline: Instant) -> Result<Answer, GenieError> {
        loop {
            let message = self.fetch_message(handle).await?;

            match message.status {
                MessageStatus::Completed => return self.assemble_answer(handle, message).await,
                status if status.is_terminal() => {
                    let detail = message.error.and_then(|e| e.message).unwrap_or_default();
                    warn!("Message `{}` finished with status {status:?}: {detail}", handle.message_id);

                    return Err(GenieError::Failed {
                        message_id: handle.message_id.clone(),
                        status,
                    });
                }
                status => debug!("Message `{}` still {status:?}.", handle.message_id),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("Timed out waiting for message `{}`.", handle.message_id);

                return Err(GenieError::Timeout {
                    message_id: handle.message_id.clone(),
                    waited: self.max_wait,
                });
            }

            // Sleep one interval, clamped so the final poll lands on the deadline.
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    #[instrument(skip(self))]
    async fn submit_feedback(&self, target: &FeedbackTarget, polarity: Polarity) {
        let url = format!("{}/conversations/{}/messages/{}/feedback", self.space_url, target.conversation_id, target.message_id);

        let result = async {
            self.check(self.http.post(url).json(&json!({ "rating": polarity })).send().await?).await?;
            Ok::<_, GenieError>(())
        }
        .await;

        match result {
            Ok(()) => info!("Forwarded {polarity:?} feedback for message `{}`.", target.message_id),
            Err(err) => warn!("Failed to submit feedback for message `{}`: {err}", target.message_id),
        }
    }

    fn answer_deadline(&self) -> Instant {
        Instant::now() + self.max_wait
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    const SPACE_PATH: &str = "/api/2.0/genie/spaces/s1";

    fn test_client(server: &MockServer, poll_ms: u64, max_wait_ms: u64) -> RestGenieClient {
        RestGenieClient::with_timing(
            &server.base_url(),
            "test-token",
            "s1",
            Duration::from_millis(poll_ms),
            Duration::from_millis(max_wait_ms),
        )
        .unwrap()
    }

    fn handle() -> MessageHandle {
        MessageHandle {
            conversation_id: "c1".to_string(),
            message_id: "m1".to_string(),
        }
    }

    #[tokio::test]
    async fn start_conversation_extracts_both_ids() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("{SPACE_PATH}/start-conversation"))
                    .header("authorization", "Bearer test-token")
                    .json_body(json!({ "content": "What is total revenue?" }));
                then.status(200).json_body(json!({
                    "conversation": { "id": "c1" },
                    "message": { "id": "m1", "conversation_id": "c1", "status": "SUBMITTED" }
                }));
            })
            .await;

        let client = test_client(&server, 10, 50);
        let handle = client.start_conversation("What is total revenue?").await.unwrap();

        mock.assert_async().await;
        assert_eq!(handle, MessageHandle { conversation_id: "c1".to_string(), message_id: "m1".to_string() });
    }

    #[tokio::test]
    async fn bad_credentials_map_to_auth_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("{SPACE_PATH}/start-conversation"));
                then.status(401).body("invalid token");
            })
            .await;

        let client = test_client(&server, 10, 50);
        let err = client.start_conversation("hi").await.unwrap_err();

        assert!(matches!(err, GenieError::Auth { status: 401 }));
    }

    #[tokio::test]
    async fn unknown_conversation_maps_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("{SPACE_PATH}/conversations/gone/messages"));
                then.status(404).body("conversation not found");
            })
            .await;

        let client = test_client(&server, 10, 50);
        let err = client.continue_conversation("gone", "and this?").await.unwrap_err();

        assert!(matches!(err, GenieError::ConversationNotFound { conversation_id } if conversation_id == "gone"));
    }

    #[tokio::test]
    async fn follow_up_accepts_flat_message_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("{SPACE_PATH}/conversations/c1/messages"));
                then.status(200).json_body(json!({ "id": "m2", "status": "SUBMITTED" }));
            })
            .await;

        let client = test_client(&server, 10, 50);
        let handle = client.continue_conversation("c1", "and by region?").await.unwrap();

        assert_eq!(handle, MessageHandle { conversation_id: "c1".to_string(), message_id: "m2".to_string() });
    }

    #[tokio::test]
    async fn completed_text_answer_normalizes_to_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1"));
                then.status(200).json_body(json!({
                    "id": "m1",
                    "status": "COMPLETED",
                    "attachments": [ { "text": { "content": "Total revenue was $4M." } } ]
                }));
            })
            .await;

        let client = test_client(&server, 10, 50);
        let answer = client.wait_for_answer(&handle(), client.answer_deadline()).await.unwrap();

        assert_eq!(answer, Answer::Text { text: "Total revenue was $4M.".to_string() });
    }

    #[tokio::test]
    async fn completed_query_answer_fetches_rows_and_normalizes_to_table() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1"));
                then.status(200).json_body(json!({
                    "id": "m1",
                    "status": "COMPLETED",
                    "attachments": [ {
                        "attachment_id": "a1",
                        "query": { "description": "Revenue by region." }
                    } ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1/attachments/a1/query-result"));
                then.status(200).json_body(json!({
                    "statement_response": {
                        "manifest": { "schema": { "columns": [ { "name": "region" }, { "name": "revenue" } ] } },
                        "result": {
                            "data_array": [ ["emea", "100"], ["amer", "250"], ["apac", "75"] ],
                            "row_count": 3
                        }
                    }
                }));
            })
            .await;

        let client = test_client(&server, 10, 50);
        let answer = client.wait_for_answer(&handle(), client.answer_deadline()).await.unwrap();

        let Answer::Table { summary, table } = answer else {
            panic!("expected a table answer");
        };
        assert_eq!(summary.as_deref(), Some("Revenue by region."));
        assert_eq!(table.columns, vec!["region", "revenue"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.total_rows, 3);
    }

    #[tokio::test]
    async fn failed_query_result_fetch_degrades_to_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1"));
                then.status(200).json_body(json!({
                    "id": "m1",
                    "status": "COMPLETED",
                    "attachments": [ {
                        "attachment_id": "a1",
                        "text": { "content": "Here is the revenue breakdown." },
                        "query": { "description": "Revenue by region." }
                    } ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1/attachments/a1/query-result"));
                then.status(500).body("warehouse unavailable");
            })
            .await;

        let client = test_client(&server, 10, 50);
        let answer = client.wait_for_answer(&handle(), client.answer_deadline()).await.unwrap();

        assert_eq!(answer, Answer::Text { text: "Here is the revenue breakdown.\n\nRevenue by region.".to_string() });
    }

    #[tokio::test]
    async fn terminal_failure_surfaces_as_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1"));
                then.status(200).json_body(json!({
                    "id": "m1",
                    "status": "FAILED",
                    "error": { "message": "SQL generation failed" }
                }));
            })
            .await;

        let client = test_client(&server, 10, 50);
        let err = client.wait_for_answer(&handle(), client.answer_deadline()).await.unwrap_err();

        assert!(matches!(err, GenieError::Failed { status: MessageStatus::Failed, .. }));
    }

    #[tokio::test]
    async fn stuck_message_times_out_within_the_poll_budget() {
        let server = MockServer::start_async().await;
        let status_mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SPACE_PATH}/conversations/c1/messages/m1"));
                then.status(200).json_body(json!({ "id": "m1", "status": "EXECUTING_QUERY" }));
            })
            .await;

        // 100ms budget at 30ms intervals: at most ceil(100 / 30) + 1 = 5 fetches.
        let client = test_client(&server, 30, 100);
        let err = client.wait_for_answer(&handle(), client.answer_deadline()).await.unwrap_err();

        assert!(matches!(err, GenieError::Timeout { .. }));
        let hits = status_mock.hits_async().await;
        assert!(hits >= 2, "expected repeated polling, got {hits}");
        assert!(hits <= 5, "polled {hits} times, budget is 5");
    }

    #[tokio::test]
    async fn feedback_failure_is_swallowed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("{SPACE_PATH}/conversations/c1/messages/m1/feedback"));
                then.status(500).body("nope");
            })
            .await;

        let client = test_client(&server, 10, 50);
        let target = FeedbackTarget { conversation_id: "c1".to_string(), message_id: "m1".to_string() };

        // Returns unit either way.
        client.submit_feedback(&target, Polarity::Positive).await;
    }

    #[tokio::test]
    async fn feedback_posts_the_rating() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("{SPACE_PATH}/conversations/c1/messages/m1/feedback"))
                    .json_body(json!({ "rating": "NEGATIVE" }));
                then.status(200).json_body(json!({}));
            })
            .await;

        let client = test_client(&server, 10, 50);
        let target = FeedbackTarget { conversation_id: "c1".to_string(), message_id: "m1".to_string() };
        client.submit_feedback(&target, Polarity::Negative).await;

        mock.assert_async().await;
    }
}
