//! Gmail API client with timeouts and retry logic

use async_trait::async_trait;
use google_gmail1::{
    api::{Label, Message as ApiMessage, MessagePartHeader, ModifyMessageRequest},
    hyper_rustls, hyper_util, Gmail,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{LabelerError, Result};
use crate::mime::{extract_body, MessagePart};
use crate::models::{LabelInfo, LabelType, Message};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Largest page Gmail serves for `messages.list`
const MAX_PAGE_SIZE: usize = 500;

/// Upper bound on a single Gmail API round-trip
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_RETRIES: u32 = 3;

pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Mailbox operations the labeler needs, as a trait for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// Ids of messages matching `query`, at most `limit` of them
    async fn list_message_ids(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// Fetch a message with headers picked out and the body reduced to text
    async fn get_message(&self, id: &str) -> Result<Message>;

    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a label visible in both the label list and the message list
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Add and remove labels on one message in a single update
    async fn modify_message(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;
}

pub struct ProductionGmailClient {
    hub: GmailHub,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// Check if an error is retryable
    fn should_retry(error: &LabelerError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    // honor the server's hint when it asks for a longer pause
                    let wait = match &e {
                        LabelerError::RateLimitExceeded { retry_after } => {
                            delay.max(Duration::from_secs(*retry_after))
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one API call under [`CALL_TIMEOUT`], mapping expiry to a network error
    async fn with_timeout<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(CALL_TIMEOUT, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation_name, CALL_TIMEOUT
                );
                Err(LabelerError::NetworkError(format!(
                    "API call timed out after {:?}",
                    CALL_TIMEOUT
                )))
            }
        }
    }
}

fn header_value(headers: &[MessagePartHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.value.clone())
}

/// Convert a `format=full` Gmail message into the labeler's [`Message`]
fn parse_message(msg: ApiMessage) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| LabelerError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let payload = msg.payload.unwrap_or_default();
    let headers = payload.headers.as_deref().unwrap_or_default();
    let subject = header_value(headers, "Subject");
    let sender = header_value(headers, "From");
    let body = extract_body(&MessagePart::from(&payload)).into_text();

    let mut message =
        Message::new(id, subject, body, sender).with_labels(msg.label_ids.unwrap_or_default());
    message.thread_id = msg.thread_id.unwrap_or_default();
    Ok(message)
}

fn label_type(raw: Option<&str>) -> LabelType {
    match raw {
        Some(t) if t.eq_ignore_ascii_case("system") => LabelType::System,
        _ => LabelType::User,
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_message_ids(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        while all_ids.len() < limit {
            let page_size = (limit - all_ids.len()).min(MAX_PAGE_SIZE) as u32;
            let token = page_token.clone();

            let response = Self::with_retry("list_message_ids", MAX_RETRIES, || {
                let token = token.clone();
                async move {
                    let mut call = self
                        .hub
                        .users()
                        .messages_list("me")
                        .q(query)
                        .max_results(page_size);
                    if let Some(token) = token.as_ref() {
                        call = call.page_token(token);
                    }
                    let (_, response) =
                        Self::with_timeout("messages_list", call.add_scope(MODIFY_SCOPE).doit())
                            .await?;
                    Ok(response)
                }
            })
            .await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(limit);
        debug!("Listed {} message ids for query {:?}", all_ids.len(), query);
        Ok(all_ids)
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let msg = Self::with_retry("get_message", MAX_RETRIES, || async {
            let call = self
                .hub
                .users()
                .messages_get("me", id)
                .format("full")
                .add_scope(MODIFY_SCOPE)
                .doit();
            let (_, msg) = Self::with_timeout("messages_get", call).await?;
            Ok(msg)
        })
        .await?;

        parse_message(msg)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", MAX_RETRIES, || async {
            debug!("Calling Gmail API to list labels...");
            let call = self.hub.users().labels_list("me").add_scope(LABELS_SCOPE).doit();
            let (_, response) = Self::with_timeout("labels_list", call).await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| {
                    let label_type = label_type(label.type_.as_deref());
                    match (label.id, label.name) {
                        (Some(id), Some(name)) => Some(LabelInfo {
                            id,
                            name,
                            label_type,
                        }),
                        _ => None,
                    }
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    // Sent once: a create that timed out may still have gone through
    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let call = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(LABELS_SCOPE)
            .doit();
        let (_, created_label) = Self::with_timeout("labels_create", call).await?;

        created_label
            .id
            .ok_or_else(|| LabelerError::LabelError("Created label has no ID".to_string()))
    }

    async fn modify_message(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        Self::with_retry("modify_message", MAX_RETRIES, || async {
            let request = ModifyMessageRequest {
                add_label_ids: (!add.is_empty()).then(|| add.to_vec()),
                remove_label_ids: (!remove.is_empty()).then(|| remove.to_vec()),
            };

            let call = self
                .hub
                .users()
                .messages_modify(request, "me", id)
                .add_scope(MODIFY_SCOPE)
                .doit();
            Self::with_timeout("messages_modify", call).await?;
            Ok(())
        })
        .await
    }
}

// Shared ownership between the run loop and the label manager
#[async_trait]
impl<T: GmailClient + ?Sized> GmailClient for Arc<T> {
    async fn list_message_ids(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        self.as_ref().list_message_ids(query, limit).await
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        self.as_ref().get_message(id).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.as_ref().create_label(name).await
    }

    async fn modify_message(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.as_ref().modify_message(id, add, remove).await
    }
}
