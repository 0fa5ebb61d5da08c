//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_ai_labeler::client::GmailClient;
use gmail_ai_labeler::error::{LabelerError, Result};
use gmail_ai_labeler::generator::TextGenerator;
use gmail_ai_labeler::models::{LabelInfo, LabelType, Message};
use mockall::mock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Create an inbox message with the usual system labels
pub fn create_test_message(id: &str, sender: &str, subject: &str, body: &str) -> Message {
    let mut message = Message::new(
        id,
        Some(subject.to_string()),
        body,
        Some(sender.to_string()),
    )
    .with_labels(vec!["INBOX".to_string(), "UNREAD".to_string()]);
    message.thread_id = format!("thread_{}", id);
    message
}

pub fn create_invoice_message(id: &str) -> Message {
    create_test_message(
        id,
        "billing@acme.com",
        "Invoice due",
        "Please pay your invoice by Friday",
    )
}

pub fn system_label(id: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: id.to_string(),
        label_type: LabelType::System,
    }
}

pub fn user_label(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
        label_type: LabelType::User,
    }
}

/// In-memory mailbox that applies label changes, so repeated runs see the
/// effects of earlier ones
pub struct FakeMailbox {
    messages: Mutex<Vec<Message>>,
    labels: Mutex<Vec<LabelInfo>>,
    /// Message ids whose fetch fails with a server error
    broken_messages: Mutex<Vec<String>>,
    next_label: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub modify_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
            labels: Mutex::new(vec![
                system_label("INBOX"),
                system_label("UNREAD"),
                system_label("CATEGORY_UPDATES"),
            ]),
            broken_messages: Mutex::new(Vec::new()),
            next_label: AtomicUsize::new(1),
            create_calls: AtomicUsize::new(0),
            modify_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_label(self, label: LabelInfo) -> Self {
        self.labels.lock().unwrap().push(label);
        self
    }

    pub fn break_message(&self, id: &str) {
        self.broken_messages.lock().unwrap().push(id.to_string());
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn label_named(&self, name: &str) -> Option<LabelInfo> {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.name == name)
            .cloned()
    }

    pub fn user_label_count(&self) -> usize {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.label_type == LabelType::User)
            .count()
    }
}

#[async_trait]
impl GmailClient for FakeMailbox {
    async fn list_message_ids(&self, _query: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_messages.lock().unwrap().iter().any(|b| b == id) {
            return Err(LabelerError::ServerError {
                status: 503,
                message: "HTTP 503: Service Unavailable".to_string(),
            });
        }
        self.message(id)
            .ok_or_else(|| LabelerError::MessageNotFound(id.to_string()))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.labels.lock().unwrap().clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = format!("Label_{}", self.next_label.fetch_add(1, Ordering::SeqCst));
        self.labels.lock().unwrap().push(user_label(&id, name));
        Ok(id)
    }

    async fn modify_message(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| LabelerError::MessageNotFound(id.to_string()))?;

        message.label_ids.retain(|l| !remove.contains(l));
        for label in add {
            if !message.label_ids.contains(label) {
                message.label_ids.push(label.clone());
            }
        }
        Ok(())
    }
}

/// Generator that is never reachable
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(LabelerError::ModelUnavailable(
            "connection refused".to_string(),
        ))
    }
}

/// Generator answering from a subject -> answer table, counting calls
pub struct ScriptedGenerator {
    answers: HashMap<String, String>,
    default_answer: String,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new(default_answer: &str) -> Self {
        Self {
            answers: HashMap::new(),
            default_answer: default_answer.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle that keeps counting after the generator is boxed
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn answer(mut self, subject: &str, answer: &str) -> Self {
        self.answers.insert(subject.to_string(), answer.to_string());
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .answers
            .iter()
            .find(|(subject, _)| prompt.contains(&format!("Subject: {}\n", subject)))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| self.default_answer.clone());
        Ok(answer)
    }
}

// Mock implementation of GmailClient for failure injection
mock! {
    pub GmailClient {}

    #[async_trait]
    impl GmailClient for GmailClient {
        async fn list_message_ids(&self, query: &str, limit: usize) -> Result<Vec<String>>;
        async fn get_message(&self, id: &str) -> Result<Message>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn modify_message(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("msg1", "test@example.com", "Test Subject", "Body");
        assert_eq!(msg.id, "msg1");
        assert_eq!(msg.thread_id, "thread_msg1");
        assert_eq!(msg.sender, "test@example.com");
        assert_eq!(msg.label_ids, vec!["INBOX", "UNREAD"]);
    }

    #[tokio::test]
    async fn test_fake_mailbox_modify() {
        let mailbox = FakeMailbox::new(vec![create_invoice_message("m1")]);
        mailbox
            .modify_message("m1", &["Label_9".to_string()], &["INBOX".to_string()])
            .await
            .unwrap();

        let message = mailbox.message("m1").unwrap();
        assert_eq!(message.label_ids, vec!["UNREAD", "Label_9"]);
    }
}
