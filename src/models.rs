use serde::{Deserialize, Serialize};

/// Placeholder used when a message has no Subject header
pub const NO_SUBJECT: &str = "(No Subject)";

/// Placeholder used when a message has no From header
pub const NO_SENDER: &str = "(No Sender)";

/// A message as the labeling core sees it: headers already picked out and
/// the body already reduced to plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub body: String,
    pub sender: String,
    /// Label ids currently attached to the message
    pub label_ids: Vec<String>,
}

impl Message {
    /// Build a message from optional header values, substituting the
    /// placeholders for anything missing or blank
    pub fn new(
        id: impl Into<String>,
        subject: Option<String>,
        body: impl Into<String>,
        sender: Option<String>,
    ) -> Self {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Self {
            id: id.into(),
            thread_id: String::new(),
            subject: non_blank(subject).unwrap_or_else(|| NO_SUBJECT.to_string()),
            body: body.into(),
            sender: non_blank(sender).unwrap_or_else(|| NO_SENDER.to_string()),
            label_ids: Vec::new(),
        }
    }

    pub fn with_labels(mut self, label_ids: Vec<String>) -> Self {
        self.label_ids = label_ids;
        self
    }

    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            sender: self.sender.clone(),
            subject: self.subject.clone(),
        }
    }
}

/// Sender/subject pair fed to the category suggestion engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub sender: String,
    pub subject: String,
}

/// Whether a label is reserved by Gmail or created by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelType {
    System,
    User,
}

/// Label as returned by the label store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
    pub label_type: LabelType,
}

/// Where a final category came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationSource {
    Model,
    Fallback,
}

/// Final category for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub source: ClassificationSource,
}

/// Why the model path could not produce a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Transport or backend failure
    ModelUnavailable(String),
    /// The model answered with something that is not in the taxonomy
    InvalidLabel(String),
}

/// Result of the model path, before the fallback decision is taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationOutcome {
    Model(String),
    FallbackNeeded(FallbackReason),
}
