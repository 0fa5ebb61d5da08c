//! Model-backed email classification with a keyword fallback
//!
//! The pipeline for one message is: build a prompt, ask the generator for a
//! category, normalize the answer against the taxonomy, and hand over to the
//! [`FallbackClassifier`] when the model is unreachable or answers with
//! something that is not a category. [`LlmClassifier::classify_message`]
//! therefore never fails.

use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::{LabelerError, Result};
use crate::fallback::FallbackClassifier;
use crate::generator::TextGenerator;
use crate::models::{
    ClassificationOutcome, ClassificationResult, ClassificationSource, FallbackReason, Message,
};
use crate::registry::{CategoryRegistry, UNCATEGORIZED};

/// Reduce a free-text model answer to a taxonomy category
///
/// Keeps only ASCII letters, upper-cases the first and lower-cases the rest,
/// then requires an exact match. Multi-word categories collapse into one word
/// here and can never match.
pub fn normalize_label(raw: &str, registry: &CategoryRegistry) -> Option<String> {
    let letters: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();

    let mut chars = letters.chars();
    let first = chars.next()?;
    let candidate: String = first
        .to_uppercase()
        .chain(chars.flat_map(|c| c.to_lowercase()))
        .collect();

    registry.contains_exact(&candidate).then_some(candidate)
}

/// Model-first classifier that falls back to keyword rules
pub struct LlmClassifier {
    generator: Box<dyn TextGenerator>,
    registry: CategoryRegistry,
    fallback: FallbackClassifier,
    body_char_limit: usize,
    include_sender: bool,
}

impl LlmClassifier {
    pub fn new(
        generator: Box<dyn TextGenerator>,
        registry: CategoryRegistry,
        fallback: FallbackClassifier,
        config: &ModelConfig,
    ) -> Self {
        Self {
            generator,
            registry,
            fallback,
            body_char_limit: config.body_char_limit,
            include_sender: config.include_sender,
        }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn build_prompt(&self, subject: &str, body: &str, sender: &str) -> String {
        let body: String = body.chars().take(self.body_char_limit).collect();
        let categories = self.registry.with_sentinel().join(", ");

        let mut prompt = format!(
            "You are an email categorization assistant. Assign the email below to exactly one \
             of these categories: {}.\n",
            categories
        );
        if self.include_sender {
            prompt.push_str(
                "Use the sender's address as a hint: well-known companies usually send \
                 promotions or updates, personal addresses usually send personal mail.\n",
            );
        }
        prompt.push_str(&format!(
            "If the email fits none of the categories, answer \"{}\".\n\n",
            UNCATEGORIZED
        ));
        if self.include_sender {
            prompt.push_str(&format!("Sender: {}\n", sender));
        }
        prompt.push_str(&format!("Subject: {}\nBody: {}\n\n", subject, body));
        prompt.push_str("Respond with only the category name.");
        prompt
    }

    /// Ask the model for a category and return its raw answer
    ///
    /// Every backend failure is reported as [`LabelerError::ModelUnavailable`].
    pub async fn classify(&self, subject: &str, body: &str, sender: &str) -> Result<String> {
        let prompt = self.build_prompt(subject, body, sender);
        self.generator.generate(&prompt).await.map_err(|e| match e {
            LabelerError::ModelUnavailable(_) => e,
            other => LabelerError::ModelUnavailable(other.to_string()),
        })
    }

    /// Run the model path and report whether the fallback is needed
    pub async fn evaluate(&self, message: &Message) -> ClassificationOutcome {
        match self
            .classify(&message.subject, &message.body, &message.sender)
            .await
        {
            Ok(raw) => match normalize_label(&raw, &self.registry) {
                Some(category) => ClassificationOutcome::Model(category),
                None => ClassificationOutcome::FallbackNeeded(FallbackReason::InvalidLabel(raw)),
            },
            Err(e) => {
                ClassificationOutcome::FallbackNeeded(FallbackReason::ModelUnavailable(e.to_string()))
            }
        }
    }

    /// Classify one message; always produces a category
    pub async fn classify_message(&self, message: &Message) -> ClassificationResult {
        match self.evaluate(message).await {
            ClassificationOutcome::Model(category) => {
                debug!("Message {} classified by model as {}", message.id, category);
                ClassificationResult {
                    category,
                    source: ClassificationSource::Model,
                }
            }
            ClassificationOutcome::FallbackNeeded(reason) => {
                match &reason {
                    FallbackReason::ModelUnavailable(e) => {
                        warn!("Model unavailable for message {}: {}", message.id, e)
                    }
                    FallbackReason::InvalidLabel(raw) => warn!(
                        "Model returned invalid label {:?} for message {}",
                        raw, message.id
                    ),
                }
                let category = self.fallback.classify(&message.subject, &message.body);
                debug!("Message {} classified by fallback as {}", message.id, category);
                ClassificationResult {
                    category,
                    source: ClassificationSource::Fallback,
                }
            }
        }
    }
}
