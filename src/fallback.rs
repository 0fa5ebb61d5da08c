//! Deterministic keyword rules used when the model path gives no usable answer

use serde::{Deserialize, Serialize};

use crate::error::{LabelerError, Result};
use crate::registry::{CategoryRegistry, UNCATEGORIZED};

/// One keyword set mapped to a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl FallbackRule {
    pub fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered keyword rule chain. The first matching rule wins, so the order of
/// `rules` decides the outcome for text that matches several keyword sets.
#[derive(Debug, Clone)]
pub struct FallbackClassifier {
    rules: Vec<FallbackRule>,
}

impl FallbackClassifier {
    /// Build the chain, lower-casing every keyword and dropping blank ones
    pub fn new(rules: Vec<FallbackRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| FallbackRule {
                category: rule.category,
                keywords: rule
                    .keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.trim().is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    /// Check that every rule maps to a category the registry accepts
    pub fn validate(&self, registry: &CategoryRegistry) -> Result<()> {
        for rule in &self.rules {
            if !registry.contains_exact(&rule.category) {
                return Err(LabelerError::ConfigError(format!(
                    "Fallback rule category '{}' is not in the taxonomy",
                    rule.category
                )));
            }
            if rule.keywords.is_empty() {
                return Err(LabelerError::ConfigError(format!(
                    "Fallback rule for '{}' has no keywords",
                    rule.category
                )));
            }
        }
        Ok(())
    }

    /// Classify by keyword containment. Never fails; no match yields `Uncategorized`.
    pub fn classify(&self, subject: &str, body: &str) -> String {
        let text = format!("{} {}", subject, body).to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| UNCATEGORIZED.to_string())
    }

    pub fn rules(&self) -> &[FallbackRule] {
        &self.rules
    }
}

impl Default for FallbackClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// Built-in priority chain: finance before promotions before work, and so on
pub fn default_rules() -> Vec<FallbackRule> {
    vec![
        FallbackRule::new(
            "Finance",
            &["invoice", "payment", "bank", "receipt", "transaction"],
        ),
        FallbackRule::new(
            "Promotions",
            &["unsubscribe", "offer", "discount", "promo", "sale"],
        ),
        FallbackRule::new(
            "Work",
            &["meeting", "deadline", "project", "schedule", "work"],
        ),
        FallbackRule::new("Personal", &["mom", "dad", "family", "home"]),
        FallbackRule::new("Social", &["friend", "party", "social", "hangout"]),
        FallbackRule::new("Updates", &["update"]),
        FallbackRule::new("Spam", &["spam", "lottery", "click here"]),
    ]
}
