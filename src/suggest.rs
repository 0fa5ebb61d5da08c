//! Proposes new categories from a sample of unlabeled mail

use tracing::{debug, info};

use crate::config::SuggestionConfig;
use crate::error::Result;
use crate::generator::TextGenerator;
use crate::models::MessageSummary;
use crate::registry::CategoryRegistry;

/// Longest category name, in words, a suggestion may have
const MAX_SUGGESTION_WORDS: usize = 2;

/// Asks the model for category names the current taxonomy is missing
pub struct CategorySuggester {
    generator: Box<dyn TextGenerator>,
    max_summaries: usize,
    max_suggestions: usize,
}

impl CategorySuggester {
    pub fn new(generator: Box<dyn TextGenerator>, config: &SuggestionConfig) -> Self {
        Self {
            generator,
            max_summaries: config.max_summaries,
            max_suggestions: config.max_suggestions,
        }
    }

    pub fn build_prompt(&self, summaries: &[MessageSummary], registry: &CategoryRegistry) -> String {
        let lines = summaries
            .iter()
            .take(self.max_summaries)
            .enumerate()
            .map(|(i, s)| format!("{}. From: {} | Subject: {}", i + 1, s.sender, s.subject))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are helping organize an email inbox. The existing categories are: {}.\n\
             Below are emails that did not fit any of them.\n\n\
             {}\n\n\
             Propose up to {} new categories that would cover several of these emails. \
             Each category must be one or two words and must not be similar to an \
             existing category. Answer with a comma-separated list of names, or NONE if \
             no new category is needed. Do not add explanations.",
            registry.categories().join(", "),
            lines,
            self.max_suggestions
        )
    }

    /// Ask the model for new category names
    ///
    /// Backend failures are returned to the caller; suggestions have no fallback.
    pub async fn suggest(
        &self,
        summaries: &[MessageSummary],
        registry: &CategoryRegistry,
    ) -> Result<Vec<String>> {
        if summaries.is_empty() {
            debug!("No summaries to analyze, skipping suggestion request");
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(summaries, registry);
        let raw = self.generator.generate(&prompt).await?;
        debug!("Raw suggestion response: {:?}", raw);

        let suggestions = parse_suggestions(&raw, registry, self.max_suggestions);
        info!("Model proposed {} new categories", suggestions.len());
        Ok(suggestions)
    }
}

/// Title-case every word and collapse runs of whitespace
fn title_case_words(candidate: &str) -> String {
    candidate
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Turn the raw model answer into at most `max` clean category names
///
/// `NONE` (any case) and empty answers yield nothing. Candidates longer than
/// two words, and candidates already present in the registry or earlier in
/// the list, are dropped.
pub fn parse_suggestions(raw: &str, registry: &CategoryRegistry, max: usize) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let mut accepted: Vec<String> = Vec::new();
    for candidate in raw.split(',') {
        let cleaned: String = candidate
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .filter(|c| c.is_alphanumeric() || *c == ' ')
            .collect();
        let name = title_case_words(&cleaned);

        let words = name.split_whitespace().count();
        if words == 0 || words > MAX_SUGGESTION_WORDS {
            continue;
        }
        if registry.contains_ignore_case(&name)
            || accepted.iter().any(|a| a.eq_ignore_ascii_case(&name))
        {
            debug!("Dropping duplicate suggestion {}", name);
            continue;
        }

        accepted.push(name);
        if accepted.len() == max {
            break;
        }
    }
    accepted
}
