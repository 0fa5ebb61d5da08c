//! Command-line interface and run loops

use crate::auth;
use crate::classifier::LlmClassifier;
use crate::client::{GmailClient, ProductionGmailClient};
use crate::config::Config;
use crate::error::{LabelerError, Result};
use crate::fallback::FallbackClassifier;
use crate::generator::build_generator;
use crate::label_manager::LabelManager;
use crate::models::{ClassificationSource, MessageSummary};
use crate::registry::CategoryRegistry;
use crate::suggest::CategorySuggester;
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "gmail-ai-labeler")]
#[command(version = "0.1.0")]
#[command(about = "Label Gmail messages with a language model and keyword fallback", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-ai-labeler/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Classify and label matching messages
    Run {
        /// Number of candidate messages to fetch (overrides run.check_limit)
        #[arg(long)]
        check: Option<usize>,

        /// Number of messages to classify (overrides run.classify_limit)
        #[arg(long)]
        classify: Option<usize>,

        /// Dry run mode (classify but don't touch the mailbox)
        #[arg(long)]
        dry_run: bool,
    },

    /// Propose new categories from unlabeled mail
    Suggest {
        /// Number of messages to sample (overrides suggestions.sample_size)
        #[arg(long)]
        sample: Option<usize>,

        /// Pick suggestions interactively and add them to the config file
        #[arg(long)]
        accept: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share the display with the tracing writer so log lines print above the bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Knobs for one labeling pass
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query: String,
    pub check_limit: usize,
    pub classify_limit: usize,
    pub dry_run: bool,
}

/// What happened to one classified message
#[derive(Debug, Clone)]
pub struct LabeledMessage {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub category: String,
    pub source: ClassificationSource,
    /// False in dry-run mode or when the mailbox update failed
    pub applied: bool,
}

/// Outcome of a labeling pass
#[derive(Debug, Clone)]
pub struct Report {
    pub run_id: String,
    pub started_at: chrono::DateTime<Utc>,
    pub completed_at: chrono::DateTime<Utc>,
    pub dry_run: bool,
    pub messages_checked: usize,
    pub messages_skipped: usize,
    pub messages_labeled: usize,
    pub labels_created: usize,
    /// Labels a dry run would have created
    pub planned_labels: Vec<String>,
    /// Message ids whose fetch, label creation or update failed
    pub failed_message_ids: Vec<String>,
    pub classified: Vec<LabeledMessage>,
}

impl Report {
    fn new(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            dry_run,
            messages_checked: 0,
            messages_skipped: 0,
            messages_labeled: 0,
            labels_created: 0,
            planned_labels: Vec::new(),
            failed_message_ids: Vec::new(),
            classified: Vec::new(),
        }
    }

    pub fn messages_classified(&self) -> usize {
        self.classified.len()
    }

    pub fn fallback_count(&self) -> usize {
        self.classified
            .iter()
            .filter(|m| m.source == ClassificationSource::Fallback)
            .count()
    }

    /// Messages per category, alphabetically
    pub fn category_breakdown(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for message in &self.classified {
            *counts.entry(message.category.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }
}

/// Classify and label up to `classify_limit` of the messages matching the query
///
/// Messages that already carry a user label are skipped without calling the
/// model. Mailbox failures on a single message are logged and the pass moves
/// on; only listing messages or labels up front can abort it.
pub async fn label_messages(
    client: Arc<dyn GmailClient>,
    classifier: &LlmClassifier,
    options: &RunOptions,
    progress: Option<&ProgressBar>,
) -> Result<Report> {
    let mut report = Report::new(options.dry_run);

    let ids = client
        .list_message_ids(&options.query, options.check_limit)
        .await?;
    info!(
        "Found {} messages for {:?} (checking up to {})",
        ids.len(),
        options.query,
        options.check_limit
    );

    let mut label_manager = LabelManager::new(Box::new(Arc::clone(&client)));
    label_manager.load_existing_labels().await?;

    if let Some(pb) = progress {
        pb.set_length(ids.len().min(options.classify_limit) as u64);
    }

    for id in &ids {
        if report.messages_classified() >= options.classify_limit {
            info!(
                "Reached classification limit of {}, stopping",
                options.classify_limit
            );
            break;
        }
        report.messages_checked += 1;

        let message = match client.get_message(id).await {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to fetch message {}: {}", id, e);
                report.failed_message_ids.push(id.clone());
                continue;
            }
        };

        if label_manager.has_user_label(&message) {
            debug!("Skipping message {}, already labeled", id);
            report.messages_skipped += 1;
            continue;
        }

        let result = classifier.classify_message(&message).await;
        info!(
            "{} | {} -> {} ({:?})",
            truncate_string(&message.sender, 40),
            truncate_string(&message.subject, 60),
            result.category,
            result.source
        );
        if let Some(pb) = progress {
            pb.inc(1);
            pb.set_message(truncate_string(&message.subject, 40));
        }

        let mut labeled = LabeledMessage {
            message_id: message.id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            category: result.category,
            source: result.source,
            applied: false,
        };

        if options.dry_run {
            if label_manager.label_id(&labeled.category).is_none()
                && !report.planned_labels.contains(&labeled.category)
            {
                report.planned_labels.push(labeled.category.clone());
            }
            report.classified.push(labeled);
            continue;
        }

        let applied = match label_manager.ensure_label(&labeled.category).await {
            Ok(label_id) => label_manager.apply(&message.id, &label_id).await,
            Err(e) => Err(e),
        };
        match applied {
            Ok(()) => {
                labeled.applied = true;
                report.messages_labeled += 1;
            }
            Err(e) => {
                warn!("Failed to label message {}: {}", message.id, e);
                report.failed_message_ids.push(message.id.clone());
            }
        }
        report.classified.push(labeled);
    }

    report.labels_created = label_manager.created_labels().len();
    report.completed_at = Utc::now();
    Ok(report)
}

/// Build the classifier described by the configuration
pub fn build_classifier(config: &Config) -> Result<LlmClassifier> {
    let generator = build_generator(&config.model)?;
    let fallback = FallbackClassifier::new(config.taxonomy.fallback_rules.clone());
    Ok(LlmClassifier::new(
        generator,
        config.taxonomy.categories.clone(),
        fallback,
        &config.model,
    ))
}

/// `run` command: load config, authenticate and label
pub async fn run_labeling(
    cli: &Cli,
    check: Option<usize>,
    classify: Option<usize>,
    dry_run: bool,
    reporter: &ProgressReporter,
) -> Result<Report> {
    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    if let Some(check) = check {
        config.run.check_limit = check;
    }
    if let Some(classify) = classify {
        config.run.classify_limit = classify;
    }
    if dry_run {
        config.execution.dry_run = true;
    }
    config.validate()?;
    reporter.finish_spinner(
        &config_spinner,
        &format!("Configuration loaded from {:?}", cli.config),
    );

    let classifier = build_classifier(&config)?;

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated successfully");
    let client: Arc<dyn GmailClient> = Arc::new(ProductionGmailClient::new(hub));

    let options = RunOptions {
        query: config.run.query.clone(),
        check_limit: config.run.check_limit,
        classify_limit: config.run.classify_limit,
        dry_run: config.execution.dry_run,
    };

    let pb = reporter.add_progress_bar(0, "Classifying...");
    let report = label_messages(client, &classifier, &options, Some(&pb)).await;
    pb.finish_and_clear();
    report
}

/// Fetch a sample of messages and ask the model for new categories
pub async fn suggest_categories(
    client: Arc<dyn GmailClient>,
    suggester: &CategorySuggester,
    registry: &CategoryRegistry,
    query: &str,
    sample: usize,
) -> Result<Vec<String>> {
    let ids = client.list_message_ids(query, sample).await?;
    info!("Sampling {} messages for {:?}", ids.len(), query);

    let mut summaries: Vec<MessageSummary> = Vec::with_capacity(ids.len());
    for id in &ids {
        match client.get_message(id).await {
            Ok(message) => summaries.push(message.summary()),
            Err(e) => warn!("Failed to fetch message {}: {}", id, e),
        }
    }

    suggester.suggest(&summaries, registry).await
}

/// `suggest` command; with `accept`, chosen names are appended to the taxonomy
pub async fn run_suggestions(
    cli: &Cli,
    sample: Option<usize>,
    accept: bool,
    reporter: &ProgressReporter,
) -> Result<Vec<String>> {
    let mut config = Config::load(&cli.config).await?;
    if let Some(sample) = sample {
        config.suggestions.sample_size = sample;
    }
    config.validate()?;

    let suggester = CategorySuggester::new(build_generator(&config.model)?, &config.suggestions);

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated successfully");
    let client: Arc<dyn GmailClient> = Arc::new(ProductionGmailClient::new(hub));

    let spinner = reporter.add_spinner("Analyzing unlabeled messages...");
    let suggestions = suggest_categories(
        client,
        &suggester,
        &config.taxonomy.categories,
        &config.suggestions.query,
        config.suggestions.sample_size,
    )
    .await;
    spinner.finish_and_clear();
    let suggestions = suggestions?;

    if !accept || suggestions.is_empty() {
        return Ok(suggestions);
    }

    let chosen = match inquire::MultiSelect::new(
        "Add which categories to the taxonomy?",
        suggestions.clone(),
    )
    .prompt()
    {
        Ok(chosen) => chosen,
        Err(inquire::InquireError::OperationCanceled)
        | Err(inquire::InquireError::OperationInterrupted) => {
            info!("Selection cancelled, config unchanged");
            return Ok(suggestions);
        }
        Err(e) => return Err(LabelerError::ConfigError(format!("Prompt failed: {}", e))),
    };

    let added = accept_categories(&mut config, &chosen)?;
    if !added.is_empty() {
        config.save(&cli.config).await?;
        println!("Added {} categories to {:?}: {}", added.len(), cli.config, added.join(", "));
    }
    Ok(suggestions)
}

/// Append new names to the taxonomy, returning the ones actually added
pub fn accept_categories(config: &mut Config, chosen: &[String]) -> Result<Vec<String>> {
    let mut added = Vec::new();
    for name in chosen {
        if config.taxonomy.categories.insert(name)? {
            added.push(name.clone());
        }
    }
    Ok(added)
}
