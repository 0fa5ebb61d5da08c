//! Gmail AI Labeler
//!
//! Labels Gmail messages with a category from a configurable taxonomy. A
//! language model proposes the category; a deterministic keyword chain takes
//! over whenever the model is unreachable or answers with something outside
//! the taxonomy. Each message is labeled at most once: anything that already
//! carries a user label is left alone.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_ai_labeler::{auth, cli, client::ProductionGmailClient, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let classifier = cli::build_classifier(&config)?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-ai-labeler/token.json".as_ref(),
//!     )
//!     .await?;
//!     let client = Arc::new(ProductionGmailClient::new(hub));
//!
//!     let options = cli::RunOptions {
//!         query: config.run.query.clone(),
//!         check_limit: config.run.check_limit,
//!         classify_limit: config.run.classify_limit,
//!         dry_run: true,
//!     };
//!     let report = cli::label_messages(client, &classifier, &options, None).await?;
//!     println!("{} messages classified", report.messages_classified());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`registry`] - The ordered, case-insensitively unique category set
//! - [`generator`] - Ollama and Gemini text-generation backends
//! - [`classifier`] - Prompting, label normalization and the fallback decision
//! - [`fallback`] - Ordered keyword rules
//! - [`suggest`] - New-category proposals from unlabeled mail
//! - [`label_manager`] - Label lookup, creation and application
//! - [`client`] - Gmail API client with retry logic
//! - [`mime`] - Body extraction from the payload tree
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line interface and run loops
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod generator;
pub mod label_manager;
pub mod mime;
pub mod models;
pub mod registry;
pub mod suggest;

pub use error::{LabelerError, Result};

pub use models::{
    ClassificationOutcome, ClassificationResult, ClassificationSource, FallbackReason, LabelInfo,
    LabelType, Message, MessageSummary,
};

pub use classifier::{normalize_label, LlmClassifier};
pub use fallback::{FallbackClassifier, FallbackRule};
pub use generator::{GeminiGenerator, OllamaGenerator, TextGenerator};
pub use registry::{CategoryRegistry, UNCATEGORIZED};
pub use suggest::CategorySuggester;

pub use config::{Config, ModelConfig, ModelProvider};

pub use client::{GmailClient, ProductionGmailClient};
pub use label_manager::LabelManager;

pub use cli::{Cli, Commands, ProgressReporter, Report};
