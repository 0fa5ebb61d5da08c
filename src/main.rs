use anyhow::Result;
use clap::Parser;
use gmail_ai_labeler::cli::{self, Cli, Commands, ProgressReporter};
use gmail_ai_labeler::config::Config;
use gmail_ai_labeler::error::LabelerError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: gmail-ai-labeler --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Both aws-lc-rs and ring end up in the dependency tree, so rustls needs
    // an explicit default provider
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_ai_labeler=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_ai_labeler=info,warn"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());

    match cli.command {
        Commands::Auth { force } => {
            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if force {
                gmail_ai_labeler::auth::clear_token_cache(&cli.token_cache).await?;
            }

            let hub = gmail_ai_labeler::auth::initialize_gmail_hub(
                &cli.credentials,
                &cli.token_cache,
            )
            .await?;
            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Scope must match the cached token or a second consent flow starts
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await
                .map_err(LabelerError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
            Ok(())
        }

        Commands::Run {
            check,
            classify,
            dry_run,
        } => {
            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if dry_run {
                let _ = reporter
                    .multi_progress()
                    .println("Running in DRY RUN mode - no labels will be created or applied");
            }

            let report = cli::run_labeling(&cli, check, classify, dry_run, &reporter).await?;

            println!("\n========================================");
            println!("Labeling Summary{}", if report.dry_run { " (DRY RUN)" } else { "" });
            println!("========================================");
            println!("Run ID: {}", report.run_id);
            println!("Duration: {} seconds", report.duration_seconds());
            println!("Messages checked: {}", report.messages_checked);
            println!("Skipped (already labeled): {}", report.messages_skipped);
            println!(
                "Classified: {} ({} by keyword fallback)",
                report.messages_classified(),
                report.fallback_count()
            );
            for (category, count) in report.category_breakdown() {
                println!("  {:<16} {}", category, count);
            }
            if report.dry_run {
                if !report.planned_labels.is_empty() {
                    println!("Labels to create: {}", report.planned_labels.join(", "));
                }
            } else {
                println!("Labels created: {}", report.labels_created);
                println!("Messages labeled: {}", report.messages_labeled);
            }
            if !report.failed_message_ids.is_empty() {
                println!("Failed messages: {}", report.failed_message_ids.len());
                for id in &report.failed_message_ids {
                    println!("  - {}", id);
                }
            }
            println!("========================================");
            Ok(())
        }

        Commands::Suggest { sample, accept } => {
            let suggestions = cli::run_suggestions(&cli, sample, accept, &reporter).await?;
            if suggestions.is_empty() {
                println!("No new categories suggested.");
            } else {
                println!("Suggested categories:");
                for name in &suggestions {
                    println!("  - {}", name);
                }
            }
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(LabelerError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(&output).await?;
            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - model.provider: 'ollama' (local) or 'gemini' (needs GEMINI_API_KEY)");
            println!("  - taxonomy.categories: the labels messages can receive");
            println!("  - taxonomy.fallback_rules: keyword rules used when the model fails");
            println!("  - run.query: which messages are considered");
            Ok(())
        }
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(err) = error.downcast_ref::<LabelerError>() {
        match err {
            LabelerError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-ai-labeler auth --force");
            }
            LabelerError::RateLimitExceeded { .. } => {
                eprintln!("\nHint: You've hit Gmail API rate limits.");
                eprintln!("      Wait a few seconds and try again.");
            }
            LabelerError::ModelUnavailable(_) => {
                eprintln!("\nHint: Check that the model server is running and reachable.");
                eprintln!("      For Ollama, try: ollama serve");
            }
            LabelerError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-ai-labeler init-config --force");
            }
            _ => {}
        }
    }
}
