//! Catalyst Explorer Embedding Worker
//!
//! Backfills the `combined` embedding for proposals:
//! 1. Pages through proposals with their fund and campaign
//! 2. Skips proposals that already have a `combined` embedding (unless forced)
//! 3. Generates embeddings via the configured provider
//! 4. Stores them idempotently by content hash
//!
//! Usage:
//!   embedding-worker [--force] [--limit N] [--batch-size N] [--provider NAME]
//!   embedding-worker test [text]

mod processor;

use crate::processor::{BackfillConfig, BackfillProcessor};
use catalyst_common::{
    config::{AppConfig, EmbeddingConfig},
    db::{DbPool, Repository},
    embeddings::{create_embedder, EmbeddingService},
    VERSION,
};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Backfill proposal embeddings
#[derive(Parser, Debug)]
#[command(name = "embedding-worker", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Regenerate embeddings even if they exist
    #[arg(long)]
    force: bool,

    /// Maximum number of proposals to process
    #[arg(long)]
    limit: Option<usize>,

    /// Number of proposals to process at once (defaults to the configured batch size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Embedding provider to use (ollama, openai, mock)
    #[arg(long)]
    provider: Option<String>,

    /// Embedding model (defaults to the provider default)
    #[arg(long)]
    model_name: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Embed one text and print the result
    Test {
        /// Text to embed
        text: Option<String>,
    },
}

const DEFAULT_TEST_TEXT: &str = "This is a test sentence for embedding.";

impl Cli {
    /// Apply command line overrides on top of the loaded embedding settings
    fn apply(&self, embedding: &mut EmbeddingConfig) {
        if let Some(ref provider) = self.provider {
            embedding.provider = provider.clone();
        }
        if let Some(ref model) = self.model_name {
            embedding.model = Some(model.clone());
        }
        if let Some(batch_size) = self.batch_size {
            embedding.batch_size = batch_size.max(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    cli.apply(&mut config.embedding);

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Catalyst Explorer Embedding Worker v{}", VERSION);

    // Initialize embedder
    let embedder = create_embedder(&config.embedding)?;

    info!(
        provider = %embedder.provider_name(),
        model = %embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder initialized"
    );

    if let Some(Command::Test { text }) = cli.command {
        // Test mode: generate a single embedding
        info!("Running in test mode...");
        let text = text.unwrap_or_else(|| DEFAULT_TEST_TEXT.to_string());

        match embedder.embed(&text).await {
            Ok(embedding) => {
                println!("Embedding generated successfully!");
                println!("  Provider: {}", embedder.provider_name());
                println!("  Model: {}", embedder.model_name());
                println!("  Dimension: {}", embedding.len());
                println!("  First 5 values: {:?}", &embedding[..5.min(embedding.len())]);
            }
            Err(e) => {
                error!(error = %e, "Failed to generate embedding");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        return Ok(());
    }

    let (force, limit) = (cli.force, cli.limit);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    let total = repository.count_proposals().await?;
    info!(
        total,
        force,
        limit = ?limit,
        batch_size = config.embedding.batch_size,
        "Starting embedding backfill"
    );

    let processor = BackfillProcessor::new(
        repository.clone(),
        EmbeddingService::new(repository, embedder),
        BackfillConfig {
            batch_size: config.embedding.batch_size,
            force,
            limit,
        },
    );

    let report = tokio::select! {
        result = processor.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping backfill");
            return Ok(());
        }
    };

    println!("Embedding backfill complete");
    println!("  Scanned:          {}", report.scanned);
    println!("  Created:          {}", report.created);
    println!("  Reused:           {}", report.reused);
    println!("  Skipped existing: {}", report.skipped_existing);
    println!("  Skipped empty:    {}", report.skipped_empty);
    println!("  Failed:           {}", report.failed);

    if report.has_failures() {
        error!(failed = report.failed, "Backfill finished with failures");
        std::process::exit(1);
    }

    info!("Embedding worker finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("embedding-worker").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_test_mode() {
        assert_eq!(parse(&["test"]).unwrap().command, Some(Command::Test { text: None }));
        assert_eq!(
            parse(&["test", "hello"]).unwrap().command,
            Some(Command::Test {
                text: Some("hello".to_string())
            })
        );
    }

    #[test]
    fn test_parse_backfill_flags() {
        let cli = parse(&[]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.force);
        assert_eq!(cli.limit, None);

        let cli = parse(&["--limit", "25", "--force", "--batch-size", "10"]).unwrap();
        assert!(cli.force);
        assert_eq!(cli.limit, Some(25));
        assert_eq!(cli.batch_size, Some(10));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--limit"]).is_err());
        assert!(parse(&["--limit", "many"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_embedding_config() {
        let mut embedding = EmbeddingConfig::default();
        parse(&[]).unwrap().apply(&mut embedding);
        assert_eq!(embedding.provider, "ollama");
        assert_eq!(embedding.batch_size, 50);

        let cli = parse(&[
            "--provider",
            "openai",
            "--model-name",
            "text-embedding-3-small",
            "--batch-size",
            "0",
        ])
        .unwrap();
        cli.apply(&mut embedding);
        assert_eq!(embedding.provider, "openai");
        assert_eq!(embedding.model.as_deref(), Some("text-embedding-3-small"));
        assert_eq!(embedding.batch_size, 1);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
