//! Provenance Miner Entry Point
//!
//! Subcommands:
//! - `mine`: mine a repository list into an output directory (resumable)
//! - `blame`: parse raw `git blame` output into the blame table
//! - `dedup`: rewrite the output tables keeping one row per primary key

use clap::{Parser, Subcommand};
use provenance_miner::git_mining::BlameParser;
use provenance_miner::repo_list::load_repository_list;
use provenance_miner::{
    GitHubClient, HttpCategoryClassifier, MinerResult, MiningConfig, MiningOrchestrator,
    RepositoryRef, RetryingClient, RunCache,
};
use provenance_store::{table_path, BlameRow, CheckpointStore, Dataset};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "provenance-miner")]
#[command(about = "Resumable authorship provenance miner for hosted git repositories")]
#[command(version)]
struct Args {
    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mine every repository of a list into an output directory
    Mine {
        /// TOML configuration; defaults apply when omitted
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Repository list (CSV with owner,repository_name or one owner/name per line)
        #[arg(long)]
        repos: PathBuf,

        /// Output directory for files.csv and revisions.csv
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Parse `git blame` output of one file at one revision
    Blame {
        /// Repository as owner/name
        #[arg(long)]
        repository: String,

        #[arg(long)]
        file: String,

        #[arg(long)]
        revision: String,

        /// Raw blame output, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: PathBuf,

        #[arg(long, short)]
        output: PathBuf,
    },

    /// Drop duplicate rows from an output directory
    Dedup {
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_filter = if args.verbose {
        "provenance_miner=debug,provenance_store=debug"
    } else {
        "provenance_miner=info,provenance_store=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match args.command {
        Command::Mine {
            config,
            repos,
            output,
        } => mine(config.as_deref(), &repos, &output).await,
        Command::Blame {
            repository,
            file,
            revision,
            input,
            output,
        } => blame(&repository, &file, &revision, &input, &output),
        Command::Dedup { output } => dedup(&output),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn mine(config: Option<&Path>, repos: &Path, output: &Path) -> MinerResult<()> {
    let config = match config {
        Some(path) => MiningConfig::load(path)?,
        None => MiningConfig::default(),
    };
    let repositories = load_repository_list(repos)?;

    tracing::info!("Output: {}", output.display());
    tracing::info!(
        "Window: {} .. {}, history until {:?}",
        config.since,
        config.until,
        config.history_until
    );

    let dataset = Dataset::open(output)?;
    let api = Arc::new(GitHubClient::new(&config.github)?);
    let retry = RetryingClient::from_config(&config.retry);
    let policy = retry.policy();
    tracing::info!(
        "Retry backoff {:?} .. {:?}, outage deadline {:?}",
        policy.initial_backoff,
        policy.max_backoff,
        policy.outage_deadline
    );
    let cache = Arc::new(RunCache::new(config.cache_capacity));

    let mut orchestrator = MiningOrchestrator::new(config.clone(), api, retry, dataset, cache);
    if let Some(classifier) = &config.classifier {
        orchestrator =
            orchestrator.with_category_classifier(Arc::new(HttpCategoryClassifier::new(classifier)?));
    }

    let summary = orchestrator.run(&repositories).await;
    print!("{}", summary);
    Ok(())
}

fn blame(
    repository: &str,
    file: &str,
    revision: &str,
    input: &Path,
    output: &Path,
) -> MinerResult<()> {
    let repository = RepositoryRef::parse(repository)?;
    let text = if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(input)?
    };

    let full_name = repository.full_name();
    let rows: Vec<BlameRow> = BlameParser::new()
        .parse_output(revision, &text)
        .into_iter()
        .map(|record| record.into_row(&full_name, file))
        .collect();

    std::fs::create_dir_all(output)?;
    let mut table = CheckpointStore::<BlameRow>::in_dir(output)?;
    let written = table.append_rows(&rows)?;
    println!(
        "{} blame rows parsed, {} new rows written to {}",
        rows.len(),
        written,
        table.path().display()
    );
    Ok(())
}

fn dedup(output: &Path) -> MinerResult<()> {
    let mut dataset = Dataset::open(output)?;
    let report = dataset.dedup()?;
    println!(
        "Removed {} duplicate file rows and {} duplicate revision rows",
        report.file_rows, report.revision_rows
    );

    if table_path::<BlameRow>(output).exists() {
        let removed = CheckpointStore::<BlameRow>::in_dir(output)?.dedup()?;
        println!("Removed {} duplicate blame rows", removed);
    }
    Ok(())
}
