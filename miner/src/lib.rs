//! Provenance Miner Library
//!
//! Mines human vs automated-agent authorship of files and their revision
//! history from a hosted git service into a resumable tabular dataset.
//! Network outages are waited out, rate limits are honoured, and a killed run
//! picks up where it stopped without duplicating rows.

pub mod cache;
pub mod category;
pub mod config;
pub mod error;
pub mod git_mining;
pub mod hosting;
pub mod repo_list;
pub mod retry;

pub use cache::RunCache;
pub use category::{CategoryClassifier, HttpCategoryClassifier};
pub use config::{AgentIdentifier, MiningConfig};
pub use error::{MinerError, MinerResult};
pub use git_mining::{
    AuthorshipClassifier, BlameParser, BlameRecord, MiningOrchestrator, RepoOutcome, RepoState,
    RunSummary,
};
pub use hosting::{GitHubClient, HostingApi, RepositoryRef};
pub use retry::{ConnectivityProbe, RetryPolicy, RetryingClient};
