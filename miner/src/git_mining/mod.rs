//! Authorship provenance mining.
//!
//! This module provides:
//! - Blame output parsing
//! - Rule-based automated/human authorship tagging
//! - Balanced sampling of automated vs human files
//! - The per-repository mining pipeline

mod classifier;
mod miner;
mod parser;
mod sampling;

pub use classifier::AuthorshipClassifier;
pub use miner::{AddedFile, FailureReason, MiningOrchestrator, RepoOutcome, RepoState, RunSummary};
pub use parser::{BlameParser, BlameRecord, UNKNOWN_ACTOR};
pub use sampling::{balance, repository_rng, repository_seed};
