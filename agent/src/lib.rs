//! Repository discovery pipeline.
//!
//! [`DiscoveryAgent`] runs each search strategy through the
//! [`GitHubScanner`], the [`RepositoryAnalyzer`] and the
//! [`RepositoryScorer`], keeping candidates whose potential reaches the
//! acceptance threshold. [`runner`] persists runs through a
//! `DiscoveryStore`.

pub mod analyzer;
pub mod discovery;
pub mod error;
pub mod runner;
pub mod scanner;
pub mod scorer;

pub use analyzer::{AnalysisOutcome, CompletionUsage, RepositoryAnalyzer};
pub use discovery::{AgentResult, AgentStats, AgentStatus, DiscoveryAgent, OperationEntry};
pub use error::{ScanError, ScanResult};
pub use runner::{execute_run, spawn_run};
pub use scanner::{GitHubRepo, GitHubScanner, RepositorySource, TreeEntry};
pub use scorer::RepositoryScorer;
