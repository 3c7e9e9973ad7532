//! Discovery data model shared by the scanner, analyzer, scorer and store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::DiscoveryConfig;

/// Clamp a score into `[0, 1]`. NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

// ── Strategies ──────────────────────────────────────────────────────

/// A named search heuristic mapped to a query template by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    AbandonedStars,
    UnfinishedIdeas,
    SoloDeveloper,
    LanguageSpecific,
}

impl SearchStrategy {
    pub const ALL: [SearchStrategy; 4] = [
        SearchStrategy::AbandonedStars,
        SearchStrategy::UnfinishedIdeas,
        SearchStrategy::SoloDeveloper,
        SearchStrategy::LanguageSpecific,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::AbandonedStars => "abandoned_stars",
            SearchStrategy::UnfinishedIdeas => "unfinished_ideas",
            SearchStrategy::SoloDeveloper => "solo_developer",
            SearchStrategy::LanguageSpecific => "language_specific",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SearchStrategy::AbandonedStars => "Starred projects with no push in the last year",
            SearchStrategy::UnfinishedIdeas => "Small MVPs, prototypes and proofs of concept",
            SearchStrategy::SoloDeveloper => "Mid-sized projects that went quiet",
            SearchStrategy::LanguageSpecific => "Stale projects within the configured star range",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown search strategy '{0}'")]
pub struct UnknownStrategy(pub String);

impl FromStr for SearchStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

// ── Repository observations ─────────────────────────────────────────

/// Quantitative metrics for a repository, recomputed on every scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub watchers: i64,
    pub contributors_count: i64,
    pub commit_count_last_year: i64,
    pub days_since_last_commit: i64,
    /// `None` when the repository has never published a release.
    pub days_since_last_release: Option<i64>,
    /// Metric fields that fell back to a default because the upstream call failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// Qualitative signals about a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositorySignals {
    pub is_abandoned: bool,
    pub has_readme: bool,
    pub has_license: bool,
    pub has_tests: bool,
    pub has_ci: bool,
    pub has_documentation: bool,
    pub documentation_quality: f64,
    pub code_quality_estimate: f64,
}

/// The three independent scores produced by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryScores {
    pub potential: f64,
    pub revival_feasibility: f64,
    pub product_fit: f64,
}

/// Advisory analysis produced by the completion service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AIAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub revival_recommendation: String,
    #[serde(default)]
    pub estimated_effort_hours: Option<f64>,
    #[serde(default)]
    pub target_audience: String,
}

// ── Candidates ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    #[default]
    Pending,
    Reviewed,
    Approved,
    Rejected,
}

/// A repository that passed the acceptance threshold and awaits human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCandidate {
    pub github_url: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub license: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,

    pub metrics: RepositoryMetrics,
    pub signals: RepositorySignals,
    pub scores: RepositoryScores,
    pub ai_analysis: Option<AIAnalysis>,

    #[serde(default)]
    pub status: CandidateStatus,
    pub discovered_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,

    pub discovery_strategy: Option<String>,
    pub run_id: Option<String>,
}

impl DiscoveryCandidate {
    /// Stable identity: `owner/name`. Later writes with the same id supersede earlier ones.
    pub fn id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

// ── Runs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        })
    }
}

/// Record of one discovery run. Starts `running` and transitions exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub strategy: Option<String>,
    pub repos_scanned: usize,
    pub candidates_found: usize,
    #[serde(default)]
    pub candidates: Vec<DiscoveryCandidate>,
    pub error: Option<String>,
    pub config: Option<DiscoveryConfig>,
}

impl DiscoveryRunResult {
    pub fn start(config: Option<DiscoveryConfig>, strategy: Option<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            strategy,
            repos_scanned: 0,
            candidates_found: 0,
            candidates: Vec::new(),
            error: None,
            config,
        }
    }

    /// Transition to `completed`. Returns false if the run was already terminal.
    pub fn mark_completed(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.candidates_found = self.candidates.len();
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Transition to `failed`, keeping whatever candidates were gathered.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.candidates_found = self.candidates.len();
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-3.0), 0.0);
        assert_eq!(clamp_unit(0.42), 0.42);
        assert_eq!(clamp_unit(7.5), 1.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in SearchStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<SearchStrategy>().unwrap(), strategy);
        }
        assert!("trending".parse::<SearchStrategy>().is_err());

        let json = serde_json::to_string(&SearchStrategy::SoloDeveloper).unwrap();
        assert_eq!(json, "\"solo_developer\"");
    }

    #[test]
    fn test_run_transitions_once() {
        let mut run = DiscoveryRunResult::start(None, None);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        assert!(run.mark_failed("github unreachable"));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("github unreachable"));

        // A second transition is ignored.
        assert!(!run.mark_completed());
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_ai_analysis_tolerates_missing_fields() {
        let analysis: AIAnalysis = serde_json::from_str(r#"{"summary": "A CLI"}"#).unwrap();
        assert_eq!(analysis.summary, "A CLI");
        assert!(analysis.strengths.is_empty());
        assert_eq!(analysis.estimated_effort_hours, None);
    }
}
