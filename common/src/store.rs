//! Keyed storage for runs and candidates.
//!
//! Runs are keyed by run id, candidates by `owner/name`. Saving a candidate
//! is an upsert: the last write wins.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{CandidateStatus, DiscoveryCandidate, DiscoveryRunResult, RunStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filter and page for candidate listings.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub skip: usize,
    pub limit: usize,
    pub status: Option<CandidateStatus>,
    pub min_potential: Option<f64>,
}

impl Default for CandidateQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 20,
            status: None,
            min_potential: None,
        }
    }
}

/// Reviewer edits applied to a stored candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateReview {
    pub status: Option<CandidateStatus>,
    pub reviewed_by: Option<String>,
    pub notes: Option<String>,
}

#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    async fn get_run(&self, run_id: &str) -> StoreResult<Option<DiscoveryRunResult>>;

    /// Newest first.
    async fn list_runs(
        &self,
        skip: usize,
        limit: usize,
        status: Option<RunStatus>,
    ) -> StoreResult<Vec<DiscoveryRunResult>>;

    async fn save_run(&self, run: DiscoveryRunResult) -> StoreResult<()>;

    /// Replace an existing run. Fails if the run was never saved.
    async fn update_run(&self, run: DiscoveryRunResult) -> StoreResult<()>;

    async fn get_candidate(&self, candidate_id: &str) -> StoreResult<Option<DiscoveryCandidate>>;

    /// Highest potential first.
    async fn list_candidates(&self, query: &CandidateQuery) -> StoreResult<Vec<DiscoveryCandidate>>;

    /// Upsert by `owner/name`.
    async fn save_candidate(&self, candidate: DiscoveryCandidate) -> StoreResult<()>;

    async fn review_candidate(
        &self,
        candidate_id: &str,
        review: CandidateReview,
    ) -> StoreResult<DiscoveryCandidate>;
}

#[derive(Clone, Default)]
pub struct InMemoryDiscoveryStore {
    runs: Arc<RwLock<HashMap<String, DiscoveryRunResult>>>,
    candidates: Arc<RwLock<HashMap<String, DiscoveryCandidate>>>,
}

impl InMemoryDiscoveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscoveryStore for InMemoryDiscoveryStore {
    async fn get_run(&self, run_id: &str) -> StoreResult<Option<DiscoveryRunResult>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned())
    }

    async fn list_runs(
        &self,
        skip: usize,
        limit: usize,
        status: Option<RunStatus>,
    ) -> StoreResult<Vec<DiscoveryRunResult>> {
        let runs = self.runs.read().await;
        let mut matching: Vec<DiscoveryRunResult> = runs
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }

    async fn save_run(&self, run: DiscoveryRunResult) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn update_run(&self, run: DiscoveryRunResult) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.run_id) {
            Some(existing) => {
                *existing = run;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "run",
                id: run.run_id,
            }),
        }
    }

    async fn get_candidate(&self, candidate_id: &str) -> StoreResult<Option<DiscoveryCandidate>> {
        let candidates = self.candidates.read().await;
        Ok(candidates.get(candidate_id).cloned())
    }

    async fn list_candidates(&self, query: &CandidateQuery) -> StoreResult<Vec<DiscoveryCandidate>> {
        let candidates = self.candidates.read().await;
        let mut matching: Vec<DiscoveryCandidate> = candidates
            .values()
            .filter(|c| query.status.map_or(true, |s| c.status == s))
            .filter(|c| query.min_potential.map_or(true, |min| c.scores.potential >= min))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.scores.potential.total_cmp(&a.scores.potential));
        Ok(matching.into_iter().skip(query.skip).take(query.limit).collect())
    }

    async fn save_candidate(&self, candidate: DiscoveryCandidate) -> StoreResult<()> {
        let mut candidates = self.candidates.write().await;
        candidates.insert(candidate.id(), candidate);
        Ok(())
    }

    async fn review_candidate(
        &self,
        candidate_id: &str,
        review: CandidateReview,
    ) -> StoreResult<DiscoveryCandidate> {
        let mut candidates = self.candidates.write().await;
        let candidate = candidates
            .get_mut(candidate_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "candidate",
                id: candidate_id.to_string(),
            })?;

        if let Some(status) = review.status {
            candidate.status = status;
        }
        if let Some(reviewer) = review.reviewed_by {
            candidate.reviewed_by = Some(reviewer);
            candidate.reviewed_at = Some(Utc::now());
        }
        if let Some(notes) = review.notes {
            candidate.notes = Some(notes);
        }
        Ok(candidate.clone())
    }
}
