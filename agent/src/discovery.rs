//! Discovery agent: strategy loop over scanner, analyzer and scorer.
//!
//! A run starts `running` and ends exactly once in `completed` or
//! `failed`. A repository that fails to process is logged and skipped;
//! only an error escaping the strategy loop (e.g. a failed search) fails
//! the run, and even then the candidates gathered so far are kept.
//!
//! Several runs may share one agent. Token and cost totals are kept per
//! run, and the agent reports `running` while any run is in flight.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use common::config::{DiscoveryConfig, ReviveConfig};
use common::models::{DiscoveryCandidate, DiscoveryRunResult, SearchStrategy};
use common::Fetched;
use providers::ProviderManager;

use crate::analyzer::{refine_with_tree, CompletionUsage, RepositoryAnalyzer};
use crate::scanner::{GitHubRepo, GitHubScanner, RepositorySource};
use crate::scorer::RepositoryScorer;

pub const PURPOSE: &str = "Identify undervalued or abandoned repositories with high latent potential";

pub const CAPABILITIES: &[&str] = &[
    "Search GitHub for repositories matching criteria",
    "Analyze repository metadata and activity patterns",
    "Assess code quality and documentation",
    "Calculate potential scores",
    "Store candidates for human review",
];

pub const RESTRICTIONS: &[&str] = &[
    "Cannot onboard projects automatically",
    "Cannot contact repository authors",
    "Cannot prioritize based on popularity alone",
    "Cannot commit or modify any external repositories",
    "Cannot make final decisions on project selection",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Outcome of one `run`, with the spend it incurred.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub success: bool,
    pub data: DiscoveryRunResult,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub name: String,
    pub version: String,
    pub status: AgentStatus,
    pub operations: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Default)]
struct StatusState {
    active_runs: usize,
    last_outcome: AgentStatus,
}

/// AI spend attributed to a single run.
#[derive(Debug, Clone, Copy, Default)]
struct RunTally {
    tokens: u64,
    cost_usd: f64,
}

impl RunTally {
    fn add(&mut self, usage: &CompletionUsage) {
        self.tokens += usage.tokens;
        self.cost_usd += usage.cost_usd;
    }
}

pub struct DiscoveryAgent {
    config: Arc<DiscoveryConfig>,
    ai: Arc<ProviderManager>,
    source: Arc<dyn RepositorySource>,
    analyzer: RepositoryAnalyzer,
    scorer: RepositoryScorer,
    status: Mutex<StatusState>,
    operations: Mutex<Vec<OperationEntry>>,
}

impl DiscoveryAgent {
    pub fn new(
        config: Arc<DiscoveryConfig>,
        ai: Arc<ProviderManager>,
        source: Arc<dyn RepositorySource>,
    ) -> Self {
        Self {
            analyzer: RepositoryAnalyzer::new(ai.clone(), config.clone()),
            scorer: RepositoryScorer::new(config.weights),
            config,
            ai,
            source,
            status: Mutex::new(StatusState::default()),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Wire an agent with its own provider manager and GitHub client.
    pub fn from_config(config: &ReviveConfig) -> Result<Self> {
        let ai = ProviderManager::from_settings(&config.ai).context("Failed to build provider manager")?;
        let scanner = GitHubScanner::new(&config.github).context("Failed to build GitHub client")?;
        Ok(Self::new(
            Arc::new(config.discovery.clone()),
            Arc::new(ai),
            Arc::new(scanner),
        ))
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn provider_manager(&self) -> &Arc<ProviderManager> {
        &self.ai
    }

    /// `Running` while any run is in flight, otherwise the outcome of the
    /// run that finished last.
    pub fn status(&self) -> AgentStatus {
        let state = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if state.active_runs > 0 {
            AgentStatus::Running
        } else {
            state.last_outcome
        }
    }

    fn begin_run(&self) {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).active_runs += 1;
    }

    fn end_run(&self, outcome: AgentStatus) {
        let mut state = self.status.lock().unwrap_or_else(|e| e.into_inner());
        state.active_runs = state.active_runs.saturating_sub(1);
        state.last_outcome = outcome;
    }

    pub fn purpose(&self) -> &'static str {
        PURPOSE
    }

    pub fn capabilities(&self) -> &'static [&'static str] {
        CAPABILITIES
    }

    pub fn restrictions(&self) -> &'static [&'static str] {
        RESTRICTIONS
    }

    pub fn operation_log(&self) -> Vec<OperationEntry> {
        self.operations.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn log_operation(&self, operation: &str, details: Value) {
        info!(operation, details = %details, "Agent operation");
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(OperationEntry {
                timestamp: Utc::now(),
                operation: operation.to_string(),
                details,
            });
    }

    pub fn stats(&self) -> AgentStats {
        let usage = self.ai.get_usage_stats(None);
        AgentStats {
            name: self.config.name.clone(),
            version: self.config.version.clone(),
            status: self.status(),
            operations: self.operations.lock().unwrap_or_else(|e| e.into_inner()).len(),
            total_tokens: usage.total_tokens,
            total_cost: usage.total_cost,
        }
    }

    /// Execute one discovery run. `strategy` overrides the configured list,
    /// `max_repos` the configured candidate cap.
    pub async fn run(&self, strategy: Option<SearchStrategy>, max_repos: Option<usize>) -> AgentResult {
        let run = self.prepare_run(strategy);
        self.run_prepared(run, strategy, max_repos).await
    }

    /// A fresh `running` record carrying this agent's configuration, so a
    /// caller can persist it before the run starts.
    pub fn prepare_run(&self, strategy: Option<SearchStrategy>) -> DiscoveryRunResult {
        DiscoveryRunResult::start(
            Some((*self.config).clone()),
            strategy.map(|s| s.as_str().to_string()),
        )
    }

    pub async fn run_prepared(
        &self,
        mut run: DiscoveryRunResult,
        strategy: Option<SearchStrategy>,
        max_repos: Option<usize>,
    ) -> AgentResult {
        self.begin_run();
        let started_at = run.started_at;
        let strategies = match strategy {
            Some(s) => vec![s],
            None => self.config.strategies.clone(),
        };
        let max_repos = max_repos.unwrap_or(self.config.max_repos_per_run);

        info!(
            run_id = %run.run_id,
            strategies = ?strategies,
            max_repos,
            "🚀 Discovery run starting"
        );

        let mut tally = RunTally::default();
        let outcome = self.execute(&mut run, &strategies, max_repos, &mut tally).await;

        let error = match outcome {
            Ok(()) => {
                run.mark_completed();
                self.end_run(AgentStatus::Completed);
                info!(
                    run_id = %run.run_id,
                    scanned = run.repos_scanned,
                    candidates = run.candidates_found,
                    "✅ Discovery run completed"
                );
                None
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(run_id = %run.run_id, "Discovery run failed: {}", message);
                run.mark_failed(message.clone());
                self.end_run(AgentStatus::Failed);
                Some(message)
            }
        };

        self.log_operation(
            "run_complete",
            json!({
                "run_id": run.run_id,
                "status": run.status.to_string(),
                "repos_scanned": run.repos_scanned,
                "candidates_found": run.candidates_found,
                "tokens": tally.tokens,
                "cost_usd": tally.cost_usd,
            }),
        );

        AgentResult {
            success: error.is_none(),
            completed_at: run.completed_at,
            data: run,
            error,
            started_at,
            tokens_used: tally.tokens,
            cost_usd: tally.cost_usd,
        }
    }

    async fn execute(
        &self,
        run: &mut DiscoveryRunResult,
        strategies: &[SearchStrategy],
        max_repos: usize,
        tally: &mut RunTally,
    ) -> Result<()> {
        for &strategy in strategies {
            if run.candidates.len() >= max_repos {
                info!(strategy = %strategy, "Candidate cap reached, skipping remaining strategies");
                break;
            }
            self.log_operation("search_start", json!({ "strategy": strategy.as_str() }));

            let repos = self
                .source
                .search(
                    strategy,
                    &self.config.languages,
                    self.config.min_stars,
                    self.config.max_stars,
                    self.config.max_results_per_strategy,
                )
                .await
                .with_context(|| format!("Search for strategy '{}' failed", strategy))?;
            run.repos_scanned += repos.len();

            for repo in &repos {
                if run.candidates.len() >= max_repos {
                    break;
                }
                match self.process_repository(repo, strategy, &run.run_id, tally).await {
                    Ok(candidate) if candidate.scores.potential >= self.config.acceptance_threshold => {
                        info!(
                            repo = %candidate.id(),
                            potential = candidate.scores.potential,
                            "⭐ Candidate accepted"
                        );
                        run.candidates.push(candidate);
                    }
                    Ok(candidate) => {
                        tracing::debug!(
                            repo = %candidate.id(),
                            potential = candidate.scores.potential,
                            "Below acceptance threshold"
                        );
                    }
                    Err(e) => {
                        warn!(repo = %repo.full_name(), "Skipping repository: {:#}", e);
                        self.log_operation(
                            "process_error",
                            json!({ "repo": repo.full_name(), "error": format!("{:#}", e) }),
                        );
                    }
                }
            }

            self.log_operation(
                "search_complete",
                json!({ "strategy": strategy.as_str(), "repos_found": repos.len() }),
            );
        }
        Ok(())
    }

    async fn process_repository(
        &self,
        repo: &GitHubRepo,
        strategy: SearchStrategy,
        run_id: &str,
        tally: &mut RunTally,
    ) -> Result<DiscoveryCandidate> {
        let owner = repo.owner.login.as_str();
        let name = repo.name.as_str();

        let metrics = self
            .source
            .get_metrics(repo)
            .await
            .with_context(|| format!("Metrics for {} unavailable", repo.full_name()))?;

        let readme = if self.config.analyze_readme {
            self.source.get_readme(owner, name).await
        } else {
            Fetched::NotRequested
        };
        if let Fetched::Failed(reason) = &readme {
            warn!(repo = %repo.full_name(), "README fetch failed: {}", reason);
        }

        let outcome = self.analyzer.analyze(repo, &readme).await;
        if let Some(usage) = &outcome.usage {
            tally.add(usage);
            self.log_operation(
                "completion",
                json!({
                    "run_id": run_id,
                    "repo": repo.full_name(),
                    "provider": usage.provider,
                    "model": usage.model,
                    "tokens": usage.tokens,
                    "cost_usd": usage.cost_usd,
                    "latency_ms": usage.latency_ms,
                }),
            );
        }
        let mut signals = outcome.signals;
        let analysis = outcome.analysis;

        if self.config.inspect_file_tree {
            match self.source.get_file_tree(owner, name).await {
                Fetched::Value(entries) => refine_with_tree(&mut signals, &entries),
                Fetched::Failed(reason) => warn!(repo = %repo.full_name(), "File tree unavailable: {}", reason),
                Fetched::Absent | Fetched::NotRequested => {}
            }
        }

        let scores = self.scorer.calculate(&metrics, &signals);

        Ok(DiscoveryCandidate {
            github_url: repo.url(),
            owner: owner.to_string(),
            name: name.to_string(),
            description: repo.description.clone(),
            language: repo.language.clone(),
            license: repo.license_name(),
            created_at: repo.created_at,
            pushed_at: repo.pushed_at,
            topics: repo.topics.clone(),
            metrics,
            signals,
            scores,
            ai_analysis: analysis.value(),
            status: Default::default(),
            discovered_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
            notes: None,
            discovery_strategy: Some(strategy.as_str().to_string()),
            run_id: Some(run_id.to_string()),
        })
    }
}
