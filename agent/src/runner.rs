//! Run executor: drives an agent and writes through a [`DiscoveryStore`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use common::models::SearchStrategy;
use common::store::DiscoveryStore;

use crate::discovery::{AgentResult, DiscoveryAgent};

/// Persist the run as `running`, execute it, save every accepted candidate
/// (last write wins) and store the terminal run record.
pub async fn execute_run(
    store: &dyn DiscoveryStore,
    agent: &DiscoveryAgent,
    strategy: Option<SearchStrategy>,
    max_repos: Option<usize>,
) -> Result<AgentResult> {
    let run = agent.prepare_run(strategy);
    let run_id = run.run_id.clone();
    store
        .save_run(run.clone())
        .await
        .context("Failed to record run start")?;

    let result = agent.run_prepared(run, strategy, max_repos).await;
    finish_run(store, &result).await?;

    info!(
        run_id = %run_id,
        status = %result.data.status,
        candidates = result.data.candidates_found,
        "💾 Run stored"
    );
    Ok(result)
}

async fn finish_run(store: &dyn DiscoveryStore, result: &AgentResult) -> Result<()> {
    for candidate in &result.data.candidates {
        if let Err(e) = store.save_candidate(candidate.clone()).await {
            warn!(candidate = %candidate.id(), "Failed to save candidate: {}", e);
        }
    }
    store
        .update_run(result.data.clone())
        .await
        .with_context(|| format!("Failed to record outcome of run {}", result.data.run_id))
}

/// Start a run in the background. The run is stored before this returns,
/// so callers can poll it by id straight away.
pub async fn spawn_run(
    store: Arc<dyn DiscoveryStore>,
    agent: Arc<DiscoveryAgent>,
    strategy: Option<SearchStrategy>,
    max_repos: Option<usize>,
) -> Result<(String, JoinHandle<Result<AgentResult>>)> {
    let run = agent.prepare_run(strategy);
    let run_id = run.run_id.clone();
    store
        .save_run(run.clone())
        .await
        .context("Failed to record run start")?;

    let handle = tokio::spawn(async move {
        let result = agent.run_prepared(run, strategy, max_repos).await;
        finish_run(store.as_ref(), &result).await?;
        Ok(result)
    });
    Ok((run_id, handle))
}
