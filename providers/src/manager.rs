//! Provider manager: ordered fallback plus daily budget admission.
//!
//! Providers are tried primary first. The first success wins and is the only
//! call that lands in the usage ledger. Every failure, retryable or not, moves
//! on to the next provider.
//!
//! Budget admission, the provider calls and the usage append run under one
//! async lock, so concurrent callers sharing a manager always see each other's
//! spend before being admitted. The cost of a call is only known once it
//! returns, so there is nothing smaller to reserve up front. The price is
//! throughput: completions through one manager run one at a time, and a slow
//! provider chain (up to its timeout per provider) delays every waiting
//! caller. Runs that need parallel analysis should each own a manager.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use common::config::AiSettings;

use crate::openrouter::OpenRouterProvider;
use crate::usage::{UsageStats, UsageTracker};
use crate::{AIProvider, CompletionRequest, CompletionResponse, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("daily budget exhausted: spent ${spent:.4} of ${budget:.2}")]
    BudgetExhausted { spent: f64, budget: f64 },

    #[error("all {} providers failed, last error: {}", .errors.len(), last_message(.errors))]
    AllProvidersFailed { errors: Vec<ProviderError> },
}

fn last_message(errors: &[ProviderError]) -> String {
    errors.last().map(|e| e.to_string()).unwrap_or_else(|| "none".into())
}

pub struct ProviderManager {
    providers: Vec<Arc<dyn AIProvider>>,
    daily_budget_usd: f64,
    alert_threshold_usd: Option<f64>,
    usage: Arc<UsageTracker>,
    admission: Mutex<()>,
    alerted_on: StdMutex<Option<NaiveDate>>,
}

impl ProviderManager {
    pub fn new(
        primary: Arc<dyn AIProvider>,
        fallbacks: Vec<Arc<dyn AIProvider>>,
        daily_budget_usd: f64,
    ) -> Self {
        let mut providers = Vec::with_capacity(1 + fallbacks.len());
        providers.push(primary);
        providers.extend(fallbacks);
        Self {
            providers,
            daily_budget_usd,
            alert_threshold_usd: None,
            usage: Arc::new(UsageTracker::new()),
            admission: Mutex::new(()),
            alerted_on: StdMutex::new(None),
        }
    }

    /// OpenRouter as the sole provider, budgets taken from settings.
    pub fn from_settings(settings: &AiSettings) -> Result<Self, ProviderError> {
        let primary = Arc::new(OpenRouterProvider::new(settings)?);
        Ok(Self::new(primary, Vec::new(), settings.daily_budget_usd)
            .with_alert_threshold(settings.alert_threshold_usd))
    }

    /// Log a warning the first time today's spend reaches `threshold`.
    pub fn with_alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold_usd = Some(threshold);
        self
    }

    /// Share a ledger, e.g. to seed spend in tests or to aggregate managers.
    pub fn with_usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ManagerError> {
        let _admitted = self.admission.lock().await;

        let spent = self.usage.daily_cost();
        if spent >= self.daily_budget_usd {
            tracing::warn!(
                spent = spent,
                budget = self.daily_budget_usd,
                "💸 Daily budget exhausted, rejecting completion"
            );
            return Err(ManagerError::BudgetExhausted {
                spent,
                budget: self.daily_budget_usd,
            });
        }

        let total = self.providers.len();
        let mut errors = Vec::new();
        for (attempt, provider) in self.providers.iter().enumerate() {
            match provider.complete(request).await {
                Ok(resp) => {
                    self.usage.record(&resp);
                    self.check_alert();
                    return Ok(resp);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        attempt = attempt + 1,
                        of = total,
                        retryable = e.is_retryable(),
                        "Completion failed: {}",
                        e
                    );
                    errors.push(e);
                }
            }
        }

        tracing::error!("All {} providers failed", total);
        Err(ManagerError::AllProvidersFailed { errors })
    }

    pub fn get_usage_stats(&self, since: Option<DateTime<Utc>>) -> UsageStats {
        self.usage.stats(since)
    }

    pub fn get_daily_cost(&self) -> f64 {
        self.usage.daily_cost()
    }

    pub fn get_budget_remaining(&self) -> f64 {
        (self.daily_budget_usd - self.get_daily_cost()).max(0.0)
    }

    /// Health-check every provider in priority order.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut results = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            results.push((provider.name().to_string(), provider.health_check().await));
        }
        results
    }

    /// Returns true when this call raised today's alert.
    fn check_alert(&self) -> bool {
        let Some(threshold) = self.alert_threshold_usd else {
            return false;
        };
        let spent = self.usage.daily_cost();
        if spent < threshold {
            return false;
        }
        let today = Utc::now().date_naive();
        let mut alerted = self.alerted_on.lock().unwrap_or_else(|e| e.into_inner());
        if *alerted == Some(today) {
            return false;
        }
        *alerted = Some(today);
        tracing::warn!(
            spent = spent,
            threshold = threshold,
            budget = self.daily_budget_usd,
            "🚨 Daily spend passed alert threshold"
        );
        true
    }
}
