//! In-memory usage ledger. One append-only record per successful completion.
//!
//! The ledger only grows for the life of the process. Daily spend is the sum
//! of records whose timestamp falls on today's UTC date.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::CompletionResponse;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
    pub latency_ms: u64,
}

impl UsageRecord {
    pub fn from_response(response: &CompletionResponse) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: response.provider.clone(),
            model: response.model.clone(),
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
            total_cost: response.cost.total_cost,
            latency_ms: response.latency_ms,
        }
    }
}

/// Aggregated usage over a window of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
    pub by_provider: HashMap<String, usize>,
    pub by_model: HashMap<String, usize>,
}

#[derive(Default)]
pub struct UsageTracker {
    records: RwLock<Vec<UsageRecord>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, response: &CompletionResponse) {
        self.record_entry(UsageRecord::from_response(response));
    }

    pub fn record_entry(&self, entry: UsageRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.push(entry);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<UsageRecord> {
        self.records.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Aggregate all records, or only those at or after `since`.
    pub fn stats(&self, since: Option<DateTime<Utc>>) -> UsageStats {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let window: Vec<&UsageRecord> = records
            .iter()
            .filter(|r| since.map_or(true, |s| r.timestamp >= s))
            .collect();

        if window.is_empty() {
            return UsageStats::default();
        }

        let mut stats = UsageStats {
            total_requests: window.len(),
            ..Default::default()
        };
        let mut latency_sum = 0u64;
        for r in &window {
            stats.total_tokens += r.prompt_tokens + r.completion_tokens;
            stats.total_cost += r.total_cost;
            latency_sum += r.latency_ms;
            *stats.by_provider.entry(r.provider.clone()).or_insert(0) += 1;
            *stats.by_model.entry(r.model.clone()).or_insert(0) += 1;
        }
        stats.avg_latency_ms = latency_sum as f64 / window.len() as f64;
        stats
    }

    pub fn daily_cost(&self) -> f64 {
        self.cost_on(Utc::now().date_naive())
    }

    pub fn cost_on(&self, date: NaiveDate) -> f64 {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .iter()
            .filter(|r| r.timestamp.date_naive() == date)
            .map(|r| r.total_cost)
            .sum()
    }
}
