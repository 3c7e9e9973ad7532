use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::SearchStrategy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level configuration. Built once and handed to each component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviveConfig {
    pub ai: AiSettings,
    pub github: GitHubSettings,
    pub discovery: DiscoveryConfig,
}

impl ReviveConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub daily_budget_usd: f64,
    pub alert_threshold_usd: f64,
    pub app_name: String,
    pub app_url: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "anthropic/claude-3-haiku".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            daily_budget_usd: 50.0,
            alert_threshold_usd: 10.0,
            app_name: "Revive".to_string(),
            app_url: "https://github.com/revive-oss/revive".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubSettings {
    #[serde(skip_serializing)]
    pub token: String,
    pub api_base: String,
    pub api_version: String,
    pub timeout_secs: u64,
    /// Wall-clock ceiling for a single paginated search.
    pub scan_deadline_secs: u64,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://api.github.com".to_string(),
            api_version: "2022-11-28".to_string(),
            timeout_secs: 30,
            scan_deadline_secs: 300,
        }
    }
}

/// Weights of the potential score. Defaults sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringWeights {
    pub quality: f64,
    pub uniqueness: f64,
    pub completeness: f64,
    pub effort: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            quality: 0.30,
            uniqueness: 0.25,
            completeness: 0.25,
            effort: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    pub name: String,
    pub version: String,
    /// Model requested for repository analysis; `None` uses the provider default.
    pub model: Option<String>,

    pub strategies: Vec<SearchStrategy>,
    pub max_results_per_strategy: usize,
    pub min_stars: u32,
    pub max_stars: u32,
    pub languages: Vec<String>,

    pub analyze_readme: bool,
    pub inspect_file_tree: bool,
    pub analysis_max_tokens: u32,
    pub analysis_temperature: f32,
    pub readme_char_limit: usize,

    pub max_repos_per_run: usize,
    pub acceptance_threshold: f64,
    pub weights: ScoringWeights,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            name: "discovery-agent".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model: None,
            strategies: vec![SearchStrategy::AbandonedStars, SearchStrategy::SoloDeveloper],
            max_results_per_strategy: 100,
            min_stars: 5,
            max_stars: 500,
            languages: ["python", "javascript", "typescript", "go", "rust"]
                .iter()
                .map(|l| l.to_string())
                .collect(),
            analyze_readme: true,
            inspect_file_tree: true,
            analysis_max_tokens: 1000,
            analysis_temperature: 0.3,
            readme_char_limit: 4000,
            max_repos_per_run: 50,
            acceptance_threshold: 0.5,
            weights: ScoringWeights::default(),
        }
    }
}
