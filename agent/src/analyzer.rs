//! Repository analyzer.
//!
//! Cheap signals come from search metadata. When enabled and a README is
//! available, the completion service is asked for a structured JSON
//! analysis that refines those signals. Analysis never fails the caller:
//! any provider or parse error surfaces as `Fetched::Failed`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use common::config::DiscoveryConfig;
use common::models::{clamp_unit, AIAnalysis, RepositorySignals};
use common::Fetched;
use providers::{CompletionRequest, Message, ProviderManager};

use crate::scanner::{GitHubRepo, TreeEntry};

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a technical analyst evaluating open-source repositories for revival potential.

Your task is to analyze a repository and provide:
1. A brief summary of what the project does
2. Key strengths of the codebase
3. Key weaknesses or areas needing improvement
4. Recommendation for revival effort (low/medium/high)
5. Estimated hours to bring to production quality
6. Target audience for this project

Be concise and factual. Focus on technical aspects, not popularity.

Respond in JSON format:
{
    "summary": "...",
    "strengths": ["...", "..."],
    "weaknesses": ["...", "..."],
    "revival_recommendation": "low|medium|high effort, [reason]",
    "estimated_effort_hours": 100,
    "target_audience": "..."
}"#;

const TRUNCATION_MARKER: &str = "\n\n[README truncated...]";
const ABANDONED_AFTER_DAYS: i64 = 365;

const TEST_DIRS: &[&str] = &["tests", "test", "spec", "__tests__"];
const CI_ENTRIES: &[&str] = &[
    ".github",
    ".travis.yml",
    ".gitlab-ci.yml",
    ".circleci",
    "azure-pipelines.yml",
    "Jenkinsfile",
];
const DOC_ENTRIES: &[&str] = &["docs", "doc", "mkdocs.yml"];

/// Spend of one analysis completion, reported back for per-run accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionUsage {
    pub provider: String,
    pub model: String,
    pub tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub signals: RepositorySignals,
    pub analysis: Fetched<AIAnalysis>,
    /// Set whenever a completion was paid for, even if its reply was unusable.
    pub usage: Option<CompletionUsage>,
}

pub struct RepositoryAnalyzer {
    ai: Arc<ProviderManager>,
    config: Arc<DiscoveryConfig>,
}

impl RepositoryAnalyzer {
    pub fn new(ai: Arc<ProviderManager>, config: Arc<DiscoveryConfig>) -> Self {
        Self { ai, config }
    }

    /// `analysis` is `NotRequested` when analysis is switched off, `Absent`
    /// when there is no README to analyse, and `Failed` when the README
    /// fetch, the completion or the reply parsing failed.
    pub async fn analyze(&self, repo: &GitHubRepo, readme: &Fetched<String>) -> AnalysisOutcome {
        let mut signals = base_signals(repo, Utc::now());

        let text = readme.as_value().map(String::as_str).filter(|r| !r.trim().is_empty());
        if text.is_some() && !signals.has_readme {
            signals.has_readme = true;
            signals.has_documentation = true;
            signals.documentation_quality = 0.5;
        }

        let skipped = |analysis| AnalysisOutcome { signals: signals.clone(), analysis, usage: None };
        if !self.config.analyze_readme {
            return skipped(Fetched::NotRequested);
        }
        let text = match (text, readme) {
            (Some(text), _) => text,
            (None, Fetched::Failed(reason)) => return skipped(Fetched::Failed(format!("README unavailable: {}", reason))),
            (None, Fetched::NotRequested) => return skipped(Fetched::NotRequested),
            (None, _) => return skipped(Fetched::Absent),
        };

        let (analysis, usage) = self.request_analysis(repo, text).await;
        if let Fetched::Value(ref a) = analysis {
            refine_with_analysis(&mut signals, a);
        }
        AnalysisOutcome { signals, analysis, usage }
    }

    async fn request_analysis(&self, repo: &GitHubRepo, readme: &str) -> (Fetched<AIAnalysis>, Option<CompletionUsage>) {
        let prompt = build_prompt(repo, readme, self.config.readme_char_limit);
        let mut request = CompletionRequest::new(vec![
            Message::system(ANALYSIS_SYSTEM_PROMPT),
            Message::user(prompt),
        ])
        .with_max_tokens(self.config.analysis_max_tokens)
        .with_temperature(self.config.analysis_temperature);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }

        let response = match self.ai.complete(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(repo = %repo.full_name(), "AI analysis unavailable: {}", e);
                return (Fetched::Failed(e.to_string()), None);
            }
        };
        let usage = CompletionUsage {
            provider: response.provider.clone(),
            model: response.model.clone(),
            tokens: response.usage.total_tokens,
            cost_usd: response.cost.total_cost,
            latency_ms: response.latency_ms,
        };

        let analysis = match parse_analysis(&response.content) {
            Ok(analysis) => Fetched::Value(analysis),
            Err(e) => {
                debug!(repo = %repo.full_name(), "Discarding unparseable analysis: {}", e);
                Fetched::Failed(format!("unparseable analysis: {}", e))
            }
        };
        (analysis, Some(usage))
    }
}

/// Signals derivable from search metadata alone.
pub fn base_signals(repo: &GitHubRepo, now: DateTime<Utc>) -> RepositorySignals {
    let has_readme = repo.has_readme.unwrap_or(false) || repo.description.is_some();
    let is_abandoned = repo
        .pushed_at
        .map(|pushed| now - pushed > Duration::days(ABANDONED_AFTER_DAYS))
        .unwrap_or(false);

    RepositorySignals {
        is_abandoned,
        has_readme,
        has_license: repo.license.is_some(),
        has_tests: false,
        has_ci: false,
        has_documentation: has_readme,
        documentation_quality: if has_readme { 0.5 } else { 0.0 },
        code_quality_estimate: 0.5,
    }
}

/// User prompt for one repository. The README is cut at `limit` characters.
pub fn build_prompt(repo: &GitHubRepo, readme: &str, limit: usize) -> String {
    let readme = match readme.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &readme[..cut], TRUNCATION_MARKER),
        None => readme.to_string(),
    };
    let license = match &repo.license {
        Some(l) => l.name.clone().unwrap_or_else(|| "Unknown".into()),
        None => "None".into(),
    };
    let date = |d: Option<DateTime<Utc>>| d.map(|d| d.to_rfc3339()).unwrap_or_else(|| "Unknown".into());

    format!(
        "Analyze this repository:\n\n\
         **Repository:** {}\n\
         **Description:** {}\n\
         **Language:** {}\n\
         **Stars:** {}\n\
         **Forks:** {}\n\
         **Open Issues:** {}\n\
         **Topics:** {}\n\
         **License:** {}\n\
         **Created:** {}\n\
         **Last Push:** {}\n\n\
         **README Content:**\n```\n{}\n```\n\n\
         Analyze this repository for revival potential.",
        repo.full_name(),
        repo.description.as_deref().unwrap_or("No description"),
        repo.language.as_deref().unwrap_or("Unknown"),
        repo.stargazers_count,
        repo.forks_count,
        repo.open_issues_count,
        repo.topics.join(", "),
        license,
        date(repo.created_at),
        date(repo.pushed_at),
        readme,
    )
}

/// Parse a model reply, tolerating a surrounding markdown code fence.
pub fn parse_analysis(content: &str) -> Result<AIAnalysis, serde_json::Error> {
    let content = content.trim();
    if !content.starts_with("```") {
        return serde_json::from_str(content);
    }
    let mut lines: Vec<&str> = content.lines().skip(1).collect();
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    serde_json::from_str(&lines.join("\n"))
}

/// Fold an analysis into the signals.
pub fn refine_with_analysis(signals: &mut RepositorySignals, analysis: &AIAnalysis) {
    let recommendation = analysis.revival_recommendation.to_lowercase();
    if recommendation.contains("low") {
        signals.code_quality_estimate = 0.8;
    } else if recommendation.contains("medium") {
        signals.code_quality_estimate = 0.6;
    } else if recommendation.contains("high") {
        signals.code_quality_estimate = 0.4;
    }

    if analysis.strengths.iter().any(|s| s.to_lowercase().contains("test")) {
        signals.has_tests = true;
    }

    let mentions = |items: &[String]| items.iter().filter(|s| s.to_lowercase().contains("doc")).count() as f64;
    let doc_balance = mentions(&analysis.strengths) - mentions(&analysis.weaknesses);
    signals.documentation_quality = clamp_unit(0.5 + 0.2 * doc_balance);
}

/// Raise presence flags from top-level file names. Never clears a flag.
pub fn refine_with_tree(signals: &mut RepositorySignals, entries: &[TreeEntry]) {
    let present = |names: &[&str]| entries.iter().any(|e| names.contains(&e.name.as_str()));

    if entries.iter().any(|e| e.is_dir() && TEST_DIRS.contains(&e.name.as_str())) {
        signals.has_tests = true;
    }
    if present(CI_ENTRIES) {
        signals.has_ci = true;
    }
    if present(DOC_ENTRIES) {
        signals.has_documentation = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{RepoLicense, RepoOwner};
    use async_trait::async_trait;
    use providers::{
        AIProvider, CompletionResponse, CompletionStream, Cost, ModelPricing, ProviderError, TokenUsage,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedProvider {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AIProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.temperature, 0.3);
            assert_eq!(request.max_tokens, 1000);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                model: "canned/model".into(),
                usage: TokenUsage { prompt_tokens: 800, completion_tokens: 200, total_tokens: 1000 },
                cost: Cost::default(),
                latency_ms: 1,
                provider: "canned".into(),
                request_id: None,
            })
        }

        async fn complete_stream(&self, _request: &CompletionRequest) -> Result<CompletionStream, ProviderError> {
            Err(ProviderError::Transport { provider: "canned".into(), message: "unsupported".into() })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn get_model_pricing(&self, _model: &str) -> ModelPricing {
            ModelPricing::default()
        }
    }

    fn analyzer(reply: &str, config: DiscoveryConfig) -> (RepositoryAnalyzer, Arc<CannedProvider>) {
        let provider = Arc::new(CannedProvider { reply: reply.to_string(), calls: AtomicUsize::new(0) });
        let manager = Arc::new(ProviderManager::new(provider.clone(), vec![], 10.0));
        (RepositoryAnalyzer::new(manager, Arc::new(config)), provider)
    }

    fn readme(text: &str) -> Fetched<String> {
        Fetched::Value(text.to_string())
    }

    fn repo() -> GitHubRepo {
        GitHubRepo {
            owner: RepoOwner { login: "octo".into() },
            name: "widget".into(),
            full_name: "octo/widget".into(),
            html_url: String::new(),
            description: None,
            language: Some("Rust".into()),
            license: Some(RepoLicense { spdx_id: Some("MIT".into()), name: Some("MIT License".into()) }),
            stargazers_count: 40,
            forks_count: 2,
            open_issues_count: 1,
            watchers_count: 40,
            created_at: None,
            pushed_at: Some(Utc::now() - Duration::days(500)),
            topics: vec!["cli".into(), "tooling".into()],
            archived: false,
            has_readme: None,
        }
    }

    #[test]
    fn test_base_signals() {
        let signals = base_signals(&repo(), Utc::now());
        assert!(signals.is_abandoned);
        assert!(signals.has_license);
        assert!(!signals.has_readme);
        assert_eq!(signals.documentation_quality, 0.0);
        assert_eq!(signals.code_quality_estimate, 0.5);

        let mut described = repo();
        described.description = Some("Widgets".into());
        described.pushed_at = Some(Utc::now() - Duration::days(10));
        let signals = base_signals(&described, Utc::now());
        assert!(!signals.is_abandoned);
        assert!(signals.has_readme && signals.has_documentation);
        assert_eq!(signals.documentation_quality, 0.5);
    }

    #[test]
    fn test_prompt_truncates_readme() {
        let readme = "é".repeat(50);
        let prompt = build_prompt(&repo(), &readme, 10);
        assert!(prompt.contains(&format!("{}\n\n[README truncated...]", "é".repeat(10))));
        assert!(!prompt.contains(&"é".repeat(11)));
        assert!(prompt.contains("**License:** MIT License"));
        assert!(prompt.contains("**Topics:** cli, tooling"));

        let short = build_prompt(&repo(), "tiny", 10);
        assert!(!short.contains("[README truncated...]"));
    }

    #[test]
    fn test_parse_analysis_fenced_and_bare() {
        let fenced = "```json\n{\"summary\": \"s\", \"strengths\": [\"a\"]}\n```";
        assert_eq!(parse_analysis(fenced).unwrap().strengths, vec!["a".to_string()]);

        let bare = "  {\"summary\": \"s\", \"estimated_effort_hours\": 40}  ";
        assert_eq!(parse_analysis(bare).unwrap().estimated_effort_hours, Some(40.0));

        assert!(parse_analysis("Sure! Here is my analysis.").is_err());
    }

    #[test]
    fn test_refine_with_analysis() {
        let mut signals = base_signals(&repo(), Utc::now());
        let analysis = AIAnalysis {
            strengths: vec!["Good DOCS".into(), "Well Tested core".into(), "docstrings".into()],
            weaknesses: vec!["outdated documentation".into()],
            revival_recommendation: "HIGH effort, legacy build".into(),
            ..Default::default()
        };
        refine_with_analysis(&mut signals, &analysis);
        assert_eq!(signals.code_quality_estimate, 0.4);
        assert!(signals.has_tests);
        assert!((signals.documentation_quality - 0.7).abs() < 1e-12);

        let negative = AIAnalysis {
            weaknesses: vec!["no docs".into(), "doc gaps".into(), "docs missing".into()],
            ..Default::default()
        };
        refine_with_analysis(&mut signals, &negative);
        assert_eq!(signals.documentation_quality, 0.0);
        // Unrecognised recommendation leaves the estimate alone.
        assert_eq!(signals.code_quality_estimate, 0.4);
    }

    #[test]
    fn test_refine_with_tree_only_raises_flags() {
        let mut signals = base_signals(&repo(), Utc::now());
        signals.has_documentation = true;
        let entries = vec![
            TreeEntry { name: "tests".into(), kind: "dir".into() },
            TreeEntry { name: ".travis.yml".into(), kind: "file".into() },
            TreeEntry { name: "src".into(), kind: "dir".into() },
        ];
        refine_with_tree(&mut signals, &entries);
        assert!(signals.has_tests);
        assert!(signals.has_ci);
        assert!(signals.has_documentation);

        // A file called `test` is not a test directory.
        let mut bare = base_signals(&repo(), Utc::now());
        refine_with_tree(&mut bare, &[TreeEntry { name: "test".into(), kind: "file".into() }]);
        assert!(!bare.has_tests);
    }

    #[tokio::test]
    async fn test_fenced_medium_effort_sets_quality() {
        let reply = "```json\n{\"summary\": \"Widget toolkit\", \"strengths\": [], \"weaknesses\": [], \
                     \"revival_recommendation\": \"Medium effort, needs dependency updates\"}\n```";
        let (analyzer, provider) = analyzer(reply, DiscoveryConfig::default());

        let outcome = analyzer.analyze(&repo(), &readme("# Widget")).await;
        assert_eq!(outcome.signals.code_quality_estimate, 0.6);
        assert!(outcome.signals.has_readme);
        assert_eq!(outcome.analysis.value().map(|a| a.summary), Some("Widget toolkit".to_string()));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let usage = outcome.usage.unwrap();
        assert_eq!(usage.tokens, 1000);
        assert_eq!(usage.provider, "canned");
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_failed_not_error() {
        let (analyzer, _) = analyzer("I cannot help with that.", DiscoveryConfig::default());
        let outcome = analyzer.analyze(&repo(), &readme("# Widget")).await;
        assert!(outcome.analysis.is_failed());
        assert_eq!(outcome.signals.code_quality_estimate, 0.5);
        // The call was still paid for.
        assert_eq!(outcome.usage.map(|u| u.tokens), Some(1000));
    }

    #[tokio::test]
    async fn test_analysis_not_requested() {
        let config = DiscoveryConfig { analyze_readme: false, ..Default::default() };
        let (disabled, provider) = analyzer("{}", config);
        let outcome = disabled.analyze(&repo(), &readme("# Widget")).await;
        assert_eq!(outcome.analysis, Fetched::NotRequested);
        assert!(outcome.usage.is_none());
        // The README still counts as documentation.
        assert!(outcome.signals.has_readme);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_readme_is_absent_and_failed_fetch_is_failed() {
        let (enabled, provider) = analyzer("{}", DiscoveryConfig::default());

        let missing = enabled.analyze(&repo(), &Fetched::Absent).await;
        assert_eq!(missing.analysis, Fetched::Absent);

        let blank = enabled.analyze(&repo(), &readme("  \n")).await;
        assert_eq!(blank.analysis, Fetched::Absent);
        assert!(!blank.signals.has_readme);

        let failed = enabled.analyze(&repo(), &Fetched::Failed("HTTP 502".into())).await;
        match failed.analysis {
            Fetched::Failed(reason) => assert!(reason.contains("HTTP 502"), "{}", reason),
            other => panic!("expected Failed, got {:?}", other),
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
