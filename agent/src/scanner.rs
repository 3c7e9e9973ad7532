//! GitHub scanner: strategy-driven search plus per-repository enrichment.
//!
//! Search pages through `/search/repositories` per language until the
//! shared result quota is met, the upstream runs dry, a rate limit shows
//! up, or the scan deadline passes. Secondary lookups (contributors,
//! commits, releases, README, file tree) are best-effort per field.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use common::config::GitHubSettings;
use common::models::{RepositoryMetrics, SearchStrategy};
use common::Fetched;

use crate::error::{ScanError, ScanResult};

const ABANDONED_AFTER_DAYS: i64 = 365;
const MAX_PER_PAGE: usize = 100;
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

// ── Repository records ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoLicense {
    pub spdx_id: Option<String>,
    pub name: Option<String>,
}

/// A repository as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub owner: RepoOwner,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub license: Option<RepoLicense>,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    #[serde(default)]
    pub open_issues_count: i64,
    #[serde(default)]
    pub watchers_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    /// Not part of the search payload; set when a caller already knows.
    #[serde(default)]
    pub has_readme: Option<bool>,
}

impl GitHubRepo {
    pub fn full_name(&self) -> String {
        if self.full_name.is_empty() {
            format!("{}/{}", self.owner.login, self.name)
        } else {
            self.full_name.clone()
        }
    }

    pub fn url(&self) -> String {
        if self.html_url.is_empty() {
            format!("https://github.com/{}/{}", self.owner.login, self.name)
        } else {
            self.html_url.clone()
        }
    }

    /// SPDX id when GitHub recognised the license, otherwise its display name.
    pub fn license_name(&self) -> Option<String> {
        let license = self.license.as_ref()?;
        license
            .spdx_id
            .clone()
            .filter(|id| !id.is_empty() && id != "NOASSERTION")
            .or_else(|| license.name.clone())
    }

    pub fn days_since_push(&self, now: DateTime<Utc>) -> Option<i64> {
        self.pushed_at.map(|pushed| (now - pushed).num_days().max(0))
    }
}

/// One top-level entry of a repository's file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// Outcome of each secondary metrics lookup, before folding into
/// [`RepositoryMetrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryMetrics {
    pub contributors: Fetched<i64>,
    pub commits_last_year: Fetched<i64>,
    pub release_age_days: Fetched<i64>,
}

// ── Source contract ─────────────────────────────────────────────────

/// Where the agent gets repositories from.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn search(
        &self,
        strategy: SearchStrategy,
        languages: &[String],
        min_stars: u32,
        max_stars: u32,
        max_results: usize,
    ) -> ScanResult<Vec<GitHubRepo>>;

    /// Secondary lookups degrade per field: a failed lookup falls back to
    /// zero/absent and is listed in `degraded`. An error means the
    /// repository itself could not be examined.
    async fn get_metrics(&self, repo: &GitHubRepo) -> ScanResult<RepositoryMetrics>;

    async fn get_readme(&self, owner: &str, name: &str) -> Fetched<String>;

    async fn get_file_tree(&self, owner: &str, name: &str) -> Fetched<Vec<TreeEntry>>;
}

// ── Query building ──────────────────────────────────────────────────

/// Search query for one strategy and language. `cutoff` is the push date
/// before which a repository counts as abandoned.
pub fn build_query(
    strategy: SearchStrategy,
    language: &str,
    min_stars: u32,
    max_stars: u32,
    cutoff: &str,
) -> String {
    let query = match strategy {
        SearchStrategy::AbandonedStars => {
            format!("stars:{}..{} pushed:<{} archived:false", min_stars, max_stars, cutoff)
        }
        SearchStrategy::UnfinishedIdeas => {
            "stars:5..50 (topic:mvp OR topic:prototype OR topic:proof-of-concept)".to_string()
        }
        SearchStrategy::SoloDeveloper => format!("stars:20..200 pushed:<{} archived:false", cutoff),
        SearchStrategy::LanguageSpecific => format!(
            "language:{} stars:{}..{} pushed:<{}",
            language, min_stars, max_stars, cutoff
        ),
    };
    if query.contains("language:") {
        query
    } else {
        format!("language:{} {}", language, query)
    }
}

/// Page number of the `rel="last"` entry of a `Link` header.
pub fn last_page_from_link(link: &str) -> Option<i64> {
    let last = link.split(',').find(|part| part.contains(r#"rel="last""#))?;
    let url = last.split(';').next()?.trim();
    let url = url.trim_start_matches('<').trim_end_matches('>');
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|page| page.parse().ok())
}

/// Fold secondary lookups into metrics; failed lookups degrade to zero/absent.
pub fn assemble_metrics(repo: &GitHubRepo, secondary: SecondaryMetrics, now: DateTime<Utc>) -> RepositoryMetrics {
    let mut degraded = Vec::new();
    let mut take = |field: &str, fetched: Fetched<i64>| -> Option<i64> {
        if let Fetched::Failed(reason) = &fetched {
            debug!(repo = %repo.full_name(), field, "Metric degraded: {}", reason);
            degraded.push(field.to_string());
        }
        fetched.value()
    };

    let contributors_count = take("contributors_count", secondary.contributors).unwrap_or(0);
    let commit_count_last_year = take("commit_count_last_year", secondary.commits_last_year).unwrap_or(0);
    let days_since_last_release = take("days_since_last_release", secondary.release_age_days);

    RepositoryMetrics {
        stars: repo.stargazers_count,
        forks: repo.forks_count,
        open_issues: repo.open_issues_count,
        watchers: repo.watchers_count,
        contributors_count,
        commit_count_last_year,
        days_since_last_commit: repo.days_since_push(now).unwrap_or(0),
        days_since_last_release,
        degraded,
    }
}

// ── GitHub client ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<GitHubRepo>,
}

#[derive(Deserialize)]
struct LatestRelease {
    published_at: Option<DateTime<Utc>>,
}

/// Repositories gathered for one query, and whether paging was cut short.
struct Harvest {
    repos: Vec<GitHubRepo>,
    halted: bool,
}

pub struct GitHubScanner {
    client: reqwest::Client,
    api_base: String,
    scan_deadline: Duration,
}

impl GitHubScanner {
    pub fn new(settings: &GitHubSettings) -> ScanResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Ok(version) = HeaderValue::from_str(&settings.api_version) {
            headers.insert("X-GitHub-Api-Version", version);
        }
        if !settings.token.is_empty() {
            match HeaderValue::from_str(&format!("Bearer {}", settings.token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("GitHub token is not a valid header value, scanning unauthenticated"),
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("revive-discovery/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            scan_deadline: Duration::from_secs(settings.scan_deadline_secs),
        })
    }

    /// Issue a GET. 403/429 map to `RateLimited`, 404 to `Ok(None)`.
    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
        accept: Option<&'static str>,
    ) -> ScanResult<Option<reqwest::Response>> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let resp = request.send().await?;
        let status = resp.status();

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScanError::RateLimited { status: status.as_u16(), url });
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ScanError::Status { status: status.as_u16(), url });
        }
        Ok(Some(resp))
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ScanResult<Option<T>> {
        let Some(resp) = self.fetch(path, query, None).await? else {
            return Ok(None);
        };
        let url = resp.url().to_string();
        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| ScanError::Decode { url, message: e.to_string() })
    }

    async fn search_repos(&self, query: &str, max_results: usize, deadline: Instant) -> ScanResult<Harvest> {
        let mut harvest = Harvest { repos: Vec::new(), halted: false };
        if max_results == 0 {
            return Ok(harvest);
        }
        let per_page = max_results.min(MAX_PER_PAGE);
        let mut page = 1usize;

        while harvest.repos.len() < max_results {
            if Instant::now() >= deadline {
                warn!(query, collected = harvest.repos.len(), "⏱️ Scan deadline reached, returning partial results");
                harvest.halted = true;
                break;
            }

            let params = [
                ("q", query.to_string()),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ];
            let body: SearchResponse = match self.fetch_json("/search/repositories", &params).await {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(e) if e.is_rate_limited() => {
                    warn!(query, collected = harvest.repos.len(), "GitHub search rate limited: {}", e);
                    harvest.halted = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            let count = body.items.len();
            if count == 0 {
                break;
            }
            harvest.repos.extend(body.items);
            page += 1;
            if count < per_page {
                break;
            }
        }

        harvest.repos.truncate(max_results);
        Ok(harvest)
    }

    /// Item count via the `rel="last"` page of a `per_page=1` listing.
    async fn count_listing(&self, path: &str, query: &[(&str, String)]) -> ScanResult<Option<i64>> {
        let Some(resp) = self.fetch(path, query, None).await? else {
            return Ok(None);
        };
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(Some(0));
        }
        let last_page = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page_from_link);
        if let Some(count) = last_page {
            return Ok(Some(count));
        }

        let url = resp.url().to_string();
        let items: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| ScanError::Decode { url, message: e.to_string() })?;
        Ok(Some(items.len() as i64))
    }

    async fn contributors_count(&self, owner: &str, name: &str) -> ScanResult<Option<i64>> {
        let params = [("per_page", "1".to_string()), ("anon", "false".to_string())];
        self.count_listing(&format!("/repos/{}/{}/contributors", owner, name), &params)
            .await
    }

    async fn recent_commit_count(&self, owner: &str, name: &str, now: DateTime<Utc>) -> ScanResult<Option<i64>> {
        let since = (now - ChronoDuration::days(ABANDONED_AFTER_DAYS)).to_rfc3339_opts(SecondsFormat::Secs, true);
        let params = [("since", since), ("per_page", "1".to_string())];
        self.count_listing(&format!("/repos/{}/{}/commits", owner, name), &params)
            .await
    }

    async fn days_since_release(&self, owner: &str, name: &str, now: DateTime<Utc>) -> ScanResult<Option<i64>> {
        let release: Option<LatestRelease> = self
            .fetch_json(&format!("/repos/{}/{}/releases/latest", owner, name), &[])
            .await?;
        Ok(release
            .and_then(|r| r.published_at)
            .map(|published| (now - published).num_days().max(0)))
    }

    pub async fn secondary_metrics(&self, repo: &GitHubRepo, now: DateTime<Utc>) -> SecondaryMetrics {
        let owner = repo.owner.login.as_str();
        let name = repo.name.as_str();
        SecondaryMetrics {
            contributors: self.contributors_count(owner, name).await.into(),
            commits_last_year: self.recent_commit_count(owner, name, now).await.into(),
            release_age_days: self.days_since_release(owner, name, now).await.into(),
        }
    }
}

#[async_trait]
impl RepositorySource for GitHubScanner {
    async fn search(
        &self,
        strategy: SearchStrategy,
        languages: &[String],
        min_stars: u32,
        max_stars: u32,
        max_results: usize,
    ) -> ScanResult<Vec<GitHubRepo>> {
        let cutoff = (Utc::now() - ChronoDuration::days(ABANDONED_AFTER_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let deadline = Instant::now() + self.scan_deadline;
        let mut results: Vec<GitHubRepo> = Vec::new();

        for language in languages {
            if results.len() >= max_results {
                break;
            }
            let query = build_query(strategy, language, min_stars, max_stars, &cutoff);
            debug!(strategy = %strategy, language = %language, query = %query, "Searching GitHub");

            let harvest = self.search_repos(&query, max_results - results.len(), deadline).await?;
            info!(
                strategy = %strategy,
                language = %language,
                found = harvest.repos.len(),
                "🔎 Language search complete"
            );
            results.extend(harvest.repos);
            if harvest.halted {
                break;
            }
        }

        results.truncate(max_results);
        Ok(results)
    }

    async fn get_metrics(&self, repo: &GitHubRepo) -> ScanResult<RepositoryMetrics> {
        if repo.owner.login.is_empty() || repo.name.is_empty() {
            return Err(ScanError::Decode {
                url: repo.url(),
                message: "repository record has no owner or name".into(),
            });
        }
        let now = Utc::now();
        let secondary = self.secondary_metrics(repo, now).await;
        Ok(assemble_metrics(repo, secondary, now))
    }

    async fn get_readme(&self, owner: &str, name: &str) -> Fetched<String> {
        let path = format!("/repos/{}/{}/readme", owner, name);
        let result = match self.fetch(&path, &[], Some(RAW_MEDIA_TYPE)).await {
            Ok(Some(resp)) => resp.text().await.map(Some).map_err(ScanError::from),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        result.into()
    }

    async fn get_file_tree(&self, owner: &str, name: &str) -> Fetched<Vec<TreeEntry>> {
        let path = format!("/repos/{}/{}/contents/", owner, name);
        self.fetch_json::<Vec<TreeEntry>>(&path, &[]).await.into()
    }
}
