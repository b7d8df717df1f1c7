//! GitHub profile source.
//!
//! Fetches a user's profile, their non-fork repositories (most recently
//! updated first), per-repository language byte counts, and the README of
//! the ten most-starred repositories. Each piece is rendered as a plain-text
//! document for the `github` source:
//!
//! | Document | Path |
//! |----------|------|
//! | profile summary | `profile_<login>` |
//! | one per repository | `repo_<name>` |
//!
//! Requires `GITHUB_TOKEN`. Requests pause when the `x-ratelimit-remaining`
//! header drops to 10 or below, until `x-ratelimit-reset`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::GithubConfig;

/// Source system tag for GitHub documents.
pub const GITHUB_SOURCE: &str = "github";

const README_REPO_LIMIT: usize = 10;
const README_MAX_CHARS: usize = 2000;
const RATE_LIMIT_FLOOR: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub login: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub blog: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
    #[serde(skip)]
    pub repositories: Vec<GithubRepo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(skip)]
    pub languages: BTreeMap<String, u64>,
    #[serde(skip)]
    pub readme: Option<String>,
}

#[derive(Deserialize)]
struct ReadmeJson {
    content: String,
}

pub struct GithubClient {
    config: GithubConfig,
    username: String,
    token: String,
    client: reqwest::Client,
    rate_remaining: AtomicU64,
    rate_reset: AtomicI64,
}

impl GithubClient {
    /// # Errors
    ///
    /// Fails if `github.username` is unset or `GITHUB_TOKEN` is missing.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let username = config
            .username
            .clone()
            .ok_or_else(|| anyhow!("github.username is required"))?;
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| anyhow!("GITHUB_TOKEN environment variable is required"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("Portfolio-RAG-System")
            .build()?;

        Ok(Self {
            config: config.clone(),
            username,
            token,
            client,
            rate_remaining: AtomicU64::new(5000),
            rate_reset: AtomicI64::new(chrono::Utc::now().timestamp() + 3600),
        })
    }

    /// Profile plus repositories, languages, and READMEs as configured.
    /// Per-repository language and README failures are logged and skipped.
    pub async fn fetch_profile(&self) -> Result<GithubProfile> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut profile: GithubProfile = self
            .get_json(&format!("{}/users/{}", base, self.username), &[])
            .await
            .context("Failed to fetch GitHub profile")?;

        let mut repos = self.fetch_repositories(base).await?;

        if self.config.include_languages {
            for repo in &mut repos {
                let url = format!("{}/repos/{}/{}/languages", base, self.username, repo.name);
                match self.get_json::<BTreeMap<String, u64>>(&url, &[]).await {
                    Ok(languages) => repo.languages = languages,
                    Err(e) => warn!(repo = %repo.name, error = %e, "failed to fetch languages"),
                }
            }
        }

        if self.config.include_readme {
            let mut by_stars: Vec<usize> = (0..repos.len()).collect();
            by_stars.sort_by(|&a, &b| repos[b].stargazers_count.cmp(&repos[a].stargazers_count));
            for &i in by_stars.iter().take(README_REPO_LIMIT) {
                let url = format!("{}/repos/{}/{}/readme", base, self.username, repos[i].name);
                match self.fetch_readme(&url).await {
                    Ok(text) => repos[i].readme = Some(text),
                    Err(e) => warn!(repo = %repos[i].name, error = %e, "failed to fetch README"),
                }
            }
        }

        info!(login = %profile.login, repos = repos.len(), "fetched GitHub profile");
        profile.repositories = repos;
        Ok(profile)
    }

    async fn fetch_repositories(&self, base: &str) -> Result<Vec<GithubRepo>> {
        let per_page = self.config.max_repos.clamp(1, 100).to_string();
        let repos: Vec<GithubRepo> = self
            .get_json(
                &format!("{}/users/{}/repos", base, self.username),
                &[
                    ("sort", "updated"),
                    ("direction", "desc"),
                    ("per_page", per_page.as_str()),
                ],
            )
            .await
            .context("Failed to list GitHub repositories")?;

        Ok(repos
            .into_iter()
            .take(self.config.max_repos)
            .filter(|r| !r.fork)
            .collect())
    }

    async fn fetch_readme(&self, url: &str) -> Result<String> {
        let readme: ReadmeJson = self.get_json(url, &[]).await?;
        let cleaned: String = readme
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .context("README is not valid base64")?;
        let text = String::from_utf8(bytes).context("README is not valid UTF-8")?;
        Ok(truncate_chars(&text, README_MAX_CHARS))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        self.wait_for_rate_limit().await;

        let response = self
            .client
            .get(url)
            .query(query)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .with_context(|| format!("GitHub API request failed: {}", url))?;

        self.update_rate_limit(response.headers());

        let status = response.status();
        match status.as_u16() {
            200 => Ok(response.json().await?),
            403 => bail!("Rate limit exceeded or forbidden: {}", status),
            404 => bail!("Resource not found: {}", url),
            _ => bail!("GitHub API error {} for {}", status, url),
        }
    }

    async fn wait_for_rate_limit(&self) {
        let remaining = self.rate_remaining.load(Ordering::SeqCst);
        let reset = self.rate_reset.load(Ordering::SeqCst);
        let now = chrono::Utc::now().timestamp();
        if remaining <= RATE_LIMIT_FLOOR && now < reset {
            let wait = (reset - now + 1) as u64;
            warn!(remaining, wait_secs = wait, "GitHub rate limit low, waiting");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    fn update_rate_limit(&self, headers: &reqwest::header::HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        if let Some(remaining) = header("x-ratelimit-remaining").and_then(|v| v.parse().ok()) {
            self.rate_remaining.store(remaining, Ordering::SeqCst);
        }
        if let Some(reset) = header("x-ratelimit-reset").and_then(|v| v.parse().ok()) {
            self.rate_reset.store(reset, Ordering::SeqCst);
        }
        debug!(
            remaining = self.rate_remaining.load(Ordering::SeqCst),
            "GitHub rate limit"
        );
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((pos, _)) => text[..pos].to_string(),
        None => text.to_string(),
    }
}

fn or_unspecified(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => "Not specified",
    }
}

pub fn render_profile(profile: &GithubProfile) -> String {
    format!(
        "GitHub Profile: {}\nName: {}\nBio: {}\nLocation: {}\nCompany: {}\nBlog: {}\nPublic Repositories: {}\nFollowers: {}\nFollowing: {}",
        profile.login,
        or_unspecified(&profile.name),
        or_unspecified(&profile.bio),
        or_unspecified(&profile.location),
        or_unspecified(&profile.company),
        or_unspecified(&profile.blog),
        profile.public_repos,
        profile.followers,
        profile.following,
    )
}

/// `"Rust 75.0%, Shell 25.0%"`, largest share first.
pub fn language_breakdown(languages: &BTreeMap<String, u64>) -> Option<String> {
    let total: u64 = languages.values().sum();
    if total == 0 {
        return None;
    }
    let mut shares: Vec<(&String, u64)> = languages.iter().map(|(k, &v)| (k, v)).collect();
    shares.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    Some(
        shares
            .iter()
            .map(|(lang, bytes)| format!("{} {:.1}%", lang, *bytes as f64 / total as f64 * 100.0))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

pub fn render_repo(repo: &GithubRepo) -> String {
    let mut text = format!(
        "Repository: {}\nDescription: {}\nPrimary Language: {}\nStars: {}\nForks: {}\nTopics: {}",
        repo.name,
        repo.description.as_deref().unwrap_or("No description"),
        or_unspecified(&repo.language),
        repo.stargazers_count,
        repo.forks_count,
        if repo.topics.is_empty() {
            "None".to_string()
        } else {
            repo.topics.join(", ")
        },
    );
    if let Some(breakdown) = language_breakdown(&repo.languages) {
        text.push_str("\nLanguage Breakdown: ");
        text.push_str(&breakdown);
    }
    if let Some(readme) = &repo.readme {
        text.push_str("\nREADME Content: ");
        text.push_str(readme);
    }
    text
}

/// `(file_path, content)` for the profile and each repository.
pub fn profile_documents(profile: &GithubProfile) -> Vec<(String, String)> {
    let mut docs = vec![(format!("profile_{}", profile.login), render_profile(profile))];
    docs.extend(
        profile
            .repositories
            .iter()
            .map(|repo| (format!("repo_{}", repo.name), render_repo(repo))),
    );
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> GithubRepo {
        GithubRepo {
            name: name.to_string(),
            description: None,
            language: Some("Rust".to_string()),
            stargazers_count: 12,
            forks_count: 3,
            topics: vec![],
            fork: false,
            languages: BTreeMap::new(),
            readme: None,
        }
    }

    #[test]
    fn test_repo_json_parses_with_defaults() {
        let repos: Vec<GithubRepo> = serde_json::from_str(
            r#"[{"name": "prag", "description": null, "language": "Rust", "fork": true},
                {"name": "notes", "description": "misc", "language": null, "stargazers_count": 4}]"#,
        )
        .unwrap();
        assert!(repos[0].fork);
        assert_eq!(repos[1].stargazers_count, 4);
        assert!(repos[1].topics.is_empty());
    }

    #[test]
    fn test_language_breakdown_percentages() {
        let mut langs = BTreeMap::new();
        langs.insert("Shell".to_string(), 250);
        langs.insert("Rust".to_string(), 750);
        assert_eq!(
            language_breakdown(&langs).unwrap(),
            "Rust 75.0%, Shell 25.0%"
        );
        assert!(language_breakdown(&BTreeMap::new()).is_none());
    }

    #[test]
    fn test_render_repo_includes_optional_sections() {
        let mut r = repo("prag");
        r.topics = vec!["rag".to_string(), "cli".to_string()];
        r.languages.insert("Rust".to_string(), 10);
        r.readme = Some("# prag".to_string());
        let text = render_repo(&r);
        assert!(text.starts_with("Repository: prag\nDescription: No description"));
        assert!(text.contains("Topics: rag, cli"));
        assert!(text.contains("Language Breakdown: Rust 100.0%"));
        assert!(text.ends_with("README Content: # prag"));
    }

    #[test]
    fn test_profile_documents_paths() {
        let profile = GithubProfile {
            login: "octo".to_string(),
            name: Some("Octo Cat".to_string()),
            bio: None,
            location: None,
            company: None,
            blog: Some(String::new()),
            public_repos: 2,
            followers: 1,
            following: 0,
            repositories: vec![repo("a"), repo("b")],
        };
        let docs = profile_documents(&profile);
        let paths: Vec<&str> = docs.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["profile_octo", "repo_a", "repo_b"]);
        assert!(docs[0].1.contains("Name: Octo Cat"));
        assert!(docs[0].1.contains("Blog: Not specified"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
