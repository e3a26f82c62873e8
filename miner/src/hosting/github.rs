//! GitHub REST implementation of [`HostingApi`].

use super::{
    ChangedFile, FileStatus, HostingApi, RepositoryInfo, RepositoryRef, RevisionDetail,
    RevisionQuery, RevisionSummary,
};
use crate::config::GitHubConfig;
use crate::error::{MinerError, MinerResult};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";

#[derive(Debug, Deserialize)]
struct RepoEntry {
    full_name: String,
    #[serde(default)]
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    author: Option<GitIdentity>,
    committer: Option<GitIdentity>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitIdentity {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CommitDetailEntry {
    commit: CommitBody,
    #[serde(default)]
    files: Vec<FileEntry>,
    stats: Option<StatsEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    filename: String,
    status: String,
    additions: Option<u64>,
    deletions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatsEntry {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    content: Option<String>,
    encoding: Option<String>,
}

impl CommitEntry {
    fn into_summary(self) -> MinerResult<RevisionSummary> {
        let author = self.commit.author.as_ref();
        let date = author
            .and_then(|a| a.date)
            .or_else(|| self.commit.committer.as_ref().and_then(|c| c.date))
            .ok_or_else(|| MinerError::decode(format!("commit {} has no date", self.sha)))?;

        Ok(RevisionSummary {
            author: author
                .and_then(|a| a.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            committer: self.commit.committer.and_then(|c| c.name),
            date,
            message: self.commit.message,
            id: self.sha,
        })
    }
}

/// Client for the GitHub REST API.
pub struct GitHubClient {
    http: Client,
    base: Url,
    per_page: u32,
}

impl GitHubClient {
    /// Build a client, reading the token from the configured environment
    /// variable. A missing token falls back to unauthenticated access.
    pub fn new(config: &GitHubConfig) -> MinerResult<Self> {
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                "{} is not set, using unauthenticated GitHub access",
                config.token_env
            );
        }
        Self::with_token(config, token.as_deref())
    }

    pub fn with_token(config: &GitHubConfig, token: Option<&str>) -> MinerResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| MinerError::config(format!("invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("provenance-miner/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let base = Url::parse(&config.api_url)
            .map_err(|e| MinerError::config(format!("invalid api_url {}: {}", config.api_url, e)))?;

        Ok(Self {
            http,
            base,
            per_page: config.per_page.clamp(1, 100),
        })
    }

    fn endpoint<'a>(
        &self,
        repo: &RepositoryRef,
        tail: impl IntoIterator<Item = &'a str>,
    ) -> MinerResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| MinerError::config(format!("api_url cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> MinerResult<T> {
        let response = self.http.get(url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn resolve_repository(&self, repo: &RepositoryRef) -> MinerResult<RepositoryInfo> {
        let url = self.endpoint(repo, std::iter::empty())?;
        let entry: RepoEntry = self.get_json(url).await?;
        Ok(RepositoryInfo {
            full_name: entry.full_name,
            default_branch: entry.default_branch,
        })
    }

    async fn list_revisions(
        &self,
        repo: &RepositoryRef,
        query: &RevisionQuery,
    ) -> MinerResult<Vec<RevisionSummary>> {
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut revisions = Vec::new();
        let mut page = 1u32;

        while revisions.len() < limit {
            let mut url = self.endpoint(repo, ["commits"])?;
            {
                let mut qp = url.query_pairs_mut();
                qp.append_pair("per_page", &self.per_page.to_string());
                qp.append_pair("page", &page.to_string());
                if let Some(since) = query.since {
                    qp.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
                }
                if let Some(until) = query.until {
                    qp.append_pair("until", &until.to_rfc3339_opts(SecondsFormat::Secs, true));
                }
                if let Some(path) = &query.path {
                    qp.append_pair("path", path);
                }
            }

            let entries: Vec<CommitEntry> = self.get_json(url).await?;
            let last_page = entries.len() < self.per_page as usize;
            for entry in entries {
                if revisions.len() >= limit {
                    break;
                }
                revisions.push(entry.into_summary()?);
            }
            if last_page {
                break;
            }
            page += 1;
        }

        tracing::debug!("{}: listed {} revisions", repo, revisions.len());
        Ok(revisions)
    }

    async fn changed_files(
        &self,
        repo: &RepositoryRef,
        revision: &str,
    ) -> MinerResult<Vec<ChangedFile>> {
        let url = self.endpoint(repo, ["commits", revision])?;
        let detail: CommitDetailEntry = self.get_json(url).await?;
        Ok(detail
            .files
            .into_iter()
            .map(|f| ChangedFile {
                status: FileStatus::from_api(&f.status),
                path: f.filename,
                additions: f.additions,
                deletions: f.deletions,
            })
            .collect())
    }

    async fn file_content(
        &self,
        repo: &RepositoryRef,
        path: &str,
        revision: &str,
    ) -> MinerResult<String> {
        let mut url = self.endpoint(repo, std::iter::once("contents").chain(path.split('/')))?;
        url.query_pairs_mut().append_pair("ref", revision);

        let entry: ContentEntry = self.get_json(url).await?;
        decode_content(entry)
    }

    async fn revision_detail(
        &self,
        repo: &RepositoryRef,
        revision: &str,
    ) -> MinerResult<RevisionDetail> {
        let url = self.endpoint(repo, ["commits", revision])?;
        let detail: CommitDetailEntry = self.get_json(url.clone()).await?;

        let response = self
            .http
            .get(url)
            .header(ACCEPT, DIFF_MEDIA_TYPE)
            .send()
            .await?;
        let diff = check_status(response).await?.text().await?;

        let changed_lines = detail
            .stats
            .map(|s| s.additions + s.deletions)
            .unwrap_or(0);

        Ok(RevisionDetail {
            message: detail.commit.message,
            diff,
            changed_lines,
        })
    }
}

/// Map a non-success response onto the error taxonomy.
async fn check_status(response: Response) -> MinerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let wait = rate_limit_wait(response.headers(), Utc::now());
    let body = response.text().await.unwrap_or_default();

    Err(match (status.as_u16(), wait) {
        (401, _) => MinerError::Unauthorized(body),
        (404, _) => MinerError::NotFound(url),
        (403 | 429, Some(retry_after)) => MinerError::RateLimited { retry_after },
        (code, _) => MinerError::HttpStatus {
            status: code,
            url,
            body,
        },
    })
}

/// How long to back off when the response signals an exhausted rate limit.
fn rate_limit_wait(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header(RETRY_AFTER.as_str()).and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    if header("x-ratelimit-remaining") != Some("0") {
        return None;
    }
    let reset = header("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let secs = (reset - now.timestamp()).max(1) as u64;
    Some(Duration::from_secs(secs))
}

fn decode_content(entry: ContentEntry) -> MinerResult<String> {
    let content = entry.content.unwrap_or_default();
    match entry.encoding.as_deref() {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| MinerError::decode(format!("bad base64 content: {}", e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Some("none") | Some("") | None => Ok(content),
        Some(other) => Err(MinerError::decode(format!("unsupported encoding {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client() -> GitHubClient {
        GitHubClient::with_token(&GitHubConfig::default(), Some("t0ken")).unwrap()
    }

    #[test]
    fn test_endpoint_escapes_path_segments() {
        let repo = RepositoryRef::new("octo", "repo");
        let url = client()
            .endpoint(&repo, std::iter::once("contents").chain("src/a b.py".split('/')))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/repo/contents/src/a%20b.py"
        );
    }

    #[test]
    fn test_rate_limit_from_reset_header() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&(now.timestamp() + 90).to_string()).unwrap(),
        );
        assert_eq!(rate_limit_wait(&headers, now), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_retry_after_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("17"));
        assert_eq!(
            rate_limit_wait(&headers, Utc::now()),
            Some(Duration::from_secs(17))
        );
    }

    #[test]
    fn test_forbidden_with_remaining_quota_is_not_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
        assert_eq!(rate_limit_wait(&headers, Utc::now()), None);
    }

    #[test]
    fn test_decode_base64_content_with_newlines() {
        let entry = ContentEntry {
            content: Some("cHJpbnQo\nMSkK\n".to_string()),
            encoding: Some("base64".to_string()),
        };
        assert_eq!(decode_content(entry).unwrap(), "print(1)\n");
    }

    #[test]
    fn test_commit_entry_defaults_unknown_author() {
        let entry: CommitEntry = serde_json::from_str(
            r#"{"sha":"abc","commit":{"author":{"name":null,"date":"2025-02-01T10:00:00Z"},
                "committer":{"name":"GitHub","date":"2025-02-01T10:00:01Z"},"message":"init"}}"#,
        )
        .unwrap();
        let summary = entry.into_summary().unwrap();
        assert_eq!(summary.author, "Unknown");
        assert_eq!(summary.committer.as_deref(), Some("GitHub"));
        assert_eq!(summary.actors().joined(), "Unknown, GitHub");
    }
}
