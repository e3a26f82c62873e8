//! Commit-category classifier collaborator.
//!
//! The classifier itself is an external service: it receives a commit message
//! plus diff text and answers with a label (`feat`, `fix`, `docs`, ...).

use crate::config::ClassifierConfig;
use crate::error::{MinerError, MinerResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Diff text beyond this many bytes is not sent to the classifier.
pub const MAX_DIFF_BYTES: usize = 16 * 1024;

#[async_trait]
pub trait CategoryClassifier: Send + Sync {
    /// Checked once per run; `false` makes every row `not_classified`.
    async fn is_available(&self) -> bool;

    async fn classify(&self, message: &str, diff: &str) -> MinerResult<String>;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    message: &'a str,
    diff: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    label: String,
}

/// Classifier reached over HTTP: `POST {message, diff}` → `{label}`.
pub struct HttpCategoryClassifier {
    http: Client,
    endpoint: Url,
}

impl HttpCategoryClassifier {
    pub fn new(config: &ClassifierConfig) -> MinerResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            MinerError::config(format!("invalid classifier endpoint {}: {}", config.endpoint, e))
        })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl CategoryClassifier for HttpCategoryClassifier {
    async fn is_available(&self) -> bool {
        // Any HTTP answer means the service is up; only transport errors count.
        match self.http.get(self.endpoint.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Category classifier at {} unreachable: {}", self.endpoint, e);
                false
            }
        }
    }

    async fn classify(&self, message: &str, diff: &str) -> MinerResult<String> {
        let request = ClassifyRequest {
            message,
            diff: truncate_diff(diff),
        };
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| MinerError::Classifier(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MinerError::Classifier(format!("{}: {}", status, body)));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| MinerError::Classifier(format!("bad classifier response: {}", e)))?;
        let label = parsed.label.trim().to_lowercase();
        if label.is_empty() {
            return Err(MinerError::Classifier("empty label".to_string()));
        }
        Ok(label)
    }
}

/// Longest prefix of `diff` within [`MAX_DIFF_BYTES`] ending on a char boundary.
pub fn truncate_diff(diff: &str) -> &str {
    if diff.len() <= MAX_DIFF_BYTES {
        return diff;
    }
    let mut end = MAX_DIFF_BYTES;
    while !diff.is_char_boundary(end) {
        end -= 1;
    }
    &diff[..end]
}
