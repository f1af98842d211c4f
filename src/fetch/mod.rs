//! Transport against the PxWeb API: one shared client, candidate base URLs,
//! per-call timeouts, and retry restricted to HTTP 429.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::meta::TableMeta;

/// Client-identification header sent on every request.
pub const CLIENT_IDENT: &str = "pxscraper/0.1 (statistical dataset pipeline)";

pub const META_TIMEOUT: Duration = Duration::from_secs(30);
pub const CUBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed-step retry: attempt n sleeps `step * n` before the next try.
/// Only HTTP 429 is retried; anything else fails immediately because a retry
/// cannot repair a schema or server error.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

pub const DEFAULT_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    step: Duration::from_millis(500),
};

/// Discriminated request result. Ordinary HTTP failure is a value, not an
/// `Err`, so callers decide retry policy.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    Success(String),
    Http { status: u16, body: String },
    Failed(String),
}

pub struct PxClient {
    http: Client,
    bases: Vec<String>,
    retry: RetryPolicy,
    /// Base chosen on first contact; no cross-base fallback mid-retry.
    resolved_base: Mutex<Option<String>>,
}

impl PxClient {
    pub fn new(bases: Vec<String>) -> PipelineResult<Self> {
        Self::with_retry(bases, DEFAULT_RETRY)
    }

    pub fn with_retry(bases: Vec<String>, retry: RetryPolicy) -> PipelineResult<Self> {
        if bases.is_empty() {
            return Err(PipelineError::structural("no API base URLs configured"));
        }
        for base in &bases {
            url::Url::parse(base)
                .map_err(|e| PipelineError::structural(format!("bad API base '{base}': {e}")))?;
        }
        let http = Client::builder()
            .user_agent(CLIENT_IDENT)
            .build()
            .map_err(|e| PipelineError::structural(format!("building http client: {e}")))?;
        Ok(PxClient {
            http,
            bases,
            retry,
            resolved_base: Mutex::new(None),
        })
    }

    /// GET table metadata for the given path parts.
    pub async fn fetch_meta(&self, path_parts: &[String]) -> PipelineResult<TableMeta> {
        let body = self
            .call_with_retry(path_parts, None, META_TIMEOUT, "metadata")
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| PipelineError::structural(format!("unparseable table metadata: {e}")))
    }

    /// POST a selection query and return the raw cube payload.
    pub async fn fetch_cube(&self, path_parts: &[String], query: &Value) -> PipelineResult<Value> {
        let body = self
            .call_with_retry(path_parts, Some(query), CUBE_TIMEOUT, "cube")
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| PipelineError::structural(format!("unparseable cube response: {e}")))
    }

    /// Issue one request and fold every failure mode into `RequestOutcome`.
    pub async fn request(
        &self,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> RequestOutcome {
        let builder = match body {
            Some(json) => self.http.post(url).json(json),
            None => self.http.get(url),
        };
        let resp = match builder.timeout(timeout).send().await {
            Ok(r) => r,
            Err(e) => return RequestOutcome::Failed(format!("request to {url} failed: {e}")),
        };
        let status = resp.status().as_u16();
        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => return RequestOutcome::Failed(format!("reading body from {url}: {e}")),
        };
        if (200..300).contains(&status) {
            RequestOutcome::Success(text)
        } else {
            RequestOutcome::Http { status, body: text }
        }
    }

    async fn call_with_retry(
        &self,
        path_parts: &[String],
        body: Option<&Value>,
        timeout: Duration,
        what: &str,
    ) -> PipelineResult<String> {
        retry_loop(self.retry, |attempt| async move {
            let base = self.pick_base();
            let url = build_url(&base, path_parts);
            debug!(%url, attempt, "{} request", what);
            let outcome = self.request(&url, body, timeout).await;
            match &outcome {
                RequestOutcome::Failed(_) if !self.base_locked() => {
                    // First contact never happened; probe the remaining
                    // candidate bases before giving up on this attempt.
                    for candidate in self.bases.iter().skip(1) {
                        let url = build_url(candidate, path_parts);
                        let probe = self.request(&url, body, timeout).await;
                        if !matches!(probe, RequestOutcome::Failed(_)) {
                            self.lock_base(candidate);
                            return probe;
                        }
                    }
                    outcome
                }
                RequestOutcome::Failed(_) => outcome,
                _ => {
                    self.lock_base(&base);
                    outcome
                }
            }
        })
        .await
    }

    /// Full URL for the given path parts against the selected base.
    pub fn source_url(&self, path_parts: &[String]) -> String {
        build_url(&self.pick_base(), path_parts)
    }

    fn pick_base(&self) -> String {
        self.resolved_base
            .lock()
            .expect("base mutex poisoned")
            .clone()
            .unwrap_or_else(|| self.bases[0].clone())
    }

    fn base_locked(&self) -> bool {
        self.resolved_base
            .lock()
            .expect("base mutex poisoned")
            .is_some()
    }

    fn lock_base(&self, base: &str) {
        let mut resolved = self.resolved_base.lock().expect("base mutex poisoned");
        if resolved.is_none() {
            resolved.replace(base.to_string());
        }
    }
}

/// Join urlencoded path parts onto a base URL.
pub fn build_url(base: &str, path_parts: &[String]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for part in path_parts {
        url.push('/');
        url.push_str(&urlencoding::encode(part));
    }
    url
}

/// Drive the attempt function under the retry policy. Retries 429 only,
/// sleeping `step * attempt` between tries; exhaustion escalates to a
/// structural error carrying the last observed status and message.
pub async fn retry_loop<F, Fut>(policy: RetryPolicy, attempt_fn: F) -> PipelineResult<String>
where
    F: Fn(u32) -> Fut,
    Fut: std::future::Future<Output = RequestOutcome>,
{
    let mut last: Option<(u16, String)> = None;
    for attempt in 1..=policy.max_attempts {
        match attempt_fn(attempt).await {
            RequestOutcome::Success(body) => return Ok(body),
            RequestOutcome::Http { status: 429, body } => {
                last = Some((429, body));
                if attempt < policy.max_attempts {
                    let delay = policy.step * attempt;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    sleep(delay).await;
                }
            }
            RequestOutcome::Http { status, body } => {
                return Err(PipelineError::http(
                    format!("http {status}: {}", truncate(&body, 200)),
                    status,
                ));
            }
            RequestOutcome::Failed(message) => {
                return Err(PipelineError::structural(message));
            }
        }
    }
    let (status, body) = last.expect("retry loop exits early unless 429 was seen");
    Err(PipelineError::http(
        format!(
            "rate limited after {} attempts: {}",
            policy.max_attempts,
            truncate(&body, 200)
        ),
        status,
    ))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FAST: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        step: Duration::from_millis(1),
    };

    #[test]
    fn builds_urls_with_encoded_parts() {
        let parts = vec!["Samgongur".to_string(), "SAM03101 fuel.px".to_string()];
        assert_eq!(
            build_url("https://px.example.is/api/v1/en/", &parts),
            "https://px.example.is/api/v1/en/Samgongur/SAM03101%20fuel.px"
        );
    }

    #[tokio::test]
    async fn three_429s_exhaust_the_budget_with_last_status() {
        let calls = AtomicU32::new(0);
        let err = retry_loop(FAST, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                RequestOutcome::Http {
                    status: 429,
                    body: "slow down".into(),
                }
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            PipelineError::Structural { status, message } => {
                assert_eq!(status, Some(429));
                assert!(message.contains("3 attempts"));
            }
            other => panic!("expected structural, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_429_fails_immediately_with_zero_retries() {
        let calls = AtomicU32::new(0);
        let err = retry_loop(FAST, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                RequestOutcome::Http {
                    status: 500,
                    body: "boom".into(),
                }
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            PipelineError::Structural { status, .. } => assert_eq!(status, Some(500)),
            other => panic!("expected structural, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_loop(FAST, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RequestOutcome::Failed("connection refused".into()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.is_skip());
    }

    #[tokio::test]
    async fn recovers_when_a_429_clears_before_the_budget() {
        let calls = AtomicU32::new(0);
        let body = retry_loop(FAST, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    RequestOutcome::Http {
                        status: 429,
                        body: String::new(),
                    }
                } else {
                    RequestOutcome::Success("{\"ok\":true}".into())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(body, "{\"ok\":true}");
    }
}
