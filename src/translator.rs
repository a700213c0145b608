use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::HttpBackendConfig;
use crate::types::{GatewayError, Result};

/// Upstream translation engine.
///
/// One call translates one text; batching, retries, and quality control
/// live in the executor, so implementations stay thin.
#[async_trait]
pub trait TranslateBackend: Send + Sync {
    async fn translate(&self, text: &str, from_lang: &str, to_lang: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Backend speaking the LibreTranslate-style HTTP protocol.
pub struct HttpTranslateBackend {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl HttpTranslateBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl TranslateBackend for HttpTranslateBackend {
    async fn translate(&self, text: &str, from_lang: &str, to_lang: &str) -> Result<String> {
        debug!(
            "Requesting translation {} -> {} ({} chars)",
            from_lang,
            to_lang,
            text.chars().count()
        );

        let request = TranslateRequest {
            q: text,
            source: from_lang,
            target: to_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Retry-After in delta-seconds; the HTTP-date form is ignored.
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = match retry_after {
                Some(hint) => format!("{} asked to retry after {}s", self.endpoint, hint.as_secs()),
                None => format!("{} throttled the request", self.endpoint),
            };
            return Err(GatewayError::RateLimited {
                message,
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(GatewayError::Translation(format!(
                "HTTP {} from {}",
                status, self.endpoint
            )));
        }

        let body: TranslateResponse = response.json().await?;
        Ok(body.translated_text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Deterministic in-process backend for tests and offline runs.
///
/// By default it wraps the input as `[lang] text`; individual inputs can be
/// scripted, and failures or rate-limit rejections injected for the first
/// N calls.
pub struct MockTranslateBackend {
    delay_ms: u64,
    responses: HashMap<String, String>,
    fail_remaining: AtomicU32,
    rate_limit_remaining: AtomicU32,
    rate_limit_hint: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTranslateBackend {
    pub fn new() -> Self {
        Self {
            delay_ms: 0,
            responses: HashMap::new(),
            fail_remaining: AtomicU32::new(0),
            rate_limit_remaining: AtomicU32::new(0),
            rate_limit_hint: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulate upstream latency on every call.
    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::new()
        }
    }

    /// Fix the output for one specific input text.
    pub fn respond_with(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.responses.insert(input.into(), output.into());
        self
    }

    /// Fail the next `n` calls with a transient error.
    pub fn fail_times(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Reject the next `n` calls as rate-limited.
    pub fn rate_limit_times(self, n: u32) -> Self {
        self.rate_limit_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Attach an upstream wait hint to injected rate-limit rejections.
    pub fn with_retry_after(mut self, hint_ms: u64) -> Self {
        self.rate_limit_hint = Some(Duration::from_millis(hint_ms));
        self
    }

    /// Total calls observed, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTranslateBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TranslateBackend for MockTranslateBackend {
    async fn translate(&self, text: &str, _from_lang: &str, to_lang: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if take_one(&self.rate_limit_remaining) {
            return Err(GatewayError::RateLimited {
                message: "mock upstream throttled".to_string(),
                retry_after: self.rate_limit_hint,
            });
        }
        if take_one(&self.fail_remaining) {
            return Err(GatewayError::Translation("mock transient failure".to_string()));
        }
        if let Some(scripted) = self.responses.get(text) {
            return Ok(scripted.clone());
        }
        Ok(format!("[{}] {}", to_lang, text))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
