//! Rate-limit-aware batch translation with per-item retries and fallback.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TranslateConfig;
use crate::quality::{tag_untranslated, HeuristicQualityGuard, QualityCheck, Verdict};
use crate::retry::ErrorClass;
use crate::translator::TranslateBackend;
use crate::types::{GatewayError, Result};

/// Translates batches of texts without ever failing the batch.
///
/// Texts are split into fixed-size groups; items within a group run
/// concurrently while groups run one after another with a pause between
/// them, which keeps the request rate below upstream limits. An item that
/// cannot be translated (retries exhausted, or output rejected by the
/// quality guard) falls back to its original text with a marker, so the
/// output always has one entry per input, in input order.
pub struct BatchTranslator {
    backend: Arc<dyn TranslateBackend>,
    guard: Arc<dyn QualityCheck>,
    config: TranslateConfig,
}

impl BatchTranslator {
    pub fn new(backend: Arc<dyn TranslateBackend>, config: TranslateConfig) -> Self {
        Self {
            backend,
            guard: Arc::new(HeuristicQualityGuard::new()),
            config,
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn QualityCheck>) -> Self {
        self.guard = guard;
        self
    }

    /// Translate every text, preserving count and order.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        from_lang: &str,
        to_lang: &str,
    ) -> Vec<String> {
        if texts.is_empty() {
            return Vec::new();
        }
        debug!(
            "Translating batch of {} texts {} -> {} via {}",
            texts.len(),
            from_lang,
            to_lang,
            self.backend.name()
        );

        let group_size = self.config.group_size.max(1);
        let mut translated = Vec::with_capacity(texts.len());
        for (group_idx, group) in texts.chunks(group_size).enumerate() {
            if group_idx > 0 && self.config.group_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.group_delay_ms)).await;
            }
            let group_futures = group
                .iter()
                .map(|text| self.translate_one(text, from_lang, to_lang));
            translated.extend(join_all(group_futures).await);
        }
        translated
    }

    async fn translate_one(&self, text: &str, from_lang: &str, to_lang: &str) -> String {
        // Blank inputs pass through untouched and never reach the backend.
        if text.trim().is_empty() {
            return text.to_string();
        }

        match self.attempt_with_retry(text, from_lang, to_lang).await {
            Ok(candidate) => match self.guard.assess(text, &candidate, from_lang, to_lang) {
                Verdict::Accept => candidate,
                Verdict::AcceptUntranslated => {
                    debug!(
                        "Translation returned input unchanged, tagging: {}",
                        preview(text)
                    );
                    tag_untranslated(text)
                }
                Verdict::Reject(reason) => {
                    warn!(
                        "Rejected translation output ({:?}), keeping original: {}",
                        reason,
                        preview(text)
                    );
                    tag_untranslated(text)
                }
            },
            Err(e) => {
                warn!(
                    "Translation failed after retries ({}), keeping original: {}",
                    e,
                    preview(text)
                );
                tag_untranslated(text)
            }
        }
    }

    /// One item against the backend, retrying per the configured policy.
    ///
    /// A quality rejection is not retried: the same input would produce the
    /// same bad output, so only transport-level errors come back here.
    async fn attempt_with_retry(
        &self,
        text: &str,
        from_lang: &str,
        to_lang: &str,
    ) -> Result<String> {
        let policy = &self.config.retry;
        let mut schedule: Option<ExponentialBackoff> = None;
        let mut schedule_class = ErrorClass::Transient;
        let mut last_error = None;

        for attempt in 0..=policy.max_attempts {
            match self.backend.translate(text, from_lang, to_lang).await {
                Ok(candidate) => {
                    if attempt > 0 {
                        debug!("Translation succeeded after {} retries", attempt);
                    }
                    return Ok(candidate);
                }
                Err(e) => {
                    if attempt < policy.max_attempts {
                        let class = ErrorClass::classify(&e);
                        // A rate-limit rejection switches to the longer
                        // schedule; it never switches back.
                        if schedule.is_none()
                            || (class == ErrorClass::RateLimited
                                && schedule_class == ErrorClass::Transient)
                        {
                            schedule = Some(policy.backoff_for(class, e.retry_after()));
                            schedule_class = class;
                        }
                        if let Some(delay) = schedule.as_mut().and_then(|b| b.next_backoff()) {
                            debug!(
                                "Translation attempt {}/{} failed: {}; retrying in {:?}",
                                attempt + 1,
                                policy.max_attempts + 1,
                                e,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::Translation("no translation attempts made".to_string())))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(48).collect()
}
