// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Vendor HTTP transport shared by the adapters
//
// JSON POST with a bounded timeout, transient-failure retry on the
// RetryPolicy schedule and a uniform diagnostic for vendor errors.

use base64::Engine;
use reqwest::StatusCode;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::llm::{LLMError, RetryPolicy};

/// Request timeout for hosted vendors
pub const HOSTED_TIMEOUT: Duration = Duration::from_secs(120);
/// Request timeout for locally hosted models
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest vendor body excerpt kept in a diagnostic
pub const BODY_PREVIEW_CHARS: usize = 2000;

const REQUEST_ID_HEADERS: [&str; 2] = ["x-request-id", "request-id"];

pub struct VendorHttp {
    client: reqwest::Client,
    retry: RetryPolicy,
}

/// One failed attempt, before retry classification
struct AttemptFailure {
    transient: bool,
    status: Option<u16>,
    diagnostic: String,
    request_id: Option<String>,
}

impl From<AttemptFailure> for LLMError {
    fn from(failure: AttemptFailure) -> Self {
        LLMError::FatalVendor {
            status: failure.status,
            diagnostic: failure.diagnostic,
            request_id: failure.request_id,
        }
    }
}

impl VendorHttp {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client without timeout: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn hosted() -> Self {
        Self::new(HOSTED_TIMEOUT)
    }

    pub fn local() -> Self {
        Self::new(LOCAL_TIMEOUT)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// POST `body` and return the decoded JSON reply.
    ///
    /// Timeouts, connection failures, 429 and 5xx are retried up to the
    /// policy's attempt cap; exhaustion and every other status surface as
    /// `LLMError::FatalVendor`.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, LLMError> {
        let mut attempt = 0;
        loop {
            let failure = match self.send_once(url, headers, body).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            attempt += 1;
            if !failure.transient {
                return Err(failure.into());
            }
            if attempt >= self.retry.max_attempts {
                warn!(url, attempts = attempt, "Transient vendor failures exhausted retries");
                return Err(AttemptFailure {
                    diagnostic: format!(
                        "{} (gave up after {} attempts)",
                        failure.diagnostic, attempt
                    ),
                    ..failure
                }
                .into());
            }

            let delay = self.retry.delay_after(attempt - 1);
            let transient = LLMError::TransientNetwork(failure.diagnostic);
            warn!(
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %transient,
                "Retrying vendor request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, AttemptFailure> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| AttemptFailure {
            transient: e.is_timeout() || e.is_connect(),
            status: None,
            diagnostic: format!("POST {} failed: {}", url, e),
            request_id: None,
        })?;

        let status = response.status();
        let request_id = REQUEST_ID_HEADERS.iter().find_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });
        let text = response.text().await.map_err(|e| AttemptFailure {
            transient: e.is_timeout(),
            status: Some(status.as_u16()),
            diagnostic: format!("POST {} failed while reading body: {}", url, e),
            request_id: request_id.clone(),
        })?;

        if !status.is_success() {
            return Err(AttemptFailure {
                transient: is_transient_status(status),
                status: Some(status.as_u16()),
                diagnostic: format_diagnostic(status, "POST", url, &text, request_id.as_deref()),
                request_id,
            });
        }

        debug!(url, status = status.as_u16(), bytes = text.len(), "Vendor response received");
        serde_json::from_str(&text).map_err(|e| AttemptFailure {
            transient: false,
            status: Some(status.as_u16()),
            diagnostic: format!(
                "Invalid JSON from POST {}: {} (body: {})",
                url,
                e,
                truncate_chars(&text, BODY_PREVIEW_CHARS)
            ),
            request_id,
        })
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `HTTP 400 Bad Request | POST <url> | request-id: <id> | body: <preview>`
pub fn format_diagnostic(
    status: StatusCode,
    method: &str,
    url: &str,
    body: &str,
    request_id: Option<&str>,
) -> String {
    let mut diagnostic = format!("HTTP {} | {} {}", status, method, url);
    if let Some(id) = request_id {
        diagnostic.push_str(&format!(" | request-id: {}", id));
    }
    diagnostic.push_str(" | body: ");
    diagnostic.push_str(&truncate_chars(body, BODY_PREVIEW_CHARS));
    diagnostic
}

/// First `max_chars` characters, with a marker when something was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

/// Read a file for inlining as a base64 part
pub async fn read_base64(path: &Path) -> Result<String, LLMError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LLMError::Document(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// File name recorded as `file_analyzed` metadata
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Error for a hosted adapter constructed without a key
pub fn missing_key(vendor: &str) -> LLMError {
    LLMError::FatalVendor {
        status: None,
        diagnostic: format!("No API key configured for {}", vendor),
        request_id: None,
    }
}
