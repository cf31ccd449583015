//! Bounded retry with exponential backoff

use ccm_core::{HttpRequest, HttpTransport, RetryConfig, TransportError};

/// Final outcome of a retried request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Whether the last attempt returned 2xx
    pub success: bool,
    /// Status of the last attempt that produced a response
    pub status_code: Option<u16>,
    /// Error text of the last failure
    pub error: Option<String>,
    /// Retries performed after the first attempt
    pub retry_count: u32,
}

/// POST with up to `max_retries + 1` attempts
///
/// 2xx succeeds. 5xx, timeouts and network errors
/// wait `min(base * 2^attempt, max)` and try again. Each attempt is
/// cancelled after the configured per-attempt timeout. Any other status
/// fails immediately.
pub async fn fetch_with_retry(
    transport: &dyn HttpTransport,
    request: &HttpRequest,
    retry: &RetryConfig,
) -> FetchOutcome {
    let timeout = retry.timeout();
    let mut last = FetchOutcome {
        success: false,
        status_code: None,
        error: None,
        retry_count: 0,
    };

    for attempt in 0..=retry.max_retries {
        if attempt > 0 {
            let delay = retry.delay_for_attempt(attempt - 1);
            tracing::debug!(
                url = %request.url,
                attempt,
                max_retries = retry.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
        last.retry_count = attempt;

        let response = match tokio::time::timeout(timeout, transport.post(request, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: retry.timeout_ms,
            }),
        };

        match response {
            Ok(resp) if resp.is_success() => {
                return FetchOutcome {
                    success: true,
                    status_code: Some(resp.status),
                    error: None,
                    retry_count: attempt,
                };
            }
            Ok(resp) if resp.is_server_error() => {
                last.status_code = Some(resp.status);
                last.error = Some(format!("HTTP {}", resp.status));
            }
            Ok(resp) => {
                let class = if resp.is_client_error() { "client error" } else { "unexpected status" };
                return FetchOutcome {
                    success: false,
                    status_code: Some(resp.status),
                    error: Some(format!("HTTP {}: {class}, not retried", resp.status)),
                    retry_count: attempt,
                };
            }
            Err(e) if !e.is_retryable() => {
                return FetchOutcome {
                    success: false,
                    status_code: None,
                    error: Some(e.to_string()),
                    retry_count: attempt,
                };
            }
            Err(e) => {
                last.status_code = None;
                last.error = Some(e.to_string());
            }
        }
    }

    tracing::warn!(
        url = %request.url,
        retries = last.retry_count,
        error = last.error.as_deref().unwrap_or_default(),
        "all retries exhausted"
    );
    last
}
