use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::debug;

use super::BODY_PREVIEW_CHARS;
use crate::error::{BackendError, IsRetryable};

pub(crate) fn network_retry_policy(max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(max_times)
        .with_jitter()
}

pub(crate) async fn body_preview(resp: reqwest::Response) -> String {
    match resp.bytes().await {
        Ok(bytes) => {
            let raw_body = String::from_utf8_lossy(&bytes);
            format!("{:.len$}", raw_body, len = BODY_PREVIEW_CHARS)
        }
        Err(e) => format!("<failed to read body: {e}>"),
    }
}

/// Sends the request built by `build`, retrying connect errors, timeouts and 5xx responses.
///
/// Non-5xx responses are returned as-is; callers decide what a 4xx means.
pub(crate) async fn send_with_retry<F>(
    op: &'static str,
    policy: ExponentialBuilder,
    build: F,
) -> Result<reqwest::Response, BackendError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let build = &build;
    (|| async move {
        let resp = build().send().await?;
        let status = resp.status();

        if status.is_server_error() {
            let body = body_preview(resp).await;
            debug!(op, %status, body = %body, "[{op}] Backend server error (will retry)");
            return Err(BackendError::Status { status, body });
        }

        Ok(resp)
    })
    .retry(policy)
    .when(|e: &BackendError| e.is_retryable())
    .notify(|err: &BackendError, dur: Duration| {
        debug!(op, error = %err, delay_ms = dur.as_millis() as u64, "[{op}] retrying");
    })
    .await
}

/// Turns a non-success response into [`BackendError::Status`].
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = body_preview(resp).await;
    Err(BackendError::Status { status, body })
}
