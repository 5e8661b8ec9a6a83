// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded exponential-backoff retry for remote calls.

use std::{
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use backon::{ExponentialBuilder, Retryable};

use crate::{errors::PipelineError, scanner::BlockRange};

/// JSON-RPC error code some providers use for "limit exceeded".
const RPC_LIMIT_EXCEEDED: i64 = -32005;

/// Upper bound for a single backoff step.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How a failed remote call should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network hiccup or provider error; retried on the exponential schedule.
    Transient,
    /// Provider asked us to slow down; retried with the rate-limit floor applied.
    RateLimited,
    /// Provider rejected the block range. The range is already at the advertised maximum, so
    /// the same range is retried.
    RangeTooLarge { suggested: Option<BlockRange> },
    /// Configuration problem; never retried.
    Fatal,
}

/// Retry settings for remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent retry.
    pub base_delay: Duration,
    /// Minimum delay after a rate-limit response.
    pub rate_limit_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            rate_limit_floor: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// The exponential schedule: `base_delay`, doubled after every retry.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(MAX_RETRY_DELAY)
            .with_max_times(self.max_retries as usize)
    }

    /// Scheduled delay raised to the rate-limit floor where the error calls for it.
    pub fn adjust_delay(&self, class: &ErrorClass, scheduled: Duration) -> Duration {
        match class {
            ErrorClass::RateLimited => scheduled.max(self.rate_limit_floor),
            _ => scheduled,
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or exhausts the retry budget.
    ///
    /// The last error is returned with `label` attached as context.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let attempt = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            operation()
        };

        let result = attempt
            .retry(self.backoff())
            .when(|err: &anyhow::Error| classify(err) != ErrorClass::Fatal)
            .adjust(|err: &anyhow::Error, scheduled: Option<Duration>| {
                scheduled.map(|delay| self.adjust_delay(&classify(err), delay))
            })
            .notify(|err: &anyhow::Error, delay: Duration| match classify(err) {
                ErrorClass::RateLimited => {
                    tracing::warn!("{} rate limited, retrying in {:?}", label, delay);
                }
                ErrorClass::RangeTooLarge { suggested } => {
                    tracing::warn!(
                        "{} rejected block range (provider suggests {:?}), retrying in {:?}",
                        label,
                        suggested,
                        delay
                    );
                }
                _ => {
                    tracing::debug!(
                        "{} failed (attempt {}/{}): {:#}, retrying in {:?}",
                        label,
                        attempts.load(Ordering::Relaxed),
                        self.max_retries + 1,
                        err,
                        delay
                    );
                }
            })
            .await;

        result.map_err(|err| {
            if classify(&err) == ErrorClass::Fatal {
                return err;
            }
            let attempts = attempts.load(Ordering::Relaxed);
            tracing::warn!("{} failed after {} attempts: {:#}", label, attempts, err);
            err.context(format!("{label} failed after {attempts} attempts"))
        })
    }
}

/// Classify an error by walking its cause chain.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    for cause in err.chain() {
        if let Some(pipeline_err) = cause.downcast_ref::<PipelineError>() {
            if pipeline_err.is_fatal() {
                return ErrorClass::Fatal;
            }
        }
        if let Some(transport_err) = cause.downcast_ref::<TransportError>() {
            match transport_err {
                RpcError::Transport(TransportErrorKind::HttpError(http)) if http.status == 429 => {
                    return ErrorClass::RateLimited;
                }
                RpcError::ErrorResp(payload)
                    if payload.code == 429 || payload.code == RPC_LIMIT_EXCEEDED =>
                {
                    if is_range_message(&payload.message) {
                        return ErrorClass::RangeTooLarge {
                            suggested: suggested_range(&payload.message),
                        };
                    }
                    return ErrorClass::RateLimited;
                }
                _ => {}
            }
        }
        if let Some(http_err) = cause.downcast_ref::<reqwest::Error>() {
            if http_err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
                return ErrorClass::RateLimited;
            }
        }
    }

    let message = format!("{err:#}");
    if is_range_message(&message) {
        return ErrorClass::RangeTooLarge { suggested: suggested_range(&message) };
    }
    let lower = message.to_lowercase();
    if mentions_status_429(&lower)
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        return ErrorClass::RateLimited;
    }
    ErrorClass::Transient
}

/// A `429` that reads as a status code (`HTTP 429`, `status: 429`, `429 Too Many ..`), not
/// as digits inside a block number or hash.
fn mentions_status_429(lower: &str) -> bool {
    let words: Vec<&str> =
        lower.split(|c: char| !c.is_ascii_alphanumeric()).filter(|word| !word.is_empty()).collect();
    words.iter().enumerate().any(|(idx, word)| {
        let after_status = idx > 0 && matches!(words[idx - 1], "http" | "status" | "code");
        *word == "429" && (after_status || words.get(idx + 1) == Some(&"too"))
    })
}

fn is_range_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("block range")
        || lower.contains("range is too large")
        || lower.contains("log response size exceeded")
        || lower.contains("query returned more than")
}

/// Extract a `[0x.., 0x..]` block range hint from a provider error message.
pub fn suggested_range(message: &str) -> Option<BlockRange> {
    let mut rest = message;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let close = after.find(']')?;
        let mut parts = after[..close].split(',').map(str::trim);
        if let (Some(from), Some(to), None) = (parts.next(), parts.next(), parts.next()) {
            if let (Some(from), Some(to)) = (parse_block(from), parse_block(to)) {
                return Some(BlockRange { from, to });
            }
        }
        rest = &after[close + 1..];
    }
    None
}

fn parse_block(value: &str) -> Option<u64> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use anyhow::anyhow;
    use backon::BackoffBuilder;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let schedule: Vec<Duration> = policy.backoff().build().collect();
        assert_eq!(
            schedule,
            vec![Duration::from_millis(1000), Duration::from_millis(2000), Duration::from_millis(4000)]
        );

        let first = Duration::from_millis(1000);
        assert_eq!(policy.adjust_delay(&ErrorClass::Transient, first), first);
        assert_eq!(policy.adjust_delay(&ErrorClass::RateLimited, first), Duration::from_millis(5000));
        assert_eq!(
            policy.adjust_delay(&ErrorClass::RateLimited, Duration::from_millis(8000)),
            Duration::from_millis(8000)
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&anyhow!("connection reset")), ErrorClass::Transient);
        assert_eq!(classify(&anyhow!("HTTP 429 Too Many Requests")), ErrorClass::RateLimited);
        assert_eq!(classify(&anyhow!("server returned status: 429")), ErrorClass::RateLimited);
        assert_eq!(
            classify(&anyhow::Error::new(PipelineError::MissingCredential).context("lookup")),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(&anyhow!(
                "Log response size exceeded. this block range should work: [0x3e8, 0x5db]"
            )),
            ErrorClass::RangeTooLarge { suggested: Some(BlockRange { from: 1000, to: 1499 }) }
        );
    }

    #[test]
    fn test_classify_ignores_429_inside_numbers() {
        let err = anyhow!("connection reset while fetching [14290000, 14290499]");
        assert_eq!(classify(&err), ErrorClass::Transient);
        assert_eq!(
            classify(&anyhow!("receipt 0x4290ab missing at block 1429")),
            ErrorClass::Transient
        );
        assert!(!mentions_status_429("fetching https://rpc.example/v1/429abc"));
    }

    #[test]
    fn test_suggested_range() {
        assert_eq!(suggested_range("no hint here"), None);
        assert_eq!(suggested_range("ids [a] then [10, 20]"), Some(BlockRange { from: 10, to: 20 }));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_execute_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .execute("eth_getLogs", || {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(anyhow!("429 rate limit")),
                        1 => Err(anyhow!("connection reset")),
                        _ => Ok(7u64),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5s rate-limit floor, then 2s for the second attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
        assert!(logs_contain("rate limited"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_execute_transient_error_uses_exponential_schedule() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        RetryPolicy::default()
            .execute("eth_getLogs", || {
                let calls = calls.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(anyhow!("connection reset while fetching [14290000, 14290499]")),
                        _ => Ok(()),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert!(!logs_contain("rate limited"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_execute_retries_rejected_range_as_is() {
        let requested = Arc::new(std::sync::Mutex::new(Vec::new()));
        let range = BlockRange { from: 1000, to: 1999 };

        let result = RetryPolicy::default()
            .execute("eth_getLogs", || {
                let requested = requested.clone();
                async move {
                    let mut seen = requested.lock().unwrap();
                    seen.push(range);
                    if seen.len() == 1 {
                        return Err(anyhow!(
                            "Log response size exceeded. this block range should work: [0x3e8, 0x5db]"
                        ));
                    }
                    Ok(seen.len())
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(*requested.lock().unwrap(), vec![range, range]);
        assert!(logs_contain("eth_getLogs rejected block range"));
        assert!(logs_contain("BlockRange { from: 1000, to: 1499 }"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_exhausts_and_propagates() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = RetryPolicy::default()
            .execute("eth_blockNumber", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow!("upstream unavailable"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(format!("{err:#}").contains("upstream unavailable"));
        assert!(err.to_string().contains("eth_blockNumber failed after 4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_does_not_retry_fatal() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = RetryPolicy::default()
            .execute("identity lookup", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PipelineError::MissingCredential.into())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingCredential)
        ));
    }
}
