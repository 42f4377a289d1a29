//! Retry policy for cache service calls
//!
//! An attempt either produces a value (from which a status can be read) or
//! fails at the transport level. Values with a non-server-error status are
//! handed back untouched, including 4xx responses, so callers can treat
//! them as definitive answers. Server errors are retried only when they are
//! gateway/availability statuses; transport failures are always retried.

use std::future::Future;
use std::time::Duration;

use cachet_core::error::CacheError;
use tracing::debug;

use crate::client::TypedResponse;
use crate::ClientResult;

/// Configuration for bounded retries with optional backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub delay: Duration,
    /// Growth factor applied to the delay after each retry; 1.0 keeps it fixed
    pub multiplier: f64,
    /// Upper bound for the delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Lookup, reserve, commit and RPC calls
    pub fn service_call() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
        }
    }

    /// A single chunk of a v1 upload
    pub fn chunk_upload() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = Duration::from_millis((current.as_millis() as f64 * self.multiplier) as u64);
        std::cmp::min(scaled, self.max_delay)
    }
}

/// Outcome class of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Hand the value back to the caller
    Done,
    /// Server error worth another attempt
    Retryable,
    /// Server error that will not improve
    Fatal,
}

pub fn is_success_status(status: Option<u16>) -> bool {
    status.is_some_and(|s| (200..300).contains(&s))
}

/// A missing status counts as a server error
pub fn is_server_error(status: Option<u16>) -> bool {
    status.map_or(true, |s| s >= 500)
}

pub fn is_retryable_status(status: Option<u16>) -> bool {
    matches!(status, Some(502..=504))
}

pub fn classify_status(status: Option<u16>) -> Classification {
    if !is_server_error(status) {
        Classification::Done
    } else if is_retryable_status(status) {
        Classification::Retryable
    } else {
        Classification::Fatal
    }
}

/// Run `attempt` until it yields a non-server-error value or the budget runs out
///
/// `status_of` reads the HTTP status from a successful attempt. When every
/// attempt fails, the returned error names the operation and embeds the
/// last status or transport message.
pub async fn retry<T, F, Fut, S>(
    name: &str,
    config: &RetryConfig,
    mut attempt: F,
    status_of: S,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
    S: Fn(&T) -> Option<u16>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.delay;
    let mut last_status = None;
    let mut message = String::new();

    for n in 1..=max_attempts {
        let retryable = match attempt().await {
            Ok(value) => {
                let status = status_of(&value);
                match classify_status(status) {
                    Classification::Done => return Ok(value),
                    class => {
                        last_status = status;
                        message = match status {
                            Some(code) => format!("Cache service responded with {code}"),
                            None => "Cache service responded without a status".to_string(),
                        };
                        class == Classification::Retryable
                    },
                }
            },
            Err(error) => {
                last_status = error.status();
                message = error.to_string();
                true
            },
        };

        debug!("{name} - Attempt {n} of {max_attempts} failed with error: {message}");

        if !retryable {
            debug!("{name} - Error is not retryable");
            break;
        }

        if n < max_attempts && !delay.is_zero() {
            tokio::time::sleep(delay).await;
            delay = config.next_delay(delay);
        }
    }

    Err(CacheError::RetriesExhausted {
        operation: name.to_string(),
        message,
        status: last_status,
    })
}

/// [`retry`] for JSON calls, reading the status from the typed response
pub async fn retry_typed<T, F, Fut>(
    name: &str,
    config: &RetryConfig,
    attempt: F,
) -> ClientResult<TypedResponse<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<TypedResponse<T>>>,
{
    retry(name, config, attempt, |response: &TypedResponse<T>| {
        Some(response.status)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays a fixed list of statuses, one per attempt
    fn scripted(statuses: &'static [u16]) -> (Arc<AtomicUsize>, impl FnMut() -> futures::future::Ready<ClientResult<u16>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(statuses[n]))
        };
        (calls, attempt)
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_status(Some(200)), Classification::Done);
        assert_eq!(classify_status(Some(204)), Classification::Done);
        assert_eq!(classify_status(Some(404)), Classification::Done);
        assert_eq!(classify_status(Some(503)), Classification::Retryable);
        assert_eq!(classify_status(Some(500)), Classification::Fatal);
        assert_eq!(classify_status(None), Classification::Fatal);
        assert!(is_success_status(Some(201)));
        assert!(!is_success_status(None));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::service_call();
        assert_eq!(config.next_delay(Duration::from_secs(1)), Duration::from_millis(1500));
        assert_eq!(config.next_delay(Duration::from_secs(8)), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let (calls, attempt) = scripted(&[503, 503, 200]);
        let config = RetryConfig::default().with_max_attempts(3);
        let status = retry("getCacheEntry", &config, attempt, |s| Some(*s)).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let (calls, attempt) = scripted(&[503, 503, 200]);
        let err = retry("getCacheEntry", &RetryConfig::default(), attempt, |s| Some(*s))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.status(), Some(503));
        assert_eq!(
            err.to_string(),
            "getCacheEntry failed: Cache service responded with 503"
        );
    }

    #[test]
    fn test_client_error_is_returned_as_is() {
        let (calls, attempt) = scripted(&[400, 200]);
        let status = tokio_test::block_on(retry(
            "reserveCache",
            &RetryConfig::default(),
            attempt,
            |s| Some(*s),
        ))
        .unwrap();
        assert_eq!(status, 400);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_internal_server_error_is_fatal() {
        let (calls, attempt) = scripted(&[500, 200]);
        let err = retry("commitCache", &RetryConfig::default(), attempt, |s| Some(*s))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CacheError::RetriesExhausted { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_transport_error_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry(
            "downloadCache",
            &RetryConfig::default(),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(CacheError::Network {
                            message: "connection reset".to_string(),
                            source: None,
                        })
                    } else {
                        Ok(200u16)
                    }
                }
            },
            |s| Some(*s),
        )
        .await
        .unwrap();
        assert_eq!(result, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transport_error_message_is_kept() {
        let err = retry(
            "uploadChunk",
            &RetryConfig::chunk_upload(),
            || async {
                Err::<u16, _>(CacheError::Network {
                    message: "connection reset".to_string(),
                    source: None,
                })
            },
            |s| Some(*s),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "uploadChunk failed: Network error: connection reset");
    }
}
