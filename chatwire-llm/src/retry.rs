//! Bounded retry with exponential backoff.
//!
//! One logical POST is attempted up to `max_retries + 1` times. Any non-2xx
//! status and any transport failure counts as retryable. After the n-th
//! failure (n counted from 1) the executor sleeps `backoff_base * 2^(n-1)`,
//! optionally capped, and tries again. There is no jitter.
//!
//! Timeouts apply per attempt. The executor does not track elapsed time
//! across attempts, so a caller needing an overall deadline must wrap the
//! call itself.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::endpoint::extract_host;
use crate::error::{LlmError, Result, TransportFailure};

/// A fully prepared POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Value,
}

/// Raw provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body as text.
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one POST. Implementations must not retry on their own.
pub trait Transport: Send + Sync {
    /// Issue the request once.
    fn post(&self, request: &HttpRequest) -> impl Future<Output = std::result::Result<HttpResponse, TransportFailure>> + Send;
}

/// Retry and timeout settings for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failure; `0` means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Ceiling for a single delay. `None` keeps doubling unbounded.
    pub max_backoff: Option<Duration>,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive failure.
    ///
    /// `delay_for(1) == backoff_base`, `delay_for(2) == 2 * backoff_base`,
    /// and so on. Saturates instead of overflowing.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let delay = 2u32
            .checked_pow(failures - 1)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Execute `request` under `policy`.
///
/// Returns the first 2xx response. Stops early when `cancel` fires, either
/// before an attempt or during a backoff sleep.
///
/// # Errors
///
/// - [`LlmError::RetriesExhausted`] once more than `max_retries` attempts
///   have failed, carrying the last failure.
/// - [`LlmError::Cancelled`] when the token is cancelled between attempts.
pub async fn execute<T: Transport + ?Sized>(
    transport: &T,
    request: &HttpRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<HttpResponse> {
    let mut failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(request, failures));
        }

        let attempt = failures + 1;
        let outcome = match tokio::time::timeout(policy.timeout, transport.post(request)).await {
            Ok(Ok(response)) if response.is_success() => return Ok(response),
            Ok(Ok(response)) => TransportFailure::status(response.status, &response.body),
            Ok(Err(failure)) => failure,
            Err(_) => TransportFailure::Timeout {
                after_ms: u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        warn!(
            url = %request.url,
            attempt,
            max_attempts = policy.max_retries.saturating_add(1),
            error = %outcome,
            "LLM request attempt failed"
        );

        failures = attempt;
        if failures > policy.max_retries {
            return Err(LlmError::RetriesExhausted {
                url: request.url.clone(),
                host: extract_host(&request.url).0,
                attempts: failures,
                last_error: outcome,
            });
        }

        let delay = policy.delay_for(failures);
        debug!(
            url = %request.url,
            next_attempt = failures + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Backing off before retry"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(cancelled(request, failures)),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled(request: &HttpRequest, attempts: u32) -> LlmError {
    debug!(url = %request.url, attempts, "LLM request cancelled");
    LlmError::Cancelled {
        url: request.url.clone(),
        host: extract_host(&request.url).0,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;
    use tokio::time::Instant;

    /// Fails the first `failures` calls with `failure`, then answers 200.
    struct FlakyTransport {
        failures: u32,
        failure: TransportFailure,
        calls: AtomicU32,
        seen_at: Mutex<Vec<Instant>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                failure: TransportFailure::Connect("refused".into()),
                calls: AtomicU32::new(0),
                seen_at: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen_at(&self) -> Vec<Instant> {
            self.seen_at.lock().expect("lock").clone()
        }
    }

    impl Transport for FlakyTransport {
        async fn post(&self, _request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
            self.seen_at.lock().expect("lock").push(Instant::now());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.failure.clone())
            } else {
                Ok(HttpResponse {
                    status: 200,
                    body: r#"{"text":"ok"}"#.into(),
                })
            }
        }
    }

    /// Always answers with the given status.
    struct StatusTransport(u16, AtomicU32);

    impl Transport for StatusTransport {
        async fn post(&self, _request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: self.0,
                body: "upstream unavailable".into(),
            })
        }
    }

    /// Never answers.
    struct HangingTransport;

    impl Transport for HangingTransport {
        async fn post(&self, _request: &HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
            std::future::pending().await
        }
    }

    fn request() -> HttpRequest {
        HttpRequest {
            url: "https://api.example.com/v1/chat/completions".into(),
            headers: Vec::new(),
            body: serde_json::json!({"messages": []}),
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(100),
            max_backoff: None,
            timeout: Duration::from_secs(5),
        }
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(2),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_makes_one_call() {
        let transport = FlakyTransport::new(0);
        let response = execute(&transport, &request(), &policy(3), &CancellationToken::new())
            .await
            .expect("success");
        assert_eq!(response.status, 200);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_failures_with_doubling_backoff() {
        for n in 1..4 {
            let transport = FlakyTransport::new(n);
            execute(&transport, &request(), &policy(4), &CancellationToken::new())
                .await
                .expect("eventual success");

            assert_eq!(transport.calls(), n + 1, "N failures take N+1 attempts");

            let observed = gaps(&transport.seen_at());
            assert_eq!(observed.len(), n as usize);
            for (i, gap) in observed.iter().enumerate() {
                assert_close(*gap, Duration::from_millis(100) * 2u32.pow(i as u32));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries_plus_one() {
        let transport = FlakyTransport::new(u32::MAX);
        let err = execute(&transport, &request(), &policy(2), &CancellationToken::new())
            .await
            .expect_err("should exhaust");

        assert_eq!(transport.calls(), 3, "never attempts call max_retries + 2");
        match err {
            LlmError::RetriesExhausted { attempts, host, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(host, "api.example.com");
                assert_eq!(last_error, TransportFailure::Connect("refused".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let transport = FlakyTransport::new(1);
        let err = execute(&transport, &request(), &policy(0), &CancellationToken::new())
            .await
            .expect_err("single failure is terminal");
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_status_is_retried() {
        let transport = StatusTransport(503, AtomicU32::new(0));
        let err = execute(&transport, &request(), &policy(1), &CancellationToken::new())
            .await
            .expect_err("should exhaust");

        assert_eq!(transport.1.load(Ordering::SeqCst), 2);
        match err {
            LlmError::RetriesExhausted { last_error, .. } => assert_eq!(
                last_error,
                TransportFailure::Status {
                    status: 503,
                    body: "upstream unavailable".into()
                }
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn per_attempt_timeout_is_retryable() {
        let mut policy = policy(1);
        policy.timeout = Duration::from_millis(250);

        let err = execute(&HangingTransport, &request(), &policy, &CancellationToken::new())
            .await
            .expect_err("should time out");

        match err {
            LlmError::RetriesExhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, TransportFailure::Timeout { after_ms: 250 });
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_the_loop() {
        let transport = FlakyTransport::new(u32::MAX);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let err = execute(&transport, &request(), &policy(10), &cancel)
            .await
            .expect_err("should be cancelled");

        match err {
            LlmError::Cancelled { url, host, attempts } => {
                assert_eq!(url, "https://api.example.com/v1/chat/completions");
                assert_eq!(host, "api.example.com");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_makes_no_attempt() {
        let transport = FlakyTransport::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = execute(&transport, &request(), &policy(3), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, LlmError::Cancelled { attempts: 0, .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn backoff_cap_limits_single_delay() {
        let policy = RetryPolicy {
            max_backoff: Some(Duration::from_millis(300)),
            ..policy(10)
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(8), Duration::from_millis(300));
    }

    #[test]
    fn huge_failure_counts_saturate() {
        assert_eq!(policy(0).delay_for(200), Duration::MAX);
        assert_eq!(policy(0).delay_for(0), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn each_delay_doubles_the_previous(base_ms in 1u64..10_000, n in 1u32..20) {
            let policy = RetryPolicy {
                max_retries: 32,
                backoff_base: Duration::from_millis(base_ms),
                max_backoff: None,
                timeout: Duration::from_secs(1),
            };
            prop_assert_eq!(policy.delay_for(1), Duration::from_millis(base_ms));
            prop_assert_eq!(policy.delay_for(n + 1), policy.delay_for(n) * 2);
        }
    }
}
