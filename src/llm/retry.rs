//! Rate-limit-aware exponential backoff for upstream model calls.
//!
//! Every failed attempt is classified before deciding whether to wait and
//! try again. Rate limits and transient server failures are retried with a
//! jitter-free doubling delay; anything else is surfaced on first sight.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{TaskError, UpstreamError};

/// Configuration: 5 total attempts, base 1s, doubling, max 60s.
pub const MAX_ATTEMPTS: u32 = 5;
const INITIAL_INTERVAL_SECS: u64 = 1;
const MAX_INTERVAL_SECS: u64 = 60;
const MULTIPLIER: f64 = 2.0;

/// Message fragments that indicate request-rate exhaustion.
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "quota exceeded",
    "too many requests",
    "429",
    "resource exhausted",
    "resource_exhausted",
];

/// Message fragments that indicate a transient server or transport failure.
const TRANSIENT_PHRASES: &[&str] = &[
    "service unavailable",
    "timeout",
    "connection error",
    "500",
    "502",
    "503",
    "504",
];

const RATE_LIMIT_STATUS: u16 = 429;
const TRANSIENT_STATUSES: &[u16] = &[500, 502, 503, 504];

/// How an upstream failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Request-rate exhaustion (429, quota, resource exhausted).
    RateLimit,
    /// Server-side or transport failure that may clear on its own.
    Transient,
    /// Anything else; never retried.
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

/// Classify an upstream failure.
///
/// A structured status code wins when present. Without one, the lower-cased
/// message is searched for known indicator phrases, rate-limit phrases first.
pub fn classify(error: &UpstreamError) -> ErrorClass {
    if let Some(status) = error.status {
        return match status {
            RATE_LIMIT_STATUS => ErrorClass::RateLimit,
            s if TRANSIENT_STATUSES.contains(&s) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        };
    }

    let message = error.message.to_lowercase();
    if RATE_LIMIT_PHRASES.iter().any(|p| message.contains(p)) {
        ErrorClass::RateLimit
    } else if TRANSIENT_PHRASES.iter().any(|p| message.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// True when the error signals request-rate exhaustion.
pub fn is_rate_limit_error(error: &UpstreamError) -> bool {
    classify(error) == ErrorClass::RateLimit
}

/// True when the error is worth retrying (rate limits and transient failures).
pub fn is_retryable_error(error: &UpstreamError) -> bool {
    classify(error).is_retryable()
}

/// Bounds for one invocation's retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Stop waiting once the next backoff would run past this instant.
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(INITIAL_INTERVAL_SECS),
            max_delay: Duration::from_secs(MAX_INTERVAL_SECS),
            multiplier: MULTIPLIER,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The waits a persistently failing invocation goes through, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (1..self.max_attempts.max(1))
            .filter_map(|_| backoff.next_backoff())
            .collect()
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Terminal failure of a retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// Attempts actually made, including the last one.
    pub attempts: u32,
    pub class: ErrorClass,
    pub last: UpstreamError,
}

impl From<RetryFailure> for TaskError {
    fn from(failure: RetryFailure) -> Self {
        match failure.class {
            ErrorClass::RateLimit => TaskError::RateLimited {
                attempts: failure.attempts,
                last: failure.last,
            },
            ErrorClass::Transient | ErrorClass::Fatal => TaskError::Upstream {
                attempts: failure.attempts,
                last: failure.last,
            },
        }
    }
}

/// Result of a single attempt, as seen by the retry loop.
enum AttemptOutcome<T> {
    Success(T),
    Retryable(ErrorClass, UpstreamError),
    Fatal(UpstreamError),
}

impl<T> From<Result<T, UpstreamError>> for AttemptOutcome<T> {
    fn from(result: Result<T, UpstreamError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(e) => match classify(&e) {
                ErrorClass::Fatal => AttemptOutcome::Fatal(e),
                class => AttemptOutcome::Retryable(class, e),
            },
        }
    }
}

/// Retry an async upstream call with exponential backoff.
///
/// `attempt` is called up to `policy.max_attempts` times. Fatal errors end
/// the loop immediately; retryable ones wait out the next backoff delay
/// first. Each failure that is followed by a retry logs one warning with the
/// attempt number and error. The last error is always returned once the loop
/// gives up.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        attempts += 1;

        let (class, error) = match AttemptOutcome::from(attempt().await) {
            AttemptOutcome::Success(value) => return Ok(value),
            AttemptOutcome::Fatal(error) => {
                debug!(attempt = attempts, error = %error, "Upstream call failed with a non-retryable error");
                return Err(RetryFailure {
                    attempts,
                    class: ErrorClass::Fatal,
                    last: error,
                });
            }
            AttemptOutcome::Retryable(class, error) => (class, error),
        };

        let give_up = |error: UpstreamError| RetryFailure {
            attempts,
            class,
            last: error,
        };

        if attempts >= max_attempts {
            debug!(attempts, error = %error, "All retry attempts failed");
            return Err(give_up(error));
        }

        let Some(delay) = backoff.next_backoff() else {
            return Err(give_up(error));
        };

        if let Some(deadline) = policy.deadline
            && Instant::now() + delay > deadline
        {
            debug!(attempts, error = %error, "Deadline reached before next retry");
            return Err(give_up(error));
        }

        warn!(
            attempt = attempts,
            delay_secs = delay.as_secs(),
            error = %error,
            "Retryable upstream failure ({:?}), backing off",
            class
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    /// Operation that fails with `error` for the first `failures` calls, and
    /// records the instant of every call.
    fn flaky(
        failures: u32,
        error: UpstreamError,
        calls: Arc<Mutex<Vec<Instant>>>,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str, UpstreamError>> {
        let count = Arc::new(AtomicU32::new(0));
        move || {
            calls.lock().unwrap().push(Instant::now());
            let n = count.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                std::future::ready(Err(error.clone()))
            } else {
                std::future::ready(Ok("done"))
            }
        }
    }

    fn gaps(calls: &Arc<Mutex<Vec<Instant>>>) -> Vec<Duration> {
        let calls = calls.lock().unwrap();
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn warn_lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|line| line.contains("WARN"))
                .map(str::to_string)
                .collect()
        }
    }

    /// Install a thread-local subscriber writing WARN and above to a buffer.
    fn capture_warnings() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    // ============================================
    // Classification
    // ============================================

    #[test]
    fn test_rate_limit_phrases_are_retryable_in_any_case() {
        for phrase in RATE_LIMIT_PHRASES {
            for message in [
                format!("upstream said: {}", phrase),
                format!("{} - please slow down", phrase.to_uppercase()),
            ] {
                let err = UpstreamError::new(message.clone());
                assert!(is_rate_limit_error(&err), "{message}");
                assert!(is_retryable_error(&err), "{message}");
            }
        }
    }

    #[test]
    fn test_transient_phrases_are_retryable_but_not_rate_limits() {
        for message in [
            "503 Service Unavailable",
            "request Timeout after 30s",
            "Connection error: reset by peer",
            "HTTP 502 from gateway",
        ] {
            let err = UpstreamError::new(message);
            assert_eq!(classify(&err), ErrorClass::Transient, "{message}");
            assert!(!is_rate_limit_error(&err));
        }
    }

    #[test]
    fn test_unmatched_messages_are_fatal() {
        for message in [
            "API key not valid",
            "invalid argument: temperature",
            "permission denied",
            "",
        ] {
            let err = UpstreamError::new(message);
            assert_eq!(classify(&err), ErrorClass::Fatal, "{message}");
            assert!(!is_retryable_error(&err));
        }
    }

    #[test]
    fn test_status_code_takes_precedence_over_message() {
        assert_eq!(
            classify(&UpstreamError::with_status(429, "slow down")),
            ErrorClass::RateLimit
        );
        for status in [500, 502, 503, 504] {
            assert_eq!(
                classify(&UpstreamError::with_status(status, "oops")),
                ErrorClass::Transient
            );
        }
        // A structured 400 is fatal even if the text mentions a quota.
        assert_eq!(
            classify(&UpstreamError::with_status(400, "quota exceeded")),
            ErrorClass::Fatal
        );
    }

    // ============================================
    // Backoff schedule
    // ============================================

    #[test]
    fn test_default_delays_double_from_one_second() {
        assert_eq!(RetryPolicy::default().delays(), secs(&[1, 2, 4, 8]));
    }

    #[test]
    fn test_delays_are_capped_at_sixty_seconds() {
        let policy = RetryPolicy::default().with_max_attempts(9);
        assert_eq!(policy.delays(), secs(&[1, 2, 4, 8, 16, 32, 60, 60]));
    }

    // ============================================
    // Retry loop
    // ============================================

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_first_attempt() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let op = flaky(0, UpstreamError::new("unused"), calls.clone());

        let result = retry_with_backoff(&RetryPolicy::default(), op).await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_doubling_delays_until_success() {
        for k in 1..MAX_ATTEMPTS {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let op = flaky(k, UpstreamError::with_status(429, "quota"), calls.clone());

            let result = retry_with_backoff(&RetryPolicy::default(), op).await;

            assert_eq!(result.unwrap(), "done");
            let expected: Vec<Duration> = secs(&[1, 2, 4, 8, 16])
                .into_iter()
                .take(k as usize)
                .collect();
            assert_eq!(gaps(&calls), expected, "k = {k}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_after_max_attempts() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let op = flaky(u32::MAX, UpstreamError::new("Too Many Requests"), calls.clone());

        let failure = retry_with_backoff(&RetryPolicy::default(), op)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, MAX_ATTEMPTS);
        assert_eq!(failure.class, ErrorClass::RateLimit);
        assert_eq!(failure.last.message, "Too Many Requests");
        assert_eq!(calls.lock().unwrap().len(), MAX_ATTEMPTS as usize);
        assert_eq!(gaps(&calls), secs(&[1, 2, 4, 8]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let op = flaky(u32::MAX, UpstreamError::new("API key not valid"), calls.clone());
        let started = Instant::now();

        let failure = retry_with_backoff(&RetryPolicy::default(), op)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.class, ErrorClass::Fatal);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(Instant::now(), started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_retried_failure_logs_one_warning() {
        let (logs, _guard) = capture_warnings();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let op = flaky(u32::MAX, UpstreamError::with_status(429, "quota exhausted"), calls.clone());

        retry_with_backoff(&RetryPolicy::default(), op)
            .await
            .unwrap_err();

        let warnings = logs.warn_lines();
        assert_eq!(warnings.len(), 4, "{warnings:#?}");
        for (i, line) in warnings.iter().enumerate() {
            assert!(line.contains(&format!("attempt={}", i + 1)), "{line}");
            assert!(line.contains("quota exhausted"), "{line}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_logs_no_warning() {
        let (logs, _guard) = capture_warnings();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let op = flaky(u32::MAX, UpstreamError::with_status(400, "bad request"), calls.clone());

        retry_with_backoff(&RetryPolicy::default(), op)
            .await
            .unwrap_err();

        assert!(logs.warn_lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_is_surfaced_not_first() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();

        let failure = retry_with_backoff(&RetryPolicy::default(), move || {
            let n = count_clone.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(UpstreamError::new(format!("503 attempt {}", n + 1))) }
        })
        .await
        .unwrap_err();

        assert_eq!(failure.class, ErrorClass::Transient);
        assert_eq!(failure.last.message, "503 attempt 5");
        assert_eq!(count.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_before_overrunning_wait() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let op = flaky(u32::MAX, UpstreamError::new("rate limit"), calls.clone());
        // 1s + 2s fit; the 4s wait would end at t=7s.
        let policy = RetryPolicy::default().with_deadline(Instant::now() + Duration::from_secs(5));

        let failure = retry_with_backoff(&policy, op).await.unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.class, ErrorClass::RateLimit);
        assert_eq!(gaps(&calls), secs(&[1, 2]));
    }

    #[test]
    fn test_failure_maps_to_task_error_kind() {
        let rate_limited: TaskError = RetryFailure {
            attempts: 5,
            class: ErrorClass::RateLimit,
            last: UpstreamError::new("429"),
        }
        .into();
        assert!(matches!(rate_limited, TaskError::RateLimited { attempts: 5, .. }));

        let transient: TaskError = RetryFailure {
            attempts: 5,
            class: ErrorClass::Transient,
            last: UpstreamError::new("timeout"),
        }
        .into();
        assert!(matches!(transient, TaskError::Upstream { attempts: 5, .. }));

        let fatal: TaskError = RetryFailure {
            attempts: 1,
            class: ErrorClass::Fatal,
            last: UpstreamError::new("bad key"),
        }
        .into();
        assert!(matches!(fatal, TaskError::Upstream { attempts: 1, .. }));
    }
}
