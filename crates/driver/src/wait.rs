//! Poll-until-ready primitive
//!
//! A condition is evaluated repeatedly until it reports success, fails with an
//! error whose kind is not on the wait's ignore list, or the deadline passes.
//! Success is a tri-state decision made by [`IntoCheck`]: `Some(_)`, `true`,
//! or an explicit [`Check::Ready`] end the wait; anything else retries.
//!
//! Service readiness and cast sink polling both go through [`Wait`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ErrorKind, Result, WebDriverError};

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Check<T> {
    Ready(T),
    Retry,
}

pub trait IntoCheck<T> {
    fn into_check(self) -> Check<T>;
}

impl<T> IntoCheck<T> for Check<T> {
    fn into_check(self) -> Check<T> {
        self
    }
}

impl<T> IntoCheck<T> for Option<T> {
    fn into_check(self) -> Check<T> {
        match self {
            Some(v) => Check::Ready(v),
            None => Check::Retry,
        }
    }
}

impl IntoCheck<()> for bool {
    fn into_check(self) -> Check<()> {
        if self {
            Check::Ready(())
        } else {
            Check::Retry
        }
    }
}

#[derive(Debug, Clone)]
pub struct Wait {
    timeout: Duration,
    interval: Duration,
    ignored: Vec<ErrorKind>,
    message: String,
}

impl Wait {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Self::DEFAULT_INTERVAL,
            ignored: Vec::new(),
            message: "wait".to_string(),
        }
    }

    pub fn polling(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Retry instead of failing when the condition errors with `kind`.
    pub fn ignoring(mut self, kind: ErrorKind) -> Self {
        if !self.ignored.contains(&kind) {
            self.ignored.push(kind);
        }
        self
    }

    /// Name used in the timeout error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_ignored(&self, kind: ErrorKind) -> bool {
        self.ignored.contains(&kind)
    }

    /// Evaluate `condition` until it is ready.
    pub async fn until<F, Fut, R, T>(&self, mut condition: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
        R: IntoCheck<T>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;

        loop {
            attempts += 1;
            match condition().await {
                Ok(outcome) => {
                    if let Check::Ready(value) = outcome.into_check() {
                        tracing::trace!(wait = %self.message, attempts, "condition met");
                        return Ok(value);
                    }
                }
                Err(e) if self.is_ignored(e.kind()) => {
                    tracing::trace!(wait = %self.message, attempts, error = %e, "ignored error, retrying");
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                let operation = match last_error {
                    Some(err) => format!("{} (last error: {err})", self.message),
                    None => self.message.clone(),
                };
                tracing::debug!(wait = %self.message, attempts, "wait timed out");
                return Err(WebDriverError::Timeout {
                    operation,
                    timeout: self.timeout,
                });
            }

            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }

    /// Evaluate `condition` against `input` until it is ready.
    pub async fn until_with<I, F, Fut, R, T>(&self, input: I, mut condition: F) -> Result<T>
    where
        I: Clone,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<R>>,
        R: IntoCheck<T>,
    {
        self.until(|| condition(input.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_on_third_poll() {
        let polls = AtomicU32::new(0);
        let wait = Wait::new(Duration::from_secs(5)).polling(Duration::from_millis(500));

        let started = std::time::Instant::now();
        let value = wait
            .until(|| {
                let n = polls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, WebDriverError>((n >= 3).then_some("ready")) }
            })
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(value, "ready");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_never_ready_times_out_after_deadline() {
        let timeout = Duration::from_millis(300);
        let wait = Wait::new(timeout)
            .polling(Duration::from_millis(50))
            .with_message("never");

        let started = std::time::Instant::now();
        let result: Result<()> = wait
            .until(|| async { Ok::<_, WebDriverError>(false) })
            .await;
        let err = result.unwrap_err();

        assert!(started.elapsed() >= timeout);
        match err {
            WebDriverError::Timeout { timeout: t, operation } => {
                assert_eq!(t, timeout);
                assert_eq!(operation, "never");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ignored_errors_are_retried() {
        let polls = Arc::new(AtomicU32::new(0));
        let wait = Wait::new(Duration::from_secs(2))
            .polling(Duration::from_millis(10))
            .ignoring(ErrorKind::NoSuchElement);

        let result = wait
            .until_with(polls.clone(), |polls| async move {
                if polls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WebDriverError::Server {
                        kind: ErrorKind::NoSuchElement,
                        code: "no such element".to_string(),
                        message: String::new(),
                        stacktrace: None,
                        status: 404,
                    })
                } else {
                    Ok(Check::Ready(42))
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_immediately() {
        let polls = AtomicU32::new(0);
        let wait = Wait::new(Duration::from_secs(5))
            .polling(Duration::from_millis(10))
            .ignoring(ErrorKind::NoSuchElement);

        let result: Result<()> = wait
            .until(|| {
                polls.fetch_add(1, Ordering::SeqCst);
                async { Err::<bool, _>(WebDriverError::protocol("boom")) }
            })
            .await;
        let err = result.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_check_conversions() {
        assert_eq!(true.into_check(), Check::Ready(()));
        assert_eq!(false.into_check(), Check::Retry);
        assert_eq!(Some(3).into_check(), Check::Ready(3));
        assert_eq!(None::<i32>.into_check(), Check::Retry);
    }
}
