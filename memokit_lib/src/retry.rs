//! Bounded retry for fallible calls.
//!
//! [`CatchException`] runs a closure up to `max_retries` times. Only errors
//! matched by `retry_for` are retried; anything else stops at once. Every
//! failed attempt is logged. The final error is either returned unchanged or
//! replaced by a caller-supplied default.

use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Retry policy for a call site.
pub struct CatchException<E> {
    location: String,
    max_retries: u32,
    retry_for: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    retry_delay: Duration,
    retry_jitter: bool,
    exponential: bool,
    max_delay: Duration,
    log_args: bool,
}

impl<E> Clone for CatchException<E> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            max_retries: self.max_retries,
            retry_for: self.retry_for.clone(),
            retry_delay: self.retry_delay,
            retry_jitter: self.retry_jitter,
            exponential: self.exponential,
            max_delay: self.max_delay,
            log_args: self.log_args,
        }
    }
}

impl<E: Display> CatchException<E> {
    /// One attempt, no retries, no delay. `location` names the call site in logs.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            max_retries: 1,
            retry_for: None,
            retry_delay: Duration::ZERO,
            retry_jitter: true,
            exponential: false,
            max_delay: Duration::from_secs(30),
            log_args: true,
        }
    }

    /// Total number of attempts. Values below 1 are raised to 1.
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    /// Errors for which another attempt is made.
    pub fn retry_for(mut self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.retry_for = Some(Arc::new(f));
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// When on, each wait is a random 0-100% slice of the computed delay.
    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Doubles the delay after every failed attempt, capped at `max_delay`.
    pub fn exponential(mut self, max_delay: Duration) -> Self {
        self.exponential = true;
        self.max_delay = max_delay;
        self
    }

    /// Include the call's arguments in failure logs.
    pub fn log_args(mut self, log_args: bool) -> Self {
        self.log_args = log_args;
        self
    }

    /// Runs `f`, returning the first success or the last error.
    pub fn run<T>(&self, mut f: impl FnMut() -> Result<T, E>) -> Result<T, E> {
        self.run_with(&(), |_| f())
    }

    /// Like [`run`](Self::run), passing `args` to `f` and to failure logs.
    pub fn run_with<A: Debug + ?Sized, T>(
        &self,
        args: &A,
        mut f: impl FnMut(&A) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f(args) {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(&err, attempt, args) {
                    Some(delay) => {
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Runs `f`; if every attempt fails, returns `default` instead of the error.
    pub fn run_or<T>(&self, f: impl FnMut() -> Result<T, E>, default: T) -> T {
        self.run(f).unwrap_or(default)
    }

    pub fn run_or_else<T>(
        &self,
        f: impl FnMut() -> Result<T, E>,
        default: impl FnOnce() -> T,
    ) -> T {
        self.run(f).unwrap_or_else(|_| default())
    }

    /// Async form of [`run`](Self::run); waits on tokio's timer.
    pub async fn run_async<T, F, Fut>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(&err, attempt, &()) {
                    Some(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Logs the failure and decides whether to go again and how long to wait.
    fn next_delay<A: Debug + ?Sized>(&self, err: &E, attempt: u32, args: &A) -> Option<Duration> {
        if self.log_args {
            tracing::error!(
                "{} retry={} {}\nargs: {:?}",
                self.location,
                attempt,
                err,
                args
            );
        } else {
            tracing::error!("{} retry={} {}", self.location, attempt, err);
        }

        let retryable = self.retry_for.as_ref().is_some_and(|f| f(err));
        if !retryable || attempt >= self.max_retries {
            return None;
        }
        Some(self.delay_for_attempt(attempt))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = if self.exponential {
            let shift = attempt.saturating_sub(1).min(30);
            self.retry_delay
                .saturating_mul(1u32 << shift)
                .min(self.max_delay)
        } else {
            self.retry_delay
        };
        if self.retry_jitter && !base.is_zero() {
            let percent = rand::thread_rng().gen_range(0..=100u32);
            jitter_slice(base, percent)
        } else {
            base
        }
    }
}

/// `percent`% of `base`, never more than `base`.
fn jitter_slice(base: Duration, percent: u32) -> Duration {
    match base.checked_mul(percent) {
        Some(scaled) => scaled / 100,
        None => base / 100 * percent,
    }
}

impl<E> fmt::Debug for CatchException<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatchException")
            .field("location", &self.location)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_jitter", &self.retry_jitter)
            .field("exponential", &self.exponential)
            .finish_non_exhaustive()
    }
}
