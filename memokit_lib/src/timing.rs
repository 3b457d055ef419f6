//! Call timing as structured `tracing` events.

use std::fmt::{self, Debug};
use std::time::Instant;

/// Target of the events emitted by [`TimeRecord`].
pub const TIMER_TARGET: &str = "memokit::timer";

type KeyFormatter<A> = Box<dyn Fn(&A) -> String + Send + Sync>;
type RetFormatter<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// Measures calls and logs `location`, `key`, `cost` (ms) and `ret`.
pub struct TimeRecord<A: ?Sized, T> {
    location: String,
    format_key: Option<KeyFormatter<A>>,
    format_ret: Option<RetFormatter<T>>,
}

impl<A: Debug + ?Sized, T: Debug> TimeRecord<A, T> {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            format_key: None,
            format_ret: None,
        }
    }

    /// How to render the `key` field. Defaults to the `Debug` form of the arguments.
    pub fn format_key(mut self, f: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.format_key = Some(Box::new(f));
        self
    }

    /// How to render the `ret` field. Defaults to the `Debug` form of the value.
    pub fn format_ret(mut self, f: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.format_ret = Some(Box::new(f));
        self
    }

    /// Runs `f`, logs the timing, and returns `f`'s result untouched.
    pub fn run<E>(&self, args: &A, f: impl FnOnce(&A) -> Result<T, E>) -> Result<T, E> {
        let start = Instant::now();
        let result = f(args);
        let cost = format!("{:.3}", start.elapsed().as_secs_f64() * 1000.0);

        let key = match &self.format_key {
            Some(format_key) => format_key(args),
            None => format!("{:?}", args),
        };
        let ret = match (&result, &self.format_ret) {
            (Ok(value), Some(format_ret)) => format_ret(value),
            (Ok(value), None) => format!("{:?}", value),
            (Err(_), _) => "-".to_string(),
        };
        tracing::info!(
            target: TIMER_TARGET,
            location = %self.location,
            key = %key,
            cost = %cost,
            ret = %ret,
            ok = result.is_ok(),
            "timed call"
        );
        result
    }
}

impl<A: ?Sized, T> fmt::Debug for TimeRecord<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeRecord")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
