//! Rate limiting for repeated log statements.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::{Duration, Instant},
};

/// Per call site state of [`throttle!`].
#[doc(hidden)]
#[derive(Debug)]
pub struct Throttle {
    epoch: OnceLock<Instant>,
    /// Milliseconds since `epoch` before which the call site stays silent.
    next: AtomicU64,
}

impl Throttle {
    /// A throttle that lets the first call through.
    pub const fn new() -> Self {
        Self { epoch: OnceLock::new(), next: AtomicU64::new(0) }
    }

    /// Returns `true` if the call site may run, and closes it for `window` if so.
    pub fn ready(&self, window: Duration) -> bool {
        let now = self.epoch.get_or_init(Instant::now).elapsed().as_millis() as u64;
        let next = self.next.load(Ordering::Relaxed);
        if now < next {
            return false
        }
        let until = now.saturating_add(window.as_millis() as u64);
        self.next.compare_exchange(next, until, Ordering::Relaxed, Ordering::Relaxed).is_ok()
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates `expr` at most once per `duration` for this call site.
///
/// Racing threads never both run it within the same window.
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use arb_tracing::throttle;
///
/// // Report a blocked waiter at most once per ten seconds.
/// throttle!(Duration::from_secs(10), || {
///     tracing::info!(target: "net::arb", "waiting for block sync");
/// });
/// ```
#[macro_export]
macro_rules! throttle {
    ($duration:expr, || $expr:expr) => {{
        static THROTTLE: $crate::__private::Throttle = $crate::__private::Throttle::new();

        if THROTTLE.ready($duration) {
            $expr
        }
    }};
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn throttled_expression_runs_once_per_window() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        for _ in 0..5 {
            throttle!(std::time::Duration::from_secs(60), || {
                COUNTER.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_window_never_throttles() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        for _ in 0..3 {
            throttle!(std::time::Duration::ZERO, || {
                COUNTER.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(COUNTER.load(Ordering::SeqCst), 3);
    }
}
