//! Cancellable, deadline-bounded retry loop with linear backoff.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::error::{CancelReason, Error, Result};

/// Longest single sleep while waiting out a backoff, so cancellation is
/// noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cooperative cancellation: an interrupt flag shared across tokens plus an
/// optional per-token deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    interrupted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register SIGINT and SIGTERM to set this token's interrupt flag.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.interrupted))?;
        }
        Ok(())
    }

    /// A token sharing the interrupt flag that also expires after `timeout`.
    pub fn with_deadline(&self, timeout: Duration) -> Self {
        Self {
            interrupted: Arc::clone(&self.interrupted),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(Error::Cancelled(CancelReason::Interrupted));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::Cancelled(CancelReason::DeadlineExceeded));
        }
        Ok(())
    }

    /// Sleep for `duration`, returning early with an error on cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let end = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= end {
                return Ok(());
            }
            thread::sleep((end - now).min(POLL_INTERVAL));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff after failed attempt `i` (0-based) is `(i + 1) * unit`.
    pub unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            unit: Duration::from_secs(1),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.unit * (attempt + 1)
    }
}

/// Run `operation` until it succeeds, `policy.max_attempts` is reached, or
/// `token` is cancelled.
///
/// The operation receives the 1-based attempt number. Cancellation is checked
/// before each attempt and throughout each backoff; it always takes priority
/// over reporting exhaustion.
pub fn with_retry<T>(
    token: &CancelToken,
    policy: RetryPolicy,
    mut operation: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        token.check()?;
        attempt += 1;
        let error = match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => error,
        };
        tracing::warn!(attempt, max_attempts, "Attempt failed: {}", error);
        if attempt >= max_attempts {
            token.check()?;
            return Err(Error::RetryExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }
        let backoff = policy.backoff(attempt - 1);
        tracing::info!("Retrying in {:?}...", backoff);
        token.sleep(backoff)?;
    }
}
