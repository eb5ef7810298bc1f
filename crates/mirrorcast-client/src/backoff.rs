//! Exponential reconnect backoff with a single pending timer.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Sleep, sleep};

/// Schedules reconnect attempts.
///
/// `delay(n) = min(base * 2^(n-1), cap)` for the n-th consecutive attempt.
/// At most one timer is pending; re-arming replaces it.
#[derive(Debug)]
pub struct ReconnectScheduler {
    base: Duration,
    cap: Duration,
    attempt: u32,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ReconnectScheduler {
    /// Create a scheduler with no pending timer.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
            timer: None,
        }
    }

    /// Delay before the `attempt`-th reconnect (1-based). Saturates at `cap`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Count another attempt and arm (or re-arm) the timer.
    ///
    /// Returns the delay used.
    pub fn schedule(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.delay_for(self.attempt);
        self.timer = Some(Box::pin(sleep(delay)));
        delay
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Drop any pending timer. Returns `true` if one was armed.
    pub fn cancel(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// Whether a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resolve when the pending timer fires, then disarm it.
    ///
    /// Never resolves while no timer is armed. Cancel-safe: dropping the
    /// future leaves the timer armed.
    pub async fn fired(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.timer = None;
            }
            None => std::future::pending().await,
        }
    }
}
