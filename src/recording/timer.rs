//! Cancelable duration ticker
//!
//! A stopped timer owns no interval at all, so a cancelled timer cannot
//! deliver a late tick. Time run between cancel and restart is kept: the
//! first tick after a restart lands where the period boundary would have
//! been had the timer never stopped.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub struct DurationTimer {
    period: Duration,
    accumulated: Duration,
    running_since: Option<Instant>,
    interval: Option<Interval>,
}

impl DurationTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            accumulated: Duration::ZERO,
            running_since: None,
            interval: None,
        }
    }

    /// Start or restart counting from the accumulated total
    pub fn start(&mut self) {
        if self.interval.is_some() {
            return;
        }

        let now = Instant::now();
        let into_period = self.accumulated.as_nanos() % self.period.as_nanos().max(1);
        let first = now + (self.period - Duration::from_nanos(into_period as u64));

        let mut interval = interval_at(first, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.running_since = Some(now);
    }

    /// Stop ticking; the time run so far is added to the total
    pub fn cancel(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
        self.interval = None;
    }

    /// Cancel and forget all accumulated time
    pub fn clear(&mut self) {
        self.cancel();
        self.accumulated = Duration::ZERO;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Total running time across every start/cancel cycle
    pub fn elapsed(&self) -> Duration {
        let current = self
            .running_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        self.accumulated + current
    }

    /// Wait for the next tick; never resolves while cancelled
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
