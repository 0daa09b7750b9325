//! Poll pacing and stuck-queue detection.

use std::time::Duration;

/// Geometric poll interval, re-based every `rebase_every` polls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollIntervalPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub ceiling: Duration,
    pub rebase_every: u32,
}

impl Default for PollIntervalPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            multiplier: 1.5,
            ceiling: Duration::from_secs(4),
            rebase_every: 10,
        }
    }
}

/// Stuck-queue recovery budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckQueuePolicy {
    pub queued_timeout: Duration,
    pub max_run_retries: u32,
}

/// Owns both pacing policies for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffScheduler {
    pub interval: PollIntervalPolicy,
    pub stuck: StuckQueuePolicy,
}

impl BackoffScheduler {
    pub fn new(interval: PollIntervalPolicy, stuck: StuckQueuePolicy) -> Self {
        Self { interval, stuck }
    }

    /// Sleep before the next poll. `iteration` counts polls since the last
    /// status change, starting at zero.
    pub fn next_interval(&self, iteration: u32) -> Duration {
        let policy = &self.interval;
        let step = match policy.rebase_every {
            0 => iteration,
            n => iteration % n,
        };
        let factor = policy.multiplier.max(1.0).powi(step.min(64) as i32);
        let secs = (policy.base.as_secs_f64() * factor).min(policy.ceiling.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Whether a run queued for `elapsed_in_queued` has exceeded `timeout`.
    pub fn is_stuck(&self, elapsed_in_queued: Duration, timeout: Duration) -> bool {
        elapsed_in_queued > timeout
    }

    /// Whether a run queued for `elapsed` exceeds the configured timeout.
    pub fn queued_too_long(&self, elapsed: Duration) -> bool {
        self.is_stuck(elapsed, self.stuck.queued_timeout)
    }

    /// Whether another cancel-and-recreate is allowed after `recreations` so far.
    pub fn may_recreate(&self, recreations: u32) -> bool {
        recreations < self.stuck.max_run_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> BackoffScheduler {
        BackoffScheduler::new(
            PollIntervalPolicy::default(),
            StuckQueuePolicy {
                queued_timeout: Duration::from_secs(5),
                max_run_retries: 2,
            },
        )
    }

    #[test]
    fn interval_grows_geometrically_then_caps() {
        let s = scheduler();
        assert_eq!(s.next_interval(0), Duration::from_millis(500));
        assert_eq!(s.next_interval(1), Duration::from_millis(750));
        assert_eq!(s.next_interval(2), Duration::from_millis(1125));
        assert_eq!(s.next_interval(9), Duration::from_secs(4));
    }

    #[test]
    fn interval_rebases_every_period() {
        let s = scheduler();
        assert_eq!(s.next_interval(10), s.next_interval(0));
        assert_eq!(s.next_interval(13), s.next_interval(3));
    }

    #[test]
    fn zero_rebase_period_never_rebases() {
        let mut s = scheduler();
        s.interval.rebase_every = 0;
        assert_eq!(s.next_interval(1000), Duration::from_secs(4));
    }

    #[test]
    fn stuck_only_after_timeout_elapses() {
        let s = scheduler();
        assert!(!s.queued_too_long(Duration::from_secs(5)));
        assert!(s.queued_too_long(Duration::from_millis(5001)));
        assert!(s.is_stuck(Duration::from_secs(61), Duration::from_secs(60)));
    }

    #[test]
    fn recreate_budget() {
        let s = scheduler();
        assert!(s.may_recreate(0));
        assert!(s.may_recreate(1));
        assert!(!s.may_recreate(2));
    }
}
