//! Bad-posture debounce.
//!
//! Turns the per-frame bad/good stream into a stable alert trigger: the alert
//! fires only after bad posture has held continuously for the timeout, and
//! clears on the first good or no-signal frame. Exactly one debouncer drives
//! every alert channel.

use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Where the current bad-posture streak stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlertPhase {
    /// No bad streak.
    #[default]
    Idle,
    /// Bad streak shorter than the timeout.
    Pending,
    /// Bad streak at least as long as the timeout.
    Alerting,
}

impl AlertPhase {
    pub fn is_alerting(self) -> bool {
        self == AlertPhase::Alerting
    }
}

#[derive(Clone, Debug)]
pub struct AlertDebouncer {
    timeout: Duration,
    /// Set on the first bad frame of a streak; `None` means Idle.
    bad_posture_since: Option<Instant>,
}

impl AlertDebouncer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            bad_posture_since: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the timeout. Applies to the running streak as well.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn bad_posture_since(&self) -> Option<Instant> {
        self.bad_posture_since
    }

    /// Feed one frame's evaluation and return the resulting phase.
    pub fn observe(&mut self, is_bad: bool, now: Instant) -> AlertPhase {
        if !is_bad {
            self.bad_posture_since = None;
            return AlertPhase::Idle;
        }
        let since = *self.bad_posture_since.get_or_insert(now);
        phase_for(now.saturating_duration_since(since), self.timeout)
    }

    /// True iff bad posture has held continuously for at least the timeout.
    pub fn should_alert(&mut self, is_bad: bool) -> bool {
        self.should_alert_at(is_bad, Instant::now())
    }

    pub fn should_alert_at(&mut self, is_bad: bool, now: Instant) -> bool {
        self.observe(is_bad, now).is_alerting()
    }

    /// Current phase at `now` without feeding a sample.
    pub fn phase(&self, now: Instant) -> AlertPhase {
        match self.bad_posture_since {
            None => AlertPhase::Idle,
            Some(since) => phase_for(now.saturating_duration_since(since), self.timeout),
        }
    }

    pub fn reset(&mut self) {
        self.bad_posture_since = None;
    }
}

impl Default for AlertDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

fn phase_for(elapsed: Duration, timeout: Duration) -> AlertPhase {
    if elapsed >= timeout {
        AlertPhase::Alerting
    } else {
        AlertPhase::Pending
    }
}
