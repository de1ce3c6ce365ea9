//! Transport health supervision: which source (push or poll) is
//! authoritative, and when to try push again.
//!
//! This is a policy layer only. It never touches data; the synchronizer
//! reports transport signals in and asks what to do on each deadline.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Health of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    PushConnecting,
    PushActive,
    DegradedPoll,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PushConnecting => "push-connecting",
            Self::PushActive => "push-active",
            Self::DegradedPoll => "degraded-poll",
        })
    }
}

/// Which source is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Push,
    Poll,
}

/// Snapshot of the monitor, published for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportState {
    pub mode: TransportMode,
    pub health: HealthState,
    pub consecutive_failures: u32,
    pub last_switch_at: Instant,
}

/// Exponential backoff for push retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Delay before the retry that follows the `failures`-th consecutive failure.
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.initial
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max)
    }
}

/// What the synchronizer must do after a deadline was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// The pending subscription timed out; drop it and start polling.
    Degraded,
    /// Open a new push subscription.
    Resubscribe,
}

pub struct TransportHealthMonitor {
    state: HealthState,
    connect_timeout: Duration,
    retry: RetryPolicy,
    poll_failure_threshold: u32,
    consecutive_failures: u32,
    poll_failures: u32,
    retries: u32,
    last_switch_at: Instant,
    connect_deadline: Option<Instant>,
    retry_at: Option<Instant>,
}

impl TransportHealthMonitor {
    /// Starts in push-connecting with the connect timeout armed.
    pub fn new(
        connect_timeout: Duration,
        retry: RetryPolicy,
        poll_failure_threshold: u32,
        now: Instant,
    ) -> Self {
        Self {
            state: HealthState::PushConnecting,
            connect_timeout,
            retry,
            poll_failure_threshold: poll_failure_threshold.max(1),
            consecutive_failures: 0,
            poll_failures: 0,
            retries: 0,
            last_switch_at: now,
            connect_deadline: Some(now + connect_timeout),
            retry_at: None,
        }
    }

    pub fn health(&self) -> HealthState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == HealthState::DegradedPoll
    }

    pub fn state(&self) -> TransportState {
        TransportState {
            mode: if self.is_polling() {
                TransportMode::Poll
            } else {
                TransportMode::Push
            },
            health: self.state,
            consecutive_failures: self.consecutive_failures,
            last_switch_at: self.last_switch_at,
        }
    }

    /// Earliest instant at which [`poll_deadline`](Self::poll_deadline) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            HealthState::PushConnecting => self.connect_deadline,
            HealthState::PushActive => None,
            HealthState::DegradedPoll => self.retry_at,
        }
    }

    /// The subscription was acknowledged. Returns true on a state change.
    pub fn on_acknowledged(&mut self, now: Instant) -> bool {
        if self.state != HealthState::PushConnecting {
            return false;
        }
        self.switch(HealthState::PushActive, now, "subscription acknowledged");
        self.consecutive_failures = 0;
        self.poll_failures = 0;
        self.retries = 0;
        self.connect_deadline = None;
        true
    }

    /// The transport reported an error or closed. Returns true on a state change.
    pub fn on_transport_error(&mut self, now: Instant, reason: &str) -> bool {
        match self.state {
            HealthState::PushConnecting | HealthState::PushActive => {
                self.degrade(now, reason);
                true
            }
            HealthState::DegradedPoll => false,
        }
    }

    /// The transport layer reported a liveness timeout.
    pub fn on_transport_timeout(&mut self, now: Instant) -> bool {
        self.on_transport_error(now, "transport timeout")
    }

    /// Record the outcome of one poll cycle. A streak of failures while
    /// degraded pulls the next push retry forward to `now`; returns true
    /// when that happened.
    pub fn on_poll_result(&mut self, ok: bool, now: Instant) -> bool {
        if ok {
            self.poll_failures = 0;
            return false;
        }
        self.poll_failures += 1;
        if self.poll_failures < self.poll_failure_threshold || !self.is_polling() {
            return false;
        }
        self.poll_failures = 0;
        warn!(
            threshold = self.poll_failure_threshold,
            "consecutive poll failures, treating as transport failure"
        );
        match self.retry_at {
            Some(at) if at > now => {
                self.retry_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Handle whichever deadline has passed by `now`.
    pub fn poll_deadline(&mut self, now: Instant) -> Option<HealthAction> {
        match self.state {
            HealthState::PushConnecting => match self.connect_deadline {
                Some(deadline) if now >= deadline => {
                    self.degrade(now, "connect timeout");
                    Some(HealthAction::Degraded)
                }
                _ => None,
            },
            HealthState::DegradedPoll => match self.retry_at {
                Some(at) if now >= at => {
                    self.retries += 1;
                    self.retry_at = None;
                    self.connect_deadline = Some(now + self.connect_timeout);
                    self.switch(HealthState::PushConnecting, now, "retrying push");
                    Some(HealthAction::Resubscribe)
                }
                _ => None,
            },
            HealthState::PushActive => None,
        }
    }

    fn degrade(&mut self, now: Instant, reason: &str) {
        self.consecutive_failures += 1;
        self.connect_deadline = None;
        self.switch(HealthState::DegradedPoll, now, reason);

        let exhausted = self
            .retry
            .max_attempts
            .is_some_and(|max| self.retries >= max);
        if exhausted {
            warn!(retries = self.retries, "push retries exhausted, staying on poll");
            self.retry_at = None;
        } else {
            let delay = self.retry.delay(self.consecutive_failures);
            info!(delay_secs = delay.as_secs(), "push retry scheduled");
            self.retry_at = Some(now + delay);
        }
    }

    fn switch(&mut self, to: HealthState, now: Instant, reason: &str) {
        info!(from = %self.state, to = %to, reason, "transport state change");
        self.state = to;
        self.last_switch_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(300),
            max_attempts: None,
        }
    }

    fn monitor(now: Instant) -> TransportHealthMonitor {
        TransportHealthMonitor::new(Duration::from_secs(5), policy(), 3, now)
    }

    #[test]
    fn starts_connecting_with_timeout_armed() {
        let t0 = Instant::now();
        let m = monitor(t0);
        assert_eq!(m.health(), HealthState::PushConnecting);
        assert_eq!(m.next_deadline(), Some(t0 + Duration::from_secs(5)));
        assert_eq!(m.state().mode, TransportMode::Push);
    }

    #[test]
    fn ack_moves_to_push_active() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        assert!(m.on_acknowledged(t0 + Duration::from_secs(1)));
        assert_eq!(m.health(), HealthState::PushActive);
        assert_eq!(m.next_deadline(), None);
        assert!(!m.on_acknowledged(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn connect_timeout_degrades_within_bound() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        assert_eq!(m.poll_deadline(t0 + Duration::from_secs(4)), None);
        assert_eq!(
            m.poll_deadline(t0 + Duration::from_secs(5)),
            Some(HealthAction::Degraded)
        );
        assert!(m.is_polling());
        assert_eq!(m.state().mode, TransportMode::Poll);
        assert_eq!(m.next_deadline(), Some(t0 + Duration::from_secs(35)));
    }

    #[test]
    fn error_while_active_degrades() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_acknowledged(t0);
        assert!(m.on_transport_error(t0 + Duration::from_secs(100), "socket reset"));
        assert!(m.is_polling());
        assert_eq!(m.state().consecutive_failures, 1);
        assert_eq!(m.state().last_switch_at, t0 + Duration::from_secs(100));
    }

    #[test]
    fn timeout_while_active_degrades() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_acknowledged(t0);
        assert!(m.on_transport_timeout(t0));
        assert!(m.is_polling());
    }

    #[test]
    fn errors_while_degraded_are_ignored() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_transport_error(t0, "refused");
        assert!(!m.on_transport_error(t0, "late error from old subscription"));
        assert_eq!(m.state().consecutive_failures, 1);
    }

    #[test]
    fn retry_resubscribes_and_backs_off() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_transport_error(t0, "refused");

        let t1 = t0 + Duration::from_secs(30);
        assert_eq!(m.poll_deadline(t1), Some(HealthAction::Resubscribe));
        assert_eq!(m.health(), HealthState::PushConnecting);

        // Second failure doubles the delay.
        m.on_transport_error(t1, "refused again");
        assert_eq!(m.next_deadline(), Some(t1 + Duration::from_secs(60)));
    }

    #[test]
    fn backoff_is_capped() {
        let p = policy();
        assert_eq!(p.delay(1), Duration::from_secs(30));
        assert_eq!(p.delay(2), Duration::from_secs(60));
        assert_eq!(p.delay(4), Duration::from_secs(240));
        assert_eq!(p.delay(5), Duration::from_secs(300));
        assert_eq!(p.delay(100), Duration::from_secs(300));
    }

    #[test]
    fn bounded_attempts_stop_retrying() {
        let t0 = Instant::now();
        let mut m = TransportHealthMonitor::new(
            Duration::from_secs(5),
            RetryPolicy {
                max_attempts: Some(1),
                ..policy()
            },
            3,
            t0,
        );
        m.on_transport_error(t0, "refused");
        let t1 = t0 + Duration::from_secs(30);
        assert_eq!(m.poll_deadline(t1), Some(HealthAction::Resubscribe));
        m.on_transport_error(t1, "refused");
        assert_eq!(m.next_deadline(), None);
        assert!(m.is_polling());
    }

    #[test]
    fn ack_resets_failure_count() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_transport_error(t0, "refused");
        m.poll_deadline(t0 + Duration::from_secs(30));
        m.on_acknowledged(t0 + Duration::from_secs(31));
        assert_eq!(m.state().consecutive_failures, 0);
        assert_eq!(m.state().mode, TransportMode::Push);
    }

    #[test]
    fn poll_failure_streak_pulls_retry_forward() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_transport_error(t0, "refused");
        let t1 = t0 + Duration::from_secs(3);
        assert!(!m.on_poll_result(false, t1));
        assert!(!m.on_poll_result(false, t1));
        assert!(m.on_poll_result(false, t1));
        assert_eq!(m.next_deadline(), Some(t1));
    }

    #[test]
    fn successful_poll_resets_streak() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_transport_error(t0, "refused");
        m.on_poll_result(false, t0);
        m.on_poll_result(false, t0);
        m.on_poll_result(true, t0);
        assert!(!m.on_poll_result(false, t0));
        assert_eq!(m.next_deadline(), Some(t0 + Duration::from_secs(30)));
    }
}
