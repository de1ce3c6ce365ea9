//! Periodic re-assertion of `online` while the session is active.

use std::time::Duration;

use tokio::time::Instant;

/// What a heartbeat tick asks of the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Re-assert online; relies on the publisher's elapsed-interval rule.
    Reassert,
    /// The session is idle or hidden; write nothing.
    Skip,
}

/// Fixed-period ticker keeping `last_seen` fresh for an active session.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    interval: Duration,
    next_tick: Option<Instant>,
}

impl HeartbeatScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + self.interval);
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Handle a tick that fell due at or before `now`. Missed ticks are not
    /// replayed; the schedule continues from `now`.
    pub fn tick(&mut self, now: Instant, session_active: bool) -> HeartbeatAction {
        match self.next_tick {
            Some(due) if now >= due => {
                self.next_tick = Some(now + self.interval);
                if session_active {
                    HeartbeatAction::Reassert
                } else {
                    HeartbeatAction::Skip
                }
            }
            _ => HeartbeatAction::Skip,
        }
    }

    /// Cancel the ticker. No further re-assertions happen after this.
    pub fn stop(&mut self) {
        self.next_tick = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(60);

    #[test]
    fn ticks_on_period_while_active() {
        let t0 = Instant::now();
        let mut hb = HeartbeatScheduler::new(PERIOD);
        hb.start(t0);
        assert_eq!(hb.next_tick(), Some(t0 + PERIOD));
        assert_eq!(hb.tick(t0 + PERIOD, true), HeartbeatAction::Reassert);
        assert_eq!(hb.next_tick(), Some(t0 + PERIOD * 2));
    }

    #[test]
    fn skips_when_session_inactive() {
        let t0 = Instant::now();
        let mut hb = HeartbeatScheduler::new(PERIOD);
        hb.start(t0);
        assert_eq!(hb.tick(t0 + PERIOD, false), HeartbeatAction::Skip);
        // The schedule still advances.
        assert_eq!(hb.next_tick(), Some(t0 + PERIOD * 2));
    }

    #[test]
    fn early_tick_is_ignored() {
        let t0 = Instant::now();
        let mut hb = HeartbeatScheduler::new(PERIOD);
        hb.start(t0);
        assert_eq!(hb.tick(t0 + Duration::from_secs(10), true), HeartbeatAction::Skip);
        assert_eq!(hb.next_tick(), Some(t0 + PERIOD));
    }

    #[test]
    fn stopped_scheduler_never_reasserts() {
        let t0 = Instant::now();
        let mut hb = HeartbeatScheduler::new(PERIOD);
        hb.start(t0);
        hb.stop();
        assert!(!hb.is_running());
        assert_eq!(hb.tick(t0 + PERIOD * 5, true), HeartbeatAction::Skip);
    }
}
