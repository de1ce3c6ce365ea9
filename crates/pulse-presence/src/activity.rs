//! Local activity detection with hysteresis.
//!
//! The monitor is a pure state machine over monotonic instants: the host
//! feeds it interaction and visibility signals, the session loop asks it
//! when its inactivity deadline falls. Only edges are reported upward.

use std::time::Duration;

use tokio::time::Instant;

/// Edge transitions reported to the status publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityTransition {
    /// The user is interacting (or came back to the session).
    Active,
    /// The inactivity window elapsed without interaction.
    Idle,
    /// The session became hidden; stronger than idle.
    InactiveStrong,
}

/// Interaction signals that count as activity.
///
/// Continuous pointer movement is deliberately absent: it arrives at frame
/// rate and would turn every mouse wiggle into a deadline reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    PointerDown,
    KeyDown,
    Scroll,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Stopped,
    Active,
    Idle,
    Hidden,
}

/// Tracks whether the local user is active, idle, or hidden.
#[derive(Debug)]
pub struct ActivityMonitor {
    window: Duration,
    state: MonitorState,
    deadline: Option<Instant>,
    last_local_event_at: Option<Instant>,
}

impl ActivityMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: MonitorState::Stopped,
            deadline: None,
            last_local_event_at: None,
        }
    }

    /// Begin observing. A session starts out active.
    pub fn start(&mut self, now: Instant) -> Option<ActivityTransition> {
        if self.state != MonitorState::Stopped {
            return None;
        }
        self.state = MonitorState::Active;
        self.last_local_event_at = Some(now);
        self.deadline = Some(now + self.window);
        Some(ActivityTransition::Active)
    }

    /// A recognized interaction happened.
    pub fn notify_activity(&mut self, now: Instant) -> Option<ActivityTransition> {
        match self.state {
            MonitorState::Stopped | MonitorState::Hidden => None,
            MonitorState::Active => {
                self.touch(now);
                None
            }
            MonitorState::Idle => {
                self.state = MonitorState::Active;
                self.touch(now);
                Some(ActivityTransition::Active)
            }
        }
    }

    /// The session's visibility changed.
    pub fn notify_visibility_change(
        &mut self,
        visible: bool,
        now: Instant,
    ) -> Option<ActivityTransition> {
        match (self.state, visible) {
            (MonitorState::Stopped, _) => None,
            (MonitorState::Hidden, false) => None,
            (_, false) => {
                self.state = MonitorState::Hidden;
                self.deadline = None;
                Some(ActivityTransition::InactiveStrong)
            }
            (MonitorState::Hidden, true) => {
                self.state = MonitorState::Active;
                self.touch(now);
                Some(ActivityTransition::Active)
            }
            (_, true) => self.notify_activity(now),
        }
    }

    /// Fire `Idle` once if the inactivity deadline has passed.
    pub fn poll_deadline(&mut self, now: Instant) -> Option<ActivityTransition> {
        match (self.state, self.deadline) {
            (MonitorState::Active, Some(deadline)) if now >= deadline => {
                self.state = MonitorState::Idle;
                self.deadline = None;
                Some(ActivityTransition::Idle)
            }
            _ => None,
        }
    }

    /// When the inactivity timer next needs attention, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// End observation and disarm the inactivity timer.
    pub fn stop(&mut self) {
        self.state = MonitorState::Stopped;
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.state == MonitorState::Active
    }

    pub fn is_hidden(&self) -> bool {
        self.state == MonitorState::Hidden
    }

    pub fn last_local_event_at(&self) -> Option<Instant> {
        self.last_local_event_at
    }

    /// The most recent edge this monitor would report, i.e. its current
    /// intent. `None` once stopped.
    pub fn current_intent(&self) -> Option<ActivityTransition> {
        match self.state {
            MonitorState::Stopped => None,
            MonitorState::Active => Some(ActivityTransition::Active),
            MonitorState::Idle => Some(ActivityTransition::Idle),
            MonitorState::Hidden => Some(ActivityTransition::InactiveStrong),
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_local_event_at = Some(now);
        self.deadline = Some(now + self.window);
    }
}
