//! Trailing-edge debounce, modeled as an explicit state machine
//!
//! The extension's only scheduling primitive. Each retrigger cancels and
//! reschedules the deadline, so a burst of triggers inside one quiet window
//! produces exactly one trailing execution. Callers drive it with explicit
//! timestamps instead of a timer handle, which keeps it deterministic and
//! host-agnostic: the JS side polls [`Debounce::fire`] from whatever timer it
//! has.

/// States: idle, or pending with an absolute deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Pending { deadline: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    window_ms: u64,
    state: State,
}

impl Debounce {
    pub const fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            state: State::Idle,
        }
    }

    /// Arm or re-arm: the deadline moves to `now + window`.
    pub fn trigger(&mut self, now: u64) {
        self.state = State::Pending {
            deadline: now + self.window_ms,
        };
    }

    /// True exactly once per armed window, when the deadline has passed.
    /// Transitions back to idle on firing.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.state {
            State::Pending { deadline } if now >= deadline => {
                self.state = State::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending { .. })
    }

    /// Deadline of the armed window, if any. Hosts use it to schedule their
    /// next poll.
    pub fn deadline(&self) -> Option<u64> {
        match self.state {
            State::Pending { deadline } => Some(deadline),
            State::Idle => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = State::Idle;
    }
}
