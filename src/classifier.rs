//! Debounce and click/hold classification.
//!
//! This module contains no hardware and no real timers. Callers feed it edges and the current
//! time, and ask it for the next [`Classifier::deadline`]. That keeps every transition testable
//! with a fake clock.
//!
//! ```text
//!            Push                 debounce               hold
//!   Idle ──────────▶ PressPending ────────▶ Held ─────────────▶ HoldReported
//!    ▲  ◀───────────     │                 │  ▲                   │     ▲
//!    │     Release       │           Release│  │Push        Release│     │Push
//!    │                   │                 ▼  │                   ▼     │
//!    └──── Click ◀── debounce ─── ReleasePending    Idle ◀── HoldReleasePending
//! ```

use defmt::{debug, trace};
use embassy_time::Instant;

use crate::{ButtonConfig, signal::Edge};

/// The classified result of one physical interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum ButtonEventKind {
    /// Pressed and released before the hold threshold
    Click = 0,
    /// Pressed for at least the hold threshold. Reported while still pressed.
    Hold = 1,
}

/// Debounced state of the button. Every tentative state carries the time its window started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum State {
    /// Released and settled
    Idle,
    /// A push was seen; waiting for it to stay put for the debounce window
    PressPending { pushed_at: Instant },
    /// Press confirmed; waiting to see whether it turns into a hold or a click
    Held { pushed_at: Instant },
    /// A release was seen after a confirmed press; waiting for it to settle
    ReleasePending {
        pushed_at: Instant,
        released_at: Instant,
    },
    /// A hold has been reported; nothing more is emitted until the button is let go
    HoldReported,
    /// The release ending a hold is being debounced
    HoldReleasePending { released_at: Instant },
}

/// Something that can move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Input {
    Edge(Edge),
    /// The deadline returned by [`Classifier::deadline`] has been reached
    Timeout,
}

/// The pure transition function.
///
/// Returns the next state and, at most, one event to publish. A `Timeout` delivered before the
/// current state's deadline is ignored.
pub fn transition(
    state: State,
    input: Input,
    now: Instant,
    config: &ButtonConfig,
) -> (State, Option<ButtonEventKind>) {
    if input == Input::Timeout && deadline_of(state, config).is_none_or(|d| now < d) {
        return (state, None);
    }

    match (state, input) {
        (State::Idle, Input::Edge(Edge::Push)) => (State::PressPending { pushed_at: now }, None),
        (State::Idle, _) => (State::Idle, None),

        // Bounce inside the push window: the press never happened
        (State::PressPending { .. }, Input::Edge(Edge::Release)) => (State::Idle, None),
        (State::PressPending { pushed_at }, Input::Timeout) => (State::Held { pushed_at }, None),
        (State::PressPending { .. }, Input::Edge(Edge::Push)) => (state, None),

        (State::Held { pushed_at }, Input::Edge(Edge::Release)) => (
            State::ReleasePending {
                pushed_at,
                released_at: now,
            },
            None,
        ),
        (State::Held { .. }, Input::Timeout) => {
            (State::HoldReported, Some(ButtonEventKind::Hold))
        }
        (State::Held { .. }, Input::Edge(Edge::Push)) => (state, None),

        // Bounce inside the release window: still held, the hold clock keeps running
        (State::ReleasePending { pushed_at, .. }, Input::Edge(Edge::Push)) => {
            (State::Held { pushed_at }, None)
        }
        (State::ReleasePending { .. }, Input::Timeout) => {
            (State::Idle, Some(ButtonEventKind::Click))
        }
        (State::ReleasePending { .. }, Input::Edge(Edge::Release)) => (state, None),

        (State::HoldReported, Input::Edge(Edge::Release)) => {
            (State::HoldReleasePending { released_at: now }, None)
        }
        (State::HoldReported, _) => (State::HoldReported, None),

        (State::HoldReleasePending { .. }, Input::Edge(Edge::Push)) => (State::HoldReported, None),
        (State::HoldReleasePending { .. }, Input::Timeout) => (State::Idle, None),
        (State::HoldReleasePending { .. }, Input::Edge(Edge::Release)) => (state, None),
    }
}

/// When `state` stops being tentative, if ever
pub fn deadline_of(state: State, config: &ButtonConfig) -> Option<Instant> {
    match state {
        State::Idle | State::HoldReported => None,
        State::PressPending { pushed_at } => Some(pushed_at + config.debounce),
        State::Held { pushed_at } => Some(pushed_at + config.hold),
        State::ReleasePending { released_at, .. } => Some(released_at + config.debounce),
        State::HoldReleasePending { released_at } => Some(released_at + config.debounce),
    }
}

/// Owns the debounced state of a single button
pub struct Classifier {
    state: State,
    config: ButtonConfig,
}

impl Classifier {
    pub fn new(config: ButtonConfig) -> Self {
        Self {
            state: State::Idle,
            config,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The instant at which [`Input::Timeout`] should be delivered, or `None` when nothing is
    /// pending
    pub fn deadline(&self) -> Option<Instant> {
        deadline_of(self.state, &self.config)
    }

    /// Apply one input and return the event it commits, if any
    pub fn handle(&mut self, input: Input, now: Instant) -> Option<ButtonEventKind> {
        let (next, event) = transition(self.state, input, now, &self.config);
        if next != self.state {
            trace!("CLASSIFIER: {} --{}--> {} at {}", self.state, input, next, now);
        }
        if let Some(kind) = event {
            debug!("CLASSIFIER: committed {} at {}", kind, now);
        }
        self.state = next;
        event
    }

    /// Deliver every deadline that has passed by `now`, oldest first.
    ///
    /// A late wake-up can have skipped more than one window (a press confirmed and then held), so
    /// this keeps going until the next deadline lies in the future.
    pub fn expire(&mut self, now: Instant, mut emit: impl FnMut(ButtonEventKind)) {
        while let Some(deadline) = self.deadline() {
            if deadline > now {
                break;
            }
            if let Some(kind) = self.handle(Input::Timeout, deadline) {
                emit(kind);
            }
        }
    }
}
