//! The mailbox between the GPIO interrupt and a classifier task.
//!
//! The interrupt side only ever calls [`SignalRegister::raise`], which sets a bit under a critical
//! section, stamps it with the time it arrived and wakes the task. The task side calls
//! [`SignalRegister::wait_until`], which sleeps until either a bit arrives or the deadline passes,
//! then takes and clears whatever is pending.

use core::cell::Cell;

use embassy_futures::select::select;
use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    signal::Signal,
};
use embassy_time::{Instant, Timer};

/// Which way the pin moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Edge {
    /// The button closed the circuit
    Push,
    /// The button opened the circuit
    Release,
}

/// The set of edges seen since the classifier last looked.
///
/// Holds at most one `Push` and one `Release`, each with the time it was last raised. When both
/// are present the register also remembers which came last so they can be replayed in arrival
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct SignalBits {
    flags: u8,
    pushed_at: Instant,
    released_at: Instant,
}

impl SignalBits {
    const PUSH: u8 = 0b001;
    const RELEASE: u8 = 0b010;
    const RELEASE_LAST: u8 = 0b100;

    /// No edges pending
    pub const EMPTY: Self = Self {
        flags: 0,
        pushed_at: Instant::MIN,
        released_at: Instant::MIN,
    };

    /// Returns the set with `edge` added at `at` and marked as the most recent one
    pub const fn with(self, edge: Edge, at: Instant) -> Self {
        match edge {
            Edge::Push => Self {
                flags: (self.flags | Self::PUSH) & !Self::RELEASE_LAST,
                pushed_at: at,
                ..self
            },
            Edge::Release => Self {
                flags: self.flags | Self::RELEASE | Self::RELEASE_LAST,
                released_at: at,
                ..self
            },
        }
    }

    /// Whether `edge` was raised at least once
    pub const fn contains(self, edge: Edge) -> bool {
        let bit = match edge {
            Edge::Push => Self::PUSH,
            Edge::Release => Self::RELEASE,
        };
        self.flags & bit != 0
    }

    /// True when neither edge is pending
    pub const fn is_empty(self) -> bool {
        self.flags & (Self::PUSH | Self::RELEASE) == 0
    }

    /// The pending edges with their arrival times, oldest first
    pub fn edges(self) -> impl Iterator<Item = (Edge, Instant)> {
        let push = (Edge::Push, self.pushed_at);
        let release = (Edge::Release, self.released_at);
        let order = if self.flags & Self::RELEASE_LAST != 0 {
            [push, release]
        } else {
            [release, push]
        };
        order
            .into_iter()
            .filter(move |(edge, _)| self.contains(*edge))
    }
}

impl Default for SignalBits {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One button's signal register. Lives in a `static` so the interrupt handler can reach it.
pub struct SignalRegister {
    bits: Mutex<CriticalSectionRawMutex, Cell<SignalBits>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    claimed: Mutex<CriticalSectionRawMutex, Cell<bool>>,
}

impl SignalRegister {
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new(Cell::new(SignalBits::EMPTY)),
            wake: Signal::new(),
            claimed: Mutex::new(Cell::new(false)),
        }
    }

    /// Record an edge as arriving now and wake the consumer. Safe to call from interrupt context;
    /// never blocks.
    pub fn raise(&self, edge: Edge) {
        self.raise_at(edge, Instant::now());
    }

    /// Record an edge that arrived at `at` and wake the consumer
    pub fn raise_at(&self, edge: Edge, at: Instant) {
        self.bits.lock(|bits| bits.set(bits.get().with(edge, at)));
        self.wake.signal(());
    }

    /// Atomically read and clear the pending edges
    pub fn take(&self) -> SignalBits {
        self.bits.lock(|bits| bits.replace(SignalBits::EMPTY))
    }

    /// Look at the pending edges without consuming them
    pub fn pending(&self) -> SignalBits {
        self.bits.lock(Cell::get)
    }

    /// Sleep until an edge is raised or `deadline` is reached. Returns straight away if an edge
    /// is already pending.
    pub async fn wait(&self, deadline: Instant) {
        if self.pending().is_empty() {
            select(self.wake.wait(), Timer::at(deadline)).await;
        }
    }

    /// [`wait`](Self::wait), then take the pending edges.
    ///
    /// Returns [`SignalBits::EMPTY`] on timeout. A stale wake-up also returns empty, which the
    /// caller treats the same as a timeout that has not reached any deadline yet.
    pub async fn wait_until(&self, deadline: Instant) -> SignalBits {
        self.wait(deadline).await;
        self.take()
    }

    /// Mark the register as owned by a consumer. Returns false if it already was.
    pub(crate) fn claim(&self) -> bool {
        self.claimed.lock(|claimed| !claimed.replace(true))
    }

    /// Give up ownership and drop anything pending, so the register can be claimed afresh
    pub fn release(&self) {
        self.claimed.lock(|claimed| claimed.set(false));
        self.take();
        self.wake.reset();
    }

    /// Whether a consumer currently owns the register
    pub fn is_claimed(&self) -> bool {
        self.claimed.lock(Cell::get)
    }
}

impl Default for SignalRegister {
    fn default() -> Self {
        Self::new()
    }
}
