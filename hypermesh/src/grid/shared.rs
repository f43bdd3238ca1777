//! The shared-cell contention state machine.
//!
//! Shared slots are contended for with a Bayesian broadcast controller: each
//! node keeps a transmit probability `v`, draws against it when the cell
//! fires, and adjusts `v` multiplicatively from the observed outcome. The
//! update rule is deliberately simple; the scheduler only depends on the
//! `{Idle, Adv, Tx, Rx, CoolOff}` shape of the machine.

use rand_core::RngCore;

/// Lower clamp of the transmit probability.
pub const V_MIN: f32 = 1.0 / 16.0;

/// The state of a shared cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SharedState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Advertising, queue empty.
    Adv,
    /// Transmitted in the last shared cell, awaiting feedback.
    Tx,
    /// Listening.
    Rx,
    /// Backing off after a delivered frame.
    CoolOff,
}

/// What the dispatcher should do with the shared cell that just fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedAction {
    /// Transmit the head of the slot queue.
    Transmit,
    /// Open a receive window.
    Listen,
}

/// Feedback from the radio about the last shared-cell action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedOutcome {
    /// Our transmission was acknowledged or went out unopposed.
    Delivered,
    /// The cell collided or the transmission failed.
    Collision,
    /// We listened and the cell stayed quiet.
    Quiet,
}

/// The per-cell controller state.
#[derive(Debug, Clone)]
pub struct SharedCell {
    state: SharedState,
    v: f32,
}

impl Default for SharedCell {
    fn default() -> Self {
        Self {
            state: SharedState::Idle,
            v: V_MIN,
        }
    }
}

impl SharedCell {
    /// Create a controller in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> SharedState {
        self.state
    }

    /// The current transmit probability.
    pub fn probability(&self) -> f32 {
        self.v
    }

    /// Decide what to do in the shared cell firing now.
    ///
    /// `pending` tells the controller whether the slot queue holds a frame;
    /// without one the cell only ever listens (or advertises).
    pub fn step<R: RngCore>(&mut self, rng: &mut R, pending: bool) -> SharedAction {
        // A cool-off cell always yields once before contending again.
        if self.state == SharedState::CoolOff {
            self.state = SharedState::Rx;
            return SharedAction::Listen;
        }

        if !pending {
            self.state = SharedState::Adv;
            return SharedAction::Listen;
        }

        let draw = rng.next_u32() as f32 / u32::MAX as f32;
        if draw < self.v {
            self.state = SharedState::Tx;
            SharedAction::Transmit
        } else {
            self.state = SharedState::Rx;
            SharedAction::Listen
        }
    }

    /// Fold the outcome of the last cell back into the probability.
    pub fn feedback(&mut self, outcome: SharedOutcome) {
        match outcome {
            SharedOutcome::Delivered => {
                self.v = (self.v * 2.0).min(1.0);
                self.state = SharedState::CoolOff;
            }
            SharedOutcome::Collision => {
                self.v = (self.v / 2.0).max(V_MIN);
                self.state = SharedState::Idle;
            }
            SharedOutcome::Quiet => {
                self.v = (self.v * 1.25).min(1.0);
                self.state = SharedState::Idle;
            }
        }
    }
}
