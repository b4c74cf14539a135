use crate::{
    signal::{Signal, Wakeups},
    utils::*,
};

/// Signals of one barrier generation.
///
/// Waiters hold an `Arc` to the round they arrived in and only ever observe
/// that round's signals. A new `Round` is allocated for every generation.
#[derive(Debug)]
pub(crate) struct Round {
    pub generation: u64,
    pub released: Signal,
    pub broken: Signal,
}

impl Round {
    fn new(generation: u64) -> Arc<Self> {
        Arc::new(Self {
            generation,
            released: Signal::new(),
            broken: Signal::new(),
        })
    }
}

/// How a waiter left the round it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Released,
    Broken,
}

/// Mutable part of the current round, guarded by the barrier lock.
#[derive(Debug)]
pub(crate) struct RoundState {
    pub round: Arc<Round>,
    pub arrived: usize,
    pub broken: bool,
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            round: Round::new(0),
            arrived: 0,
            broken: false,
        }
    }

    #[inline]
    pub fn is_current(&self, round: &Arc<Round>) -> bool {
        Arc::ptr_eq(&self.round, round)
    }

    /// Installs a fresh round and returns the retired one.
    pub fn advance(&mut self) -> Arc<Round> {
        let next = Round::new(self.round.generation.wrapping_add(1));
        self.arrived = 0;
        self.broken = false;
        core::mem::replace(&mut self.round, next)
    }

    /// Breaks the current round if `round` is still current and not yet
    /// broken.
    ///
    /// Returns the round's waiters only to the caller that performed the
    /// break; they are woken once the barrier lock is released.
    pub fn break_round(&mut self, round: &Arc<Round>) -> Option<Wakeups> {
        if !self.is_current(round) || self.broken {
            return None;
        }
        self.broken = true;
        round.broken.fire_deferred()
    }

    /// Resolves how `round` ended, or `None` if it is still filling.
    pub fn outcome_of(&self, round: &Arc<Round>) -> Option<Outcome> {
        if self.is_current(round) {
            return self.broken.then_some(Outcome::Broken);
        }
        // A retired round either had `broken` fired under the lock, or was
        // swapped out by its last arriver on the way to firing `released`.
        if round.broken.is_fired() {
            Some(Outcome::Broken)
        } else {
            Some(Outcome::Released)
        }
    }
}
