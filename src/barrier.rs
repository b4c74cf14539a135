use core::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use derive_more::Debug;
use tracing::{debug, trace};

use crate::{
    BarrierError, CancelToken, ConfigError,
    round::{Outcome, Round, RoundState},
    signal::SignalSlot,
    utils::*,
};

type Action<E> = Box<dyn Fn() -> Result<(), E> + Send + Sync>;

/// Reusable rendezvous point for a fixed number of parties.
///
/// Each round completes when `parties` waits have arrived. The last party to
/// arrive runs the barrier action, if any, and then releases every party of
/// the round together; the barrier is immediately ready for the next round.
///
/// A round is *broken* instead of released when one of its parties is
/// cancelled, when the action fails, or when [`reset`](Self::reset) is called
/// while parties are waiting. Every party of a broken round fails, and later
/// waits fail immediately with [`BarrierError::Broken`] until the barrier is
/// reset.
///
/// ```rust
/// # use std::sync::Arc;
/// # use cyclic_barrier::Barrier;
/// let barrier = Arc::new(Barrier::new(3).unwrap());
///
/// let workers: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = barrier.clone();
///         std::thread::spawn(move || barrier.wait().block())
///     })
///     .collect();
///
/// for worker in workers {
///     assert_eq!(worker.join().unwrap(), Ok(()));
/// }
/// assert_eq!(barrier.number_waiting(), 0);
/// assert!(!barrier.is_broken());
/// ```
#[derive(Debug)]
pub struct Barrier<E = Infallible> {
    parties: usize,
    #[debug(skip)]
    action: Option<Action<E>>,
    state: Lock<RoundState>,
}

impl Barrier {
    /// Creates a barrier for `parties` parties without a barrier action.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroParties`] if `parties` is zero.
    ///
    /// ```
    /// use cyclic_barrier::{Barrier, ConfigError};
    ///
    /// let barrier = Barrier::new(10).unwrap();
    /// assert_eq!(barrier.parties(), 10);
    ///
    /// assert_eq!(Barrier::new(0).unwrap_err(), ConfigError::ZeroParties);
    /// ```
    pub fn new(parties: usize) -> Result<Self, ConfigError> {
        Self::build(parties, None)
    }
}

impl<E> Barrier<E> {
    /// Creates a barrier for `parties` parties with a barrier action.
    ///
    /// The action runs once per round on the last party to arrive, before any
    /// party of that round is released. It runs without the barrier lock held,
    /// but the whole round waits for it, so it must not block indefinitely.
    ///
    /// If the action returns an error, the round is broken: the last party
    /// gets [`BarrierError::ActionFailed`] and the others get
    /// [`BarrierError::Broken`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroParties`] if `parties` is zero.
    pub fn with_action<F>(parties: usize, action: F) -> Result<Self, ConfigError>
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        let action: Action<E> = Box::new(action);
        Self::build(parties, Some(action))
    }

    fn build(parties: usize, action: Option<Action<E>>) -> Result<Self, ConfigError> {
        if parties == 0 {
            return Err(ConfigError::ZeroParties);
        }
        Ok(Self {
            parties,
            action,
            state: Lock::new(RoundState::new()),
        })
    }

    /// Waits until all parties of the current round have arrived.
    ///
    /// The arrival is recorded when the returned future is first polled.
    /// See [`BarrierWait`] for the outcomes.
    pub fn wait(&self) -> BarrierWait<'_, E> {
        BarrierWait::new(self, None)
    }

    /// Like [`wait`](Self::wait), but gives up when `token` fires.
    ///
    /// A wait cancelled this way breaks its round for every other party.
    /// If `token` has already fired, the wait fails with
    /// [`BarrierError::Cancelled`] without arriving at all.
    pub fn wait_with(&self, token: &CancelToken) -> BarrierWait<'_, E> {
        BarrierWait::new(self, Some(token.clone()))
    }

    /// Starts a fresh round.
    ///
    /// Parties waiting in the current round fail with
    /// [`BarrierError::Broken`]. Afterwards the barrier is not broken and
    /// nobody is waiting.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let round = state.round.clone();
        let wakeups = if state.arrived > 0 {
            state.break_round(&round)
        } else {
            None
        };
        if wakeups.is_some() {
            debug!(
                generation = round.generation,
                arrived = state.arrived,
                parties = self.parties,
                cause = "reset",
                "barrier round broken"
            );
        }
        state.advance();
        drop(state);

        if let Some(wakeups) = wakeups {
            wakeups.wake();
        }
        debug!(generation = round.generation, "barrier reset");
    }

    /// Returns the number of parties required to complete a round.
    #[inline]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Returns the number of parties that arrived in the current round.
    pub fn number_waiting(&self) -> usize {
        self.state.lock().arrived
    }

    /// Returns `true` if the current round is broken.
    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }

    fn arrive(&self) -> Arrival {
        let mut state = self.state.lock();
        if state.broken {
            return Arrival::Broken;
        }
        if state.arrived == self.parties {
            drop(state);
            panic!(
                "barrier awaited by more than {} parties in one round",
                self.parties
            );
        }
        state.arrived += 1;
        let arrived = state.arrived;
        let round = state.round.clone();
        drop(state);

        trace!(
            generation = round.generation,
            arrived,
            parties = self.parties,
            "arrived at barrier"
        );
        if arrived == self.parties {
            Arrival::Last(round)
        } else {
            Arrival::Waiting(round)
        }
    }

    /// Breaks `round` on behalf of a party leaving it early.
    ///
    /// Returns `None` if this call broke the round, otherwise how the round
    /// had already ended.
    fn abandon(&self, round: &Arc<Round>, cause: &'static str) -> Option<Outcome> {
        let mut state = self.state.lock();
        let Some(wakeups) = state.break_round(round) else {
            return state.outcome_of(round);
        };
        debug!(
            generation = round.generation,
            arrived = state.arrived,
            parties = self.parties,
            cause,
            "barrier round broken"
        );
        drop(state);

        wakeups.wake();
        None
    }

    /// Completes `round` as its last party.
    fn trip(&self, round: Arc<Round>) -> Result<(), BarrierError<E>> {
        if let Some(action) = &self.action {
            let guard = BreakOnUnwind {
                barrier: self,
                round: &round,
            };
            let result = action();
            guard.defuse();
            if let Err(err) = result {
                self.abandon(&round, "action failed");
                return Err(BarrierError::ActionFailed(err));
            }
        }

        let mut state = self.state.lock();
        if !state.is_current(&round) || state.broken {
            // Broken by a reset or a cancelled party while the action ran.
            return Err(BarrierError::Broken);
        }
        state.advance();
        drop(state);

        round.released.fire();
        trace!(
            generation = round.generation,
            parties = self.parties,
            "barrier released"
        );
        Ok(())
    }
}

enum Arrival {
    Broken,
    Waiting(Arc<Round>),
    Last(Arc<Round>),
}

struct BreakOnUnwind<'a, E> {
    barrier: &'a Barrier<E>,
    round: &'a Arc<Round>,
}

impl<E> BreakOnUnwind<'_, E> {
    #[inline]
    fn defuse(self) {
        core::mem::forget(self);
    }
}

impl<E> Drop for BreakOnUnwind<'_, E> {
    fn drop(&mut self) {
        self.barrier.abandon(self.round, "action panicked");
    }
}

#[derive(Debug)]
enum Phase {
    Arriving,
    Waiting {
        round: Arc<Round>,
        released: SignalSlot,
        broken: SignalSlot,
        cancelled: SignalSlot,
    },
    Done,
}

/// Future returned by [`Barrier::wait`] and [`Barrier::wait_with`].
///
/// Resolves to:
///
/// - `Ok(())` when the round is released;
/// - [`BarrierError::Broken`] when the round is (or already was) broken;
/// - [`BarrierError::Cancelled`] when this wait's own token broke the round;
/// - [`BarrierError::ActionFailed`] on the last party when the action failed.
///
/// # Cancellation safety
///
/// Dropping this future after its first poll but before it resolves counts
/// as cancelling the wait: the round is broken for the other parties.
///
/// # Panics
///
/// Polling panics if more than [`Barrier::parties`] waits arrive in one
/// round, and when polled again after completion.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct BarrierWait<'a, E> {
    #[debug(skip)]
    barrier: &'a Barrier<E>,
    token: Option<CancelToken>,
    phase: Phase,
}

impl<'a, E> BarrierWait<'a, E> {
    fn new(barrier: &'a Barrier<E>, token: Option<CancelToken>) -> Self {
        Self {
            barrier,
            token,
            phase: Phase::Arriving,
        }
    }

    /// Blocks the current thread until the wait resolves.
    ///
    /// ```
    /// use cyclic_barrier::Barrier;
    ///
    /// let barrier = Barrier::new(1).unwrap();
    /// assert_eq!(barrier.wait().block(), Ok(()));
    /// ```
    pub fn block(self) -> Result<(), BarrierError<E>> {
        block_on(self)
    }

    /// Leaves the waiting phase, returning the round that was waited on.
    fn finish(&mut self) -> Option<Arc<Round>> {
        let Phase::Waiting {
            round,
            mut released,
            mut broken,
            mut cancelled,
        } = core::mem::replace(&mut self.phase, Phase::Done)
        else {
            return None;
        };
        round.released.unregister(&mut released);
        round.broken.unregister(&mut broken);
        if let Some(token) = &self.token {
            token.unregister(&mut cancelled);
        }
        Some(round)
    }
}

impl<E> Future for BarrierWait<'_, E> {
    type Output = Result<(), BarrierError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Phase::Arriving = this.phase {
            if let Some(reason) = this.token.as_ref().and_then(CancelToken::reason) {
                this.phase = Phase::Done;
                return Poll::Ready(Err(BarrierError::Cancelled(reason)));
            }
            match this.barrier.arrive() {
                Arrival::Broken => {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(BarrierError::Broken));
                }
                Arrival::Last(round) => {
                    this.phase = Phase::Done;
                    return Poll::Ready(this.barrier.trip(round));
                }
                Arrival::Waiting(round) => {
                    this.phase = Phase::Waiting {
                        round,
                        released: None,
                        broken: None,
                        cancelled: None,
                    };
                }
            }
        }

        let Phase::Waiting {
            round,
            released,
            broken,
            cancelled,
        } = &mut this.phase
        else {
            panic!("`BarrierWait` polled after completion");
        };

        let waker = cx.waker();
        let result = if round.released.register(released, waker) {
            Ok(())
        } else if round.broken.register(broken, waker) {
            Err(BarrierError::Broken)
        } else if let Some(reason) = this
            .token
            .as_ref()
            .and_then(|token| token.register(cancelled, waker))
        {
            match this.barrier.abandon(round, "cancelled") {
                None => Err(BarrierError::Cancelled(reason)),
                Some(Outcome::Released) => Ok(()),
                Some(Outcome::Broken) => Err(BarrierError::Broken),
            }
        } else {
            return Poll::Pending;
        };

        this.finish();
        Poll::Ready(result)
    }
}

impl<E> Drop for BarrierWait<'_, E> {
    fn drop(&mut self) {
        if let Some(round) = self.finish() {
            self.barrier.abandon(&round, "dropped");
        }
    }
}

#[cfg(feature = "futures-core")]
impl<E> futures_core::FusedFuture for BarrierWait<'_, E> {
    #[inline]
    fn is_terminated(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }
}
