use core::task::Waker;
#[cfg(not(loom))]
use std::{
    sync::Weak,
    time::{Duration, Instant},
};

use derive_more::Display;

use crate::{
    signal::{Signal, SignalSlot},
    utils::*,
};

/// Why a [`CancelToken`] fired.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// [`CancelToken::cancel`] was called.
    #[display("cancelled")]
    Requested,
    /// The deadline of the token passed.
    #[display("deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug)]
pub(crate) struct TokenInner {
    signal: Signal,
    reason: Lock<Option<CancelReason>>,
}

impl TokenInner {
    fn cancel(&self, reason: CancelReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        tracing::trace!(%reason, "cancel token fired");
        self.signal.fire()
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.signal.is_fired()
    }

    /// Fires the token because its deadline passed.
    #[cfg(not(loom))]
    pub(crate) fn expire(&self) {
        self.cancel(CancelReason::DeadlineExceeded);
    }
}

/// Per-call cancellation signal for [`Barrier::wait_with`].
///
/// Clones share the same state: cancelling any clone cancels all of them.
///
/// ```rust
/// # use cyclic_barrier::{CancelReason, CancelToken};
/// let token = CancelToken::new();
/// let observer = token.clone();
/// assert!(!observer.is_cancelled());
///
/// token.cancel();
/// assert!(observer.is_cancelled());
/// assert_eq!(observer.reason(), Some(CancelReason::Requested));
/// ```
///
/// [`Barrier::wait_with`]: crate::Barrier::wait_with
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<TokenInner>);

impl CancelToken {
    /// Creates a token that only fires when [`cancel`](Self::cancel) is
    /// called.
    pub fn new() -> Self {
        Self(Arc::new(TokenInner {
            signal: Signal::new(),
            reason: Lock::new(None),
        }))
    }

    /// Creates a token that fires with [`CancelReason::DeadlineExceeded`]
    /// once `timeout` has elapsed.
    ///
    /// A timeout too large to represent never fires.
    #[cfg(not(loom))]
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// Creates a token that fires with [`CancelReason::DeadlineExceeded`]
    /// at `deadline`.
    ///
    /// A deadline in the past yields an already cancelled token. Pending
    /// deadlines share one background thread, which holds no strong
    /// reference to the token: dropping every clone forgets the deadline.
    #[cfg(not(loom))]
    pub fn with_deadline(deadline: Instant) -> Self {
        let token = Self::new();
        if deadline <= Instant::now() {
            token.0.expire();
        } else {
            crate::timer::schedule(deadline, token.downgrade());
        }
        token
    }

    #[cfg(not(loom))]
    pub(crate) fn downgrade(&self) -> Weak<TokenInner> {
        Arc::downgrade(&self.0)
    }

    /// Cancels the token.
    ///
    /// Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.0.cancel(CancelReason::Requested)
    }

    /// Returns `true` once the token has fired.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Returns the reason once the token has fired.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            *self.0.reason.lock()
        } else {
            None
        }
    }

    pub(crate) fn register(&self, slot: &mut SignalSlot, waker: &Waker) -> Option<CancelReason> {
        if self.0.signal.register(slot, waker) {
            Some(self.reason().unwrap_or(CancelReason::Requested))
        } else {
            None
        }
    }

    pub(crate) fn unregister(&self, slot: &mut SignalSlot) {
        self.0.signal.unregister(slot);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
