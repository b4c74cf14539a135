use derive_more::{Display, Error};

use crate::CancelReason;

/// Error returned by a barrier wait.
///
/// `E` is the error type of the barrier action; it is
/// [`Infallible`](core::convert::Infallible) for barriers without one.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum BarrierError<E> {
    /// The round was broken by another party's cancellation, a reset, or a
    /// failed barrier action.
    ///
    /// The barrier stays broken until [`Barrier::reset`](crate::Barrier::reset)
    /// is called.
    #[display("broken barrier")]
    Broken,
    /// This wait was cancelled through its own token.
    #[display("barrier wait cancelled: {_0}")]
    Cancelled(CancelReason),
    /// The barrier action failed on this, the last arriving, party.
    #[display("barrier action failed: {_0}")]
    ActionFailed(E),
}

impl<E: core::error::Error + 'static> core::error::Error for BarrierError<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::ActionFailed(err) => Some(err),
            Self::Broken | Self::Cancelled(_) => None,
        }
    }
}

impl<E> BarrierError<E> {
    /// Returns `true` for [`BarrierError::Broken`].
    #[inline]
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Broken)
    }

    /// Returns `true` for [`BarrierError::Cancelled`].
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Invalid barrier configuration.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The party count was zero.
    #[display("barrier requires at least one party")]
    ZeroParties,
}
