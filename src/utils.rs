#[cfg(not(loom))]
pub use std::sync::{
    Arc,
    atomic::{self as _atomic, AtomicBool},
};
#[cfg(loom)]
pub use loom::sync::{
    Arc,
    atomic::{self as _atomic, AtomicBool},
};

pub mod atomic {
    pub use super::_atomic::Ordering::*;
}

#[cfg(not(loom))]
pub use parking_lot::Mutex as Lock;
#[cfg(loom)]
pub use self::loom_lock::Lock;

#[cfg(loom)]
mod loom_lock {
    use std::sync::PoisonError;

    use loom::sync::MutexGuard;

    /// `loom` mutex with the non-poisoning `lock` of `parking_lot`.
    #[derive(Debug)]
    pub struct Lock<T>(loom::sync::Mutex<T>);

    impl<T> Lock<T> {
        pub fn new(data: T) -> Self {
            Self(loom::sync::Mutex::new(data))
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// Drives `future` to completion on the current thread.
#[cfg(not(loom))]
pub fn block_on<F: Future>(future: F) -> F::Output {
    futures_executor::block_on(future)
}

#[cfg(loom)]
pub fn block_on<F: Future>(future: F) -> F::Output {
    loom::future::block_on(future)
}
