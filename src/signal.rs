use core::{fmt::Debug, task::Waker};

use crate::utils::*;

/// Observer slot of a [`Signal`], owned by the waiting future.
pub(crate) type SignalSlot = Option<usize>;

#[derive(Default)]
struct Waiters {
    wakers: Vec<Option<Waker>>,
    vacant: Vec<usize>,
}

impl Waiters {
    fn store(&mut self, slot: &mut SignalSlot, waker: &Waker) {
        match slot {
            Some(key) => match &mut self.wakers[*key] {
                Some(old) if old.will_wake(waker) => {}
                entry => {
                    *entry = Some(waker.clone());
                }
            },
            None => {
                let key = match self.vacant.pop() {
                    Some(key) => {
                        self.wakers[key] = Some(waker.clone());
                        key
                    }
                    None => {
                        self.wakers.push(Some(waker.clone()));
                        self.wakers.len() - 1
                    }
                };
                *slot = Some(key);
            }
        }
    }

    fn remove(&mut self, slot: &mut SignalSlot) {
        if let Some(key) = slot.take()
            && let Some(entry) = self.wakers.get_mut(key)
        {
            *entry = None;
            self.vacant.push(key);
        }
    }
}

/// Observers drained from a fired [`Signal`].
///
/// Wake them only after releasing any lock an observer may take.
#[must_use = "observers of a fired signal must be woken"]
pub(crate) struct Wakeups(Vec<Option<Waker>>);

impl Wakeups {
    pub fn wake(self) {
        for waker in self.0.into_iter().flatten() {
            waker.wake();
        }
    }
}

/// One-shot broadcast event.
///
/// Fires at most once. Any number of tasks may observe it, and an observer
/// that registers after the fire completes immediately.
pub(crate) struct Signal {
    fired: AtomicBool,
    waiters: Lock<Waiters>,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            waiters: Lock::new(Waiters::default()),
        }
    }

    #[inline]
    pub fn is_fired(&self) -> bool {
        self.fired.load(atomic::Acquire)
    }

    /// Fires the signal and wakes every registered observer.
    ///
    /// Returns `false` if the signal had already been fired.
    pub fn fire(&self) -> bool {
        match self.fire_deferred() {
            Some(wakeups) => {
                wakeups.wake();
                true
            }
            None => false,
        }
    }

    /// Fires the signal but leaves waking the observers to the caller.
    ///
    /// Returns `None` if the signal had already been fired.
    pub fn fire_deferred(&self) -> Option<Wakeups> {
        if self.fired.swap(true, atomic::AcqRel) {
            return None;
        }
        // Registration re-checks `fired` under this lock, so no observer can
        // slip in between the swap and the drain.
        let wakers = core::mem::take(&mut self.waiters.lock().wakers);
        Some(Wakeups(wakers))
    }

    /// Stores `waker` in `slot` unless the signal has fired.
    ///
    /// Returns `true` if the signal has fired, in which case `slot` is
    /// released.
    pub fn register(&self, slot: &mut SignalSlot, waker: &Waker) -> bool {
        if self.is_fired() {
            *slot = None;
            return true;
        }
        let mut waiters = self.waiters.lock();
        if self.is_fired() {
            *slot = None;
            return true;
        }
        waiters.store(slot, waker);
        false
    }

    pub fn unregister(&self, slot: &mut SignalSlot) {
        if slot.is_none() {
            return;
        }
        if self.is_fired() {
            *slot = None;
            return;
        }
        self.waiters.lock().remove(slot);
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.is_fired())
            .finish()
    }
}
