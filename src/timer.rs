//! Deadline thread shared by every [`CancelToken`](crate::CancelToken) with a
//! deadline.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{LazyLock, Weak},
    thread,
    time::Instant,
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::cancel::TokenInner;

const THREAD_NAME: &str = "barrier-timer";
const MIN_PRUNE_LEN: usize = 64;

static TIMER: LazyLock<Timer> = LazyLock::new(Timer::new);

/// Expires `token` at `deadline` unless it is dropped first.
pub(crate) fn schedule(deadline: Instant, token: Weak<TokenInner>) {
    TIMER.schedule(deadline, token);
}

struct Entry {
    deadline: Instant,
    /// Insertion order, so equal deadlines expire first-in first-out.
    seq: u64,
    token: Weak<TokenInner>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.token
            .upgrade()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Queue {
    entries: BinaryHeap<Entry>,
    next_seq: u64,
    prune_at: usize,
    running: bool,
}

impl Queue {
    fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            next_seq: 0,
            prune_at: MIN_PRUNE_LEN,
            running: false,
        }
    }

    /// Drops entries whose token is gone or already cancelled.
    fn prune(&mut self) {
        self.entries.retain(Entry::is_live);
        self.prune_at = MIN_PRUNE_LEN.max(self.entries.len() * 2);
    }

    fn pop_expired(&mut self, now: Instant) -> Vec<Weak<TokenInner>> {
        let mut expired = Vec::new();
        while let Some(entry) = self.entries.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.entries.pop() {
                expired.push(entry.token);
            }
        }
        expired
    }
}

struct Timer {
    queue: Mutex<Queue>,
    condvar: Condvar,
}

impl Timer {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Queue::new()),
            condvar: Condvar::new(),
        }
    }

    fn schedule(&self, deadline: Instant, token: Weak<TokenInner>) {
        let mut queue = self.queue.lock();
        if queue.entries.len() >= queue.prune_at {
            queue.prune();
        }
        let earliest = queue
            .entries
            .peek()
            .is_none_or(|next| deadline < next.deadline);
        let seq = queue.next_seq;
        queue.next_seq = seq.wrapping_add(1);
        queue.entries.push(Entry {
            deadline,
            seq,
            token,
        });

        if !queue.running {
            self.start(&mut queue);
        } else if earliest {
            self.condvar.notify_one();
        }
    }

    fn start(&self, queue: &mut MutexGuard<'_, Queue>) {
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(|| TIMER.run());
        match spawned {
            Ok(_) => queue.running = true,
            // Entries stay queued; the next `schedule` retries.
            Err(err) => tracing::warn!(%err, "failed to start barrier timer thread"),
        }
    }

    fn run(&self) {
        tracing::debug!("barrier timer started");
        let mut queue = self.queue.lock();
        loop {
            let expired = queue.pop_expired(Instant::now());
            if !expired.is_empty() {
                MutexGuard::unlocked(&mut queue, || {
                    for token in expired {
                        if let Some(token) = token.upgrade() {
                            token.expire();
                        }
                    }
                });
                continue;
            }
            let next = queue.entries.peek().map(|entry| entry.deadline);
            match next {
                Some(deadline) => {
                    self.condvar.wait_until(&mut queue, deadline);
                }
                None => self.condvar.wait(&mut queue),
            }
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.queue.lock().entries.len()
    }
}
