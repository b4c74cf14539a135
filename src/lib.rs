//! A cyclic rendezvous barrier with cancellation, reset and a barrier action.
//!
//! A [`Barrier`] blocks a fixed number of parties until all of them arrive,
//! releases them together, and is immediately ready for the next round.
//! Waiting is a future, so it works with any `async` runtime, and
//! [`BarrierWait::block`] covers plain worker threads.
//!
//! # Usage
//!
//! ## Rendezvous
//!
//! ```rust
//! # use std::sync::Arc;
//! # use cyclic_barrier::Barrier;
//! let barrier = Arc::new(Barrier::new(2).unwrap());
//! let worker = {
//!     let barrier = barrier.clone();
//!     std::thread::spawn(move || barrier.wait().block())
//! };
//! # futures_executor::block_on(async {
//! barrier.wait().await.unwrap();
//! # });
//! worker.join().unwrap().unwrap();
//! ```
//!
//! ## Barrier action
//!
//! The last party to arrive runs the action before anyone is released. A
//! failing action breaks the round.
//!
//! ```rust
//! # use std::{error::Error, io};
//! # use cyclic_barrier::{Barrier, BarrierError};
//! let barrier = Barrier::with_action(1, || Err(io::Error::other("out of disk"))).unwrap();
//!
//! let err = barrier.wait().block().unwrap_err();
//! assert!(matches!(err, BarrierError::ActionFailed(_)));
//! assert_eq!(err.source().unwrap().to_string(), "out of disk");
//! assert!(barrier.is_broken());
//! assert!(matches!(barrier.wait().block(), Err(BarrierError::Broken)));
//!
//! barrier.reset();
//! assert!(!barrier.is_broken());
//! ```
//!
//! ## Cancellation
//!
//! A wait given a [`CancelToken`] gives up when the token fires, and breaks
//! the round for every other party waiting in it.
//!
//! ```rust
//! # use std::{sync::Arc, time::Duration};
//! # use cyclic_barrier::{Barrier, BarrierError, CancelReason, CancelToken};
//! let barrier = Arc::new(Barrier::new(3).unwrap());
//! let peer = {
//!     let barrier = barrier.clone();
//!     std::thread::spawn(move || barrier.wait().block())
//! };
//! while barrier.number_waiting() < 1 {
//!     std::thread::yield_now();
//! }
//!
//! let token = CancelToken::with_timeout(Duration::from_millis(20));
//! assert_eq!(
//!     barrier.wait_with(&token).block(),
//!     Err(BarrierError::Cancelled(CancelReason::DeadlineExceeded))
//! );
//! assert_eq!(peer.join().unwrap(), Err(BarrierError::Broken));
//! assert!(barrier.is_broken());
//! ```
#![warn(missing_docs)]

mod barrier;
mod cancel;
mod error;
mod round;
mod signal;
#[cfg(not(loom))]
mod timer;
mod utils;

pub use crate::{
    barrier::{Barrier, BarrierWait},
    cancel::{CancelReason, CancelToken},
    error::{BarrierError, ConfigError},
};
