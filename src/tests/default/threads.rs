use core::{convert::Infallible, task::Poll};

use futures_test::task::noop_context;

use crate::{
    Barrier, BarrierError, CancelToken,
    tests::utils::{Arc, AtomicUsize, Boom, Tally, atomic, join_all, poll_wait, spawn_wait, thread},
};

#[cfg_attr(not(loom), test)]
pub fn test_two_parties_release() {
    let barrier = Arc::new(Barrier::new(2).unwrap());
    let peer = spawn_wait(&barrier, None);
    assert_eq!(barrier.wait().block(), Ok(()));
    assert_eq!(peer.join().unwrap(), Ok(()));
    assert_eq!(barrier.number_waiting(), 0);
    assert!(!barrier.is_broken());
}

#[cfg_attr(not(loom), test)]
pub fn test_action_runs_once_per_round() {
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(
        Barrier::with_action(2, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, atomic::SeqCst);
                Ok::<_, Infallible>(())
            }
        })
        .unwrap(),
    );

    let peer = {
        let barrier = barrier.clone();
        thread::spawn(move || {
            (0..2)
                .map(|_| barrier.wait().block())
                .collect::<Vec<_>>()
        })
    };
    for _ in 0..2 {
        assert_eq!(barrier.wait().block(), Ok(()));
    }
    assert_eq!(peer.join().unwrap(), [Ok(()), Ok(())]);
    assert_eq!(runs.load(atomic::SeqCst), 2);
    assert_eq!(barrier.number_waiting(), 0);
}

#[cfg_attr(not(loom), test)]
pub fn test_action_failure_reaches_one_party() {
    let barrier = Arc::new(Barrier::with_action(2, || Err(Boom)).unwrap());
    let peer = spawn_wait(&barrier, None);
    let mine = barrier.wait().block();

    let results = join_all(vec![peer]).into_iter().chain([mine]).collect::<Vec<_>>();
    assert_eq!(
        Tally::of(&results),
        Tally {
            broken: 1,
            action_failed: 1,
            ..Tally::default()
        }
    );
    assert!(results.contains(&Err(BarrierError::ActionFailed(Boom))));
    assert!(barrier.is_broken());
    assert_eq!(barrier.wait().block(), Err(BarrierError::Broken));
}

#[cfg_attr(not(loom), test)]
pub fn test_cancel_then_reset() {
    let barrier = Arc::new(Barrier::new(2).unwrap());
    let token = CancelToken::new();
    let peer = spawn_wait(&barrier, Some(token.clone()));

    token.cancel();
    barrier.reset();

    let result = peer.join().unwrap();
    match result {
        Err(BarrierError::Broken) => assert!(!barrier.is_broken()),
        // The peer may have arrived in the round installed by the reset.
        Err(BarrierError::Cancelled(_)) => assert!(barrier.number_waiting() <= 1),
        other => panic!("unexpected {other:?}"),
    }

    barrier.reset();
    assert_eq!(barrier.number_waiting(), 0);
    assert!(!barrier.is_broken());
}

#[cfg_attr(not(loom), test)]
pub fn test_dropped_wait_races_peer() {
    let barrier = Arc::new(Barrier::new(2).unwrap());
    let peer = spawn_wait(&barrier, None);

    let mut wait = barrier.wait();
    let polled = poll_wait(&mut wait, &mut noop_context());
    drop(wait);

    let result = peer.join().unwrap();
    match polled {
        Poll::Ready(Ok(())) => assert_eq!(result, Ok(())),
        // The peer may have completed the round before the drop.
        Poll::Pending if result.is_ok() => assert!(!barrier.is_broken()),
        Poll::Pending => {
            assert_eq!(result, Err(BarrierError::Broken));
            assert!(barrier.is_broken());
        }
        Poll::Ready(Err(err)) => panic!("unexpected {err:?}"),
    }
}

#[cfg_attr(not(loom), test)]
pub fn test_waiting_count_is_bounded() {
    let barrier = Arc::new(Barrier::new(2).unwrap());
    let peer = spawn_wait(&barrier, None);

    let waiting = barrier.number_waiting();
    assert!(waiting <= barrier.parties());
    assert_eq!(barrier.wait().block(), Ok(()));
    assert_eq!(peer.join().unwrap(), Ok(()));

    let waiting = barrier.number_waiting();
    assert!(waiting <= barrier.parties());
}
