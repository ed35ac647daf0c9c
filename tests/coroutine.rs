use corrente::channel::Channel;
use corrente::time::{Deadline, sleep};
use corrente::{Error, Group, RuntimeBuilder, State, spawn, yield_now};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn round_robin_yield() {
    let rt = RuntimeBuilder::new().build();

    let counter = Rc::new(Cell::new(0i64));
    let total = counter.clone();

    rt.block_on(async move {
        let finished = Channel::new();

        // Three coroutines incrementing by 7x3, 11x1, 5x2, yielding
        // between increments.
        for (value, repeats) in [(7i64, 3u32), (11, 1), (5, 2)] {
            let counter = counter.clone();
            let finished = finished.clone();

            spawn(async move {
                for _ in 0..repeats {
                    counter.set(counter.get() + value);
                    yield_now().await?;
                }
                finished.send((), Deadline::never()).await
            })
            .unwrap();
        }

        for _ in 0..3 {
            finished.receive(Deadline::never()).await.unwrap();
        }
    });

    assert_eq!(total.get(), 42);
}

#[test]
fn yield_observes_cancellation() {
    let rt = RuntimeBuilder::new().build();

    let observed = Rc::new(RefCell::new(None));
    let report = observed.clone();

    rt.block_on(async move {
        let handle = spawn({
            let observed = observed.clone();
            async move {
                loop {
                    if let Err(err) = yield_now().await {
                        *observed.borrow_mut() = Some(err);
                        return Err(Error::CanceledCoroutine);
                    }
                }
            }
        })
        .unwrap();

        // Let the worker reach its yield loop, then cancel it.
        yield_now().await.unwrap();
        handle.cancel();
        sleep(Duration::from_millis(10)).await.unwrap();

        assert_eq!(handle.state(), State::Cancelled);
    });

    assert!(
        matches!(*report.borrow(), Some(Error::CanceledCoroutine)),
        "yield inside a cancelled coroutine should fail with CanceledCoroutine"
    );
}

#[test]
fn sleep_observes_cancellation() {
    let rt = RuntimeBuilder::new().build();

    let observed = Rc::new(RefCell::new(None));
    let report = observed.clone();

    rt.block_on(async move {
        let handle = spawn({
            let observed = observed.clone();
            async move {
                let err = sleep(Duration::from_secs(10)).await.unwrap_err();
                *observed.borrow_mut() = Some(err);
                Err(Error::CanceledCoroutine)
            }
        })
        .unwrap();

        yield_now().await.unwrap();
        handle.cancel();
        sleep(Duration::from_millis(10)).await.unwrap();
    });

    assert!(matches!(*report.borrow(), Some(Error::CanceledCoroutine)));
}

#[test]
fn spawn_inside_cancelled_coroutine_fails() {
    let rt = RuntimeBuilder::new().build();

    let rejected = Rc::new(Cell::new(false));
    let report = rejected.clone();

    rt.block_on(async move {
        let handle = spawn({
            let rejected = rejected.clone();
            async move {
                // Park until the cancel request arrives.
                let err = sleep(Duration::from_secs(10)).await.unwrap_err();
                assert!(matches!(err, Error::CanceledCoroutine));

                // A cancelled coroutine may not create new ones.
                let spawned = spawn(async { Ok(()) });
                rejected.set(matches!(spawned, Err(Error::CanceledCoroutine)));
                Ok(())
            }
        })
        .unwrap();

        yield_now().await.unwrap();
        handle.cancel();
        sleep(Duration::from_millis(10)).await.unwrap();
    });

    assert!(report.get());
}

#[test]
fn cancel_is_idempotent() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let handle = spawn(async {
            sleep(Duration::from_secs(10)).await?;
            Ok(())
        })
        .unwrap();

        yield_now().await.unwrap();
        handle.cancel();
        handle.cancel();
        sleep(Duration::from_millis(10)).await.unwrap();

        assert_eq!(handle.state(), State::Cancelled);
        handle.cancel();
        assert_eq!(handle.state(), State::Cancelled);
    });
}

#[test]
fn cancel_finished_coroutine_is_noop() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let handle = spawn(async { Ok(()) }).unwrap();

        // Let the worker run to completion.
        sleep(Duration::from_millis(10)).await.unwrap();
        assert_eq!(handle.state(), State::Finished);

        handle.cancel();
        handle.cancel();
        assert_eq!(handle.state(), State::Finished);
    });
}

#[test]
fn group_cancels_all_children() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let group = Group::new();
        let mut handles = Vec::new();

        for _ in 0..3 {
            let handle = group
                .add_coroutine(async {
                    sleep(Duration::from_secs(10)).await?;
                    Ok(())
                })
                .unwrap();
            handles.push(handle);
        }
        assert_eq!(group.len(), 3);

        yield_now().await.unwrap();
        group.cancel();
        assert!(group.is_empty());

        sleep(Duration::from_millis(10)).await.unwrap();
        for handle in &handles {
            assert_eq!(handle.state(), State::Cancelled);
        }
    });
}

#[test]
fn escaping_error_terminates_only_that_coroutine() {
    let rt = RuntimeBuilder::new().build();

    let survived = Rc::new(Cell::new(false));
    let report = survived.clone();

    rt.block_on(async move {
        let failing = spawn(async { Err(Error::Transported("worker exploded".into())) }).unwrap();

        let peer = spawn({
            let survived = survived.clone();
            async move {
                sleep(Duration::from_millis(10)).await?;
                survived.set(true);
                Ok(())
            }
        })
        .unwrap();

        sleep(Duration::from_millis(30)).await.unwrap();
        assert_eq!(failing.state(), State::Finished);
        assert_eq!(peer.state(), State::Finished);
    });

    assert!(report.get(), "an unrelated coroutine must keep running");
}

#[test]
fn spawn_before_block_on() {
    let rt = RuntimeBuilder::new().build();

    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    rt.spawn(async move {
        flag.set(true);
        Ok(())
    });

    rt.block_on(async {
        yield_now().await.unwrap();
    });

    assert!(ran.get());
}

#[test]
fn coroutine_ids_are_unique() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let a = spawn(async { Ok(()) }).unwrap();
        let b = spawn(async { Ok(()) }).unwrap();
        assert_ne!(a.id(), b.id());
    });
}
