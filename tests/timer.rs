use corrente::time::{Deadline, sleep, sleep_until};
use corrente::{RuntimeBuilder, spawn, yield_now};

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn sleep_resumes_near_deadline() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let start = Instant::now();
        sleep(Duration::from_millis(100)).await.unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(100),
            "woke before the deadline: {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(200),
            "woke too long after the deadline: {elapsed:?}"
        );
    });
}

#[test]
fn elapsed_deadline_still_yields_once() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let ran = Rc::new(Cell::new(false));

        spawn({
            let ran = ran.clone();
            async move {
                ran.set(true);
                Ok(())
            }
        })
        .unwrap();

        // A deadline in the past must still hand control to the
        // scheduler before returning.
        sleep_until(Deadline::immediate()).await.unwrap();

        assert!(ran.get(), "sleeping past an elapsed deadline must yield");
    });
}

#[test]
fn sleepers_wake_in_deadline_order() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        for (millis, tag) in [(30u64, 'c'), (10, 'a'), (20, 'b')] {
            let order = order.clone();
            spawn(async move {
                sleep(Duration::from_millis(millis)).await?;
                order.borrow_mut().push(tag);
                Ok(())
            })
            .unwrap();
        }

        sleep(Duration::from_millis(60)).await.unwrap();
        assert_eq!(*order.borrow(), ['a', 'b', 'c']);
    });
}

#[test]
fn equal_deadlines_fire_in_arming_order() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let at = Deadline::after(Duration::from_millis(20));

        for tag in [1, 2, 3] {
            let order = order.clone();
            spawn(async move {
                sleep_until(at).await?;
                order.borrow_mut().push(tag);
                Ok(())
            })
            .unwrap();
        }

        sleep(Duration::from_millis(50)).await.unwrap();
        assert_eq!(*order.borrow(), [1, 2, 3]);
    });
}

#[test]
fn never_deadline_parks_until_cancelled() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let handle = spawn(async {
            // No timer is armed for a never deadline; only cancellation
            // can resume this coroutine.
            sleep_until(Deadline::never()).await?;
            unreachable!("a never deadline cannot elapse");
        })
        .unwrap();

        yield_now().await.unwrap();
        handle.cancel();
        sleep(Duration::from_millis(10)).await.unwrap();

        assert_eq!(handle.state(), corrente::State::Cancelled);
    });
}
