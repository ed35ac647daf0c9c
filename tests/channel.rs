use corrente::channel::Channel;
use corrente::time::{Deadline, sleep};
use corrente::{Error, RuntimeBuilder, spawn, yield_now};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn rendezvous_transfers_one_value() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();

        spawn({
            let channel = channel.clone();
            async move { channel.send(42, Deadline::never()).await }
        })
        .unwrap();

        let value = channel.receive(Deadline::never()).await.unwrap();
        assert_eq!(value, 42);
    });
}

#[test]
fn receive_order_follows_wake_order() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();

        // Sleep durations deliberately out of creation order; receives
        // must observe the senders in wake order, not spawn order.
        for (millis, value) in [(30, 111), (40, 222), (10, 333), (20, 444)] {
            let channel = channel.clone();
            spawn(async move {
                sleep(Duration::from_millis(millis)).await?;
                channel.send(value, Deadline::never()).await
            })
            .unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(channel.receive(Deadline::never()).await.unwrap());
        }

        assert_eq!(received, [333, 444, 111, 222]);
    });
}

#[test]
fn concurrent_senders_are_fifo() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();

        for value in [1, 2, 3] {
            let channel = channel.clone();
            spawn(async move { channel.send(value, Deadline::never()).await }).unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(channel.receive(Deadline::never()).await.unwrap());
        }

        assert_eq!(received, [1, 2, 3]);
    });
}

#[test]
fn transported_error_is_reraised() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::<i32>::new();

        spawn({
            let channel = channel.clone();
            async move { channel.send_error("pipeline burst".into(), Deadline::never()).await }
        })
        .unwrap();

        let err = channel.receive(Deadline::never()).await.unwrap_err();
        match err {
            Error::Transported(inner) => assert_eq!(inner.to_string(), "pipeline burst"),
            other => panic!("expected transported error, got {other:?}"),
        }
    });
}

#[test]
fn receive_times_out_without_sender() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::<i32>::new();

        let err = channel
            .receive(Deadline::after(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout));
    });
}

#[test]
fn send_with_immediate_deadline_still_yields_once() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();

        // No receiver: the send performs one scheduling round and then
        // times out.
        let err = channel.send(1, Deadline::immediate()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));

        // With a receiver already parked, the same deadline succeeds
        // without suspending.
        spawn({
            let channel = channel.clone();
            async move {
                let value = channel.receive(Deadline::never()).await?;
                assert_eq!(value, 7);
                Ok(())
            }
        })
        .unwrap();

        yield_now().await.unwrap();
        channel.send(7, Deadline::immediate()).await.unwrap();
    });
}

#[test]
fn done_fails_later_operations() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();

        channel.done();
        channel.done();
        assert!(channel.is_done());

        let err = channel.send(1, Deadline::never()).await.unwrap_err();
        assert!(matches!(err, Error::DoneChannel));

        let err = channel.receive(Deadline::never()).await.unwrap_err();
        assert!(matches!(err, Error::DoneChannel));
    });
}

#[test]
fn done_releases_blocked_parties() {
    let rt = RuntimeBuilder::new().build();

    let outcomes = Rc::new(RefCell::new(Vec::new()));

    rt.block_on({
        let outcomes = outcomes.clone();
        async move {
            let channel = Channel::new();

            spawn({
                let channel = channel.clone();
                let outcomes = outcomes.clone();
                async move {
                    let result = channel.send(1, Deadline::never()).await;
                    outcomes.borrow_mut().push(matches!(result, Err(Error::DoneChannel)));
                    Ok(())
                }
            })
            .unwrap();

            // Both ends cannot block at once on one channel; use a second
            // channel for the blocked receiver.
            let other = Channel::<i32>::new();
            spawn({
                let other = other.clone();
                let outcomes = outcomes.clone();
                async move {
                    let result = other.receive(Deadline::never()).await;
                    outcomes.borrow_mut().push(matches!(result, Err(Error::DoneChannel)));
                    Ok(())
                }
            })
            .unwrap();

            // Let both coroutines park, then terminate the channels.
            yield_now().await.unwrap();
            channel.done();
            other.done();
            sleep(Duration::from_millis(10)).await.unwrap();
        }
    });

    assert_eq!(*outcomes.borrow(), [true, true]);
}

#[test]
fn cancelled_sender_unblocks() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();

        let sender = spawn({
            let channel = channel.clone();
            async move { channel.send(5, Deadline::never()).await }
        })
        .unwrap();

        yield_now().await.unwrap();
        sender.cancel();
        sleep(Duration::from_millis(10)).await.unwrap();

        // The revoked sender must not satisfy a later receive.
        let err = channel
            .receive(Deadline::after(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    });
}

#[test]
fn send_happens_before_receive() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let channel = Channel::new();
        let journal = Rc::new(RefCell::new(Vec::new()));

        spawn({
            let channel = channel.clone();
            let journal = journal.clone();
            async move {
                journal.borrow_mut().push("before send");
                channel.send((), Deadline::never()).await?;
                Ok(())
            }
        })
        .unwrap();

        channel.receive(Deadline::never()).await.unwrap();
        journal.borrow_mut().push("after receive");

        assert_eq!(*journal.borrow(), ["before send", "after receive"]);
    });
}
