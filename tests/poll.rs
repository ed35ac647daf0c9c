use corrente::io::{FileDescriptor, PollEvent};
use corrente::time::{Deadline, sleep};
use corrente::{Error, RuntimeBuilder, spawn, yield_now};

use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A connected unix stream socket pair.
fn socket_pair() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "socketpair failed");
    (fds[0], fds[1])
}

fn close_pair(pair: (RawFd, RawFd)) {
    unsafe {
        libc::close(pair.0);
        libc::close(pair.1);
    }
}

fn send_byte(fd: RawFd, byte: u8) {
    let n = unsafe { libc::write(fd, &byte as *const _ as *const _, 1) };
    assert_eq!(n, 1, "write failed");
}

fn recv_byte(fd: RawFd) -> u8 {
    let mut byte = 0u8;
    let n = unsafe { libc::read(fd, &mut byte as *mut _ as *mut _, 1) };
    assert_eq!(n, 1, "read failed");
    byte
}

#[test]
fn write_side_is_immediately_ready() {
    init_tracing();
    let rt = RuntimeBuilder::new().build();
    let pair = socket_pair();

    rt.block_on(async move {
        let fd = FileDescriptor::new(pair.0);

        // A fresh socket has send buffer space; both polls succeed.
        fd.poll(PollEvent::Write, Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap();
        fd.poll(PollEvent::Write, Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap();
    });

    close_pair(pair);
}

#[test]
fn read_side_times_out_then_becomes_ready() {
    init_tracing();
    let rt = RuntimeBuilder::new().build();
    let pair = socket_pair();

    rt.block_on(async move {
        let fd = FileDescriptor::new(pair.0);

        // Nothing to read yet.
        let err = fd
            .poll(PollEvent::Read, Deadline::after(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));

        // One byte from the peer makes the read side ready.
        send_byte(pair.1, 0x5a);
        fd.poll(PollEvent::Read, Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(recv_byte(pair.0), 0x5a);
    });

    close_pair(pair);
}

#[test]
fn negative_descriptor_is_invalid() {
    let rt = RuntimeBuilder::new().build();

    rt.block_on(async {
        let fd = FileDescriptor::new(-1);
        let err = fd
            .poll(PollEvent::Read, Deadline::never())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFileDescriptor));
    });
}

#[test]
fn second_waiter_per_direction_is_rejected() {
    init_tracing();
    let rt = RuntimeBuilder::new().build();
    let pair = socket_pair();

    let outcomes = Rc::new(RefCell::new(Vec::new()));

    rt.block_on({
        let outcomes = outcomes.clone();
        async move {
            let first = spawn({
                let outcomes = outcomes.clone();
                async move {
                    let fd = FileDescriptor::new(pair.0);
                    let result = fd.poll(PollEvent::Read, Deadline::never()).await;
                    outcomes
                        .borrow_mut()
                        .push(("first", matches!(result, Err(Error::CanceledCoroutine))));
                    Ok(())
                }
            })
            .unwrap();

            spawn({
                let outcomes = outcomes.clone();
                async move {
                    let fd = FileDescriptor::new(pair.0);
                    let result = fd.poll(PollEvent::Read, Deadline::never()).await;
                    outcomes.borrow_mut().push((
                        "second",
                        matches!(result, Err(Error::FileDescriptorBlockedInAnotherCoroutine)),
                    ));
                    Ok(())
                }
            })
            .unwrap();

            // First parks on the descriptor, second is turned away.
            yield_now().await.unwrap();
            yield_now().await.unwrap();

            first.cancel();
            sleep(Duration::from_millis(10)).await.unwrap();
        }
    });

    assert_eq!(*outcomes.borrow(), [("second", true), ("first", true)]);

    close_pair(pair);
}

#[test]
fn opposite_directions_may_wait_concurrently() {
    init_tracing();
    let rt = RuntimeBuilder::new().build();
    let pair = socket_pair();

    rt.block_on(async move {
        let reader = spawn(async move {
            let fd = FileDescriptor::new(pair.0);
            fd.poll(PollEvent::Read, Deadline::after(Duration::from_secs(1)))
                .await?;
            assert_eq!(recv_byte(pair.0), 0x11);
            Ok(())
        })
        .unwrap();

        // Write readiness on the same descriptor is a separate slot.
        let fd = FileDescriptor::new(pair.0);
        fd.poll(PollEvent::Write, Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap();

        send_byte(pair.1, 0x11);
        sleep(Duration::from_millis(20)).await.unwrap();
        assert_eq!(reader.state(), corrente::State::Finished);
    });

    close_pair(pair);
}

#[test]
fn clean_releases_waiters_without_closing() {
    init_tracing();
    let rt = RuntimeBuilder::new().build();
    let pair = socket_pair();

    rt.block_on(async move {
        let waiter = spawn(async move {
            let fd = FileDescriptor::new(pair.0);
            let err = fd.poll(PollEvent::Read, Deadline::never()).await.unwrap_err();
            assert!(matches!(err, Error::CanceledCoroutine));
            Ok(())
        })
        .unwrap();

        yield_now().await.unwrap();

        let fd = FileDescriptor::new(pair.0);
        fd.clean();
        sleep(Duration::from_millis(10)).await.unwrap();
        assert_eq!(waiter.state(), corrente::State::Finished);

        // The descriptor itself stays open and usable.
        send_byte(pair.1, 0x7f);
        assert_eq!(recv_byte(pair.0), 0x7f);
    });

    close_pair(pair);
}
