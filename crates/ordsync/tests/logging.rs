use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use log::Level;
use ordsync::{
    BlockingMutex, DeferredGuard, ReaderWriterLock, SyncError, SyncMode, lock_all, oneshot,
    try_lock_all_for,
};
use test_support::CaptureLogger;

/// 另一个线程持有 `b`，直到 `release` 被触发。
fn hold_in_background(
    b: Arc<BlockingMutex<()>>,
    held: Arc<Barrier>,
    release: Arc<Barrier>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let _guard = b.lock();
        held.wait();
        release.wait();
    })
}

#[test]
fn test_retried_acquisition_is_logged() {
    let logger = CaptureLogger::install();
    let a = Arc::new(BlockingMutex::new(()));
    let b = Arc::new(BlockingMutex::new(()));
    let (held, release) = (Arc::new(Barrier::new(2)), Arc::new(Barrier::new(2)));
    let holder = hold_in_background(Arc::clone(&b), Arc::clone(&held), Arc::clone(&release));
    held.wait();

    let acquirer = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        thread::spawn(move || {
            let mut ga = DeferredGuard::new(&*a);
            let mut gb = DeferredGuard::new(&*b);
            lock_all(&mut [&mut ga, &mut gb])
        })
    };
    thread::sleep(Duration::from_millis(50));
    release.wait();
    holder.join().unwrap();

    assert_eq!(acquirer.join().unwrap(), Ok(()));
    assert!(logger.contains(Level::Debug, "locks after"));
}

#[test]
fn test_multi_lock_timeout_is_logged() {
    let logger = CaptureLogger::install();
    let a = BlockingMutex::new(());
    let b = Arc::new(BlockingMutex::new(()));
    let (held, release) = (Arc::new(Barrier::new(2)), Arc::new(Barrier::new(2)));
    let holder = hold_in_background(Arc::clone(&b), Arc::clone(&held), Arc::clone(&release));
    held.wait();

    let mut ga = DeferredGuard::new(&a);
    let mut gb = DeferredGuard::new(&*b);
    let result = try_lock_all_for(&mut [&mut ga, &mut gb], Duration::from_millis(20));
    release.wait();
    holder.join().unwrap();

    assert_eq!(result, Err(SyncError::ContentionTimeout));
    assert!(logger.contains(Level::Warn, "gave up acquiring 2 locks"));
}

#[test]
fn test_waiting_writer_is_logged() {
    let logger = CaptureLogger::install();
    let lock = Arc::new(ReaderWriterLock::new(0u8));
    let reader = lock.read();

    let l = Arc::clone(&lock);
    let writer = thread::spawn(move || *l.write() += 1);
    thread::sleep(Duration::from_millis(30));
    drop(reader);
    writer.join().unwrap();

    assert!(logger.contains(Level::Debug, "writer waiting"));
}

#[test]
fn test_disconnected_oneshot_is_logged() {
    let logger = CaptureLogger::install();
    let (tx, rx) = oneshot::<u8>(SyncMode::Fence);
    drop(tx);
    assert_eq!(rx.recv(), Err(SyncError::Disconnected));
    assert!(logger.contains(Level::Debug, "sender dropped without sending"));
}
