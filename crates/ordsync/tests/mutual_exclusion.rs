use std::sync::Arc;
use std::time::Duration;

use ordsync::{BlockingMutex, DeferredGuard, RawBlockingMutex, SpinLock, adopt_lock};
use test_support::{IntervalRecorder, Role, run_with_timeout, spawn_workers};

const WORKERS: usize = 4;
const ROUNDS: usize = 2_000;

#[test]
fn test_spin_lock_sections_never_overlap() {
    let lock = Arc::new(SpinLock::new(0usize));
    let recorder = Arc::new(IntervalRecorder::new());

    let (l, r) = (Arc::clone(&lock), Arc::clone(&recorder));
    spawn_workers(WORKERS, move |_| {
        for _ in 0..ROUNDS {
            let mut guard = l.lock();
            let token = r.enter(Role::Exclusive);
            *guard += 1;
            r.exit(token);
        }
    });

    recorder.assert_exclusive();
    assert_eq!(recorder.max_concurrent(Role::Exclusive), 1);
    assert_eq!(recorder.len(), WORKERS * ROUNDS);
    assert_eq!(*lock.lock(), WORKERS * ROUNDS);
}

#[test]
fn test_blocking_mutex_sections_never_overlap() {
    let lock = Arc::new(BlockingMutex::new(Vec::new()));
    let recorder = Arc::new(IntervalRecorder::new());

    let (l, r) = (Arc::clone(&lock), Arc::clone(&recorder));
    spawn_workers(WORKERS, move |worker| {
        for round in 0..ROUNDS {
            let mut guard = l.lock();
            let token = r.enter(Role::Exclusive);
            guard.push((worker, round));
            r.exit(token);
        }
    });

    recorder.assert_exclusive();
    let pushed = lock.lock();
    assert_eq!(pushed.len(), WORKERS * ROUNDS);
    // 每个线程自己的写入保持程序顺序
    for worker in 0..WORKERS {
        let rounds: Vec<usize> = pushed
            .iter()
            .filter(|(w, _)| *w == worker)
            .map(|(_, r)| *r)
            .collect();
        assert_eq!(rounds, (0..ROUNDS).collect::<Vec<_>>());
    }
}

#[test]
fn test_deferred_guards_exclude_each_other() {
    let lock = Arc::new(BlockingMutex::new(0u64));
    let recorder = Arc::new(IntervalRecorder::new());

    let (l, r) = (Arc::clone(&lock), Arc::clone(&recorder));
    spawn_workers(WORKERS, move |_| {
        let mut deferred = DeferredGuard::new(&*l);
        for _ in 0..ROUNDS {
            if !deferred.try_lock() {
                deferred.lock();
            }
            let token = r.enter(Role::Exclusive);
            *deferred += 1;
            r.exit(token);
            deferred.unlock();
        }
    });

    recorder.assert_exclusive();
    assert_eq!(*lock.lock(), (WORKERS * ROUNDS) as u64);
}

#[test]
fn test_adopted_guard_hands_over_raw_lock() {
    let lock = BlockingMutex::new(String::from("raw"));
    let raw: &RawBlockingMutex = unsafe { lock.raw() };
    lock_api::RawMutex::lock(raw);
    assert!(raw.is_owned_by_current_thread());

    {
        let mut guard = unsafe { adopt_lock(&lock) };
        guard.push_str("+adopted");
    }
    assert!(!lock.is_locked());
    assert_eq!(*lock.lock(), "raw+adopted");
}

#[test]
fn test_blocked_lock_completes_after_release() {
    let lock = Arc::new(BlockingMutex::new(0));
    let guard = lock.lock();

    let l = Arc::clone(&lock);
    let waiter = std::thread::spawn(move || {
        run_with_timeout(Duration::from_secs(5), move || {
            *l.lock() += 1;
        })
    });
    std::thread::sleep(Duration::from_millis(20));
    drop(guard);

    assert_eq!(waiter.join().unwrap(), Some(()));
    assert_eq!(*lock.lock(), 1);
}
