//! 测试支持 crate
//!
//! 提供并发测试用的外部工具：看门狗、工作线程启动器、临界区区间记录和日志捕获。

pub mod interval;
pub mod logger;

use std::panic;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

pub use interval::{Interval, IntervalRecorder, Role};
pub use logger::{CaptureLogger, CapturedRecord};

/// 在看门狗下运行 `f`。
///
/// 在 `timeout` 内完成则返回结果；超时返回 `None`，此时执行 `f` 的线程被放弃
/// （它可能已经死锁，无法回收）。`f` 内部的 panic 原样传播。
pub fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(timeout) {
        Ok(value) => {
            let _ = handle.join();
            Some(value)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match handle.join() {
            Err(payload) => panic::resume_unwind(payload),
            Ok(()) => None,
        },
        Err(mpsc::RecvTimeoutError::Timeout) => None,
    }
}

/// 启动 `n` 个工作线程，它们在同一个栅栏处同时开始执行 `f(worker_index)`。
///
/// 按序号返回每个线程的结果；任一线程 panic 时在调用线程中重新抛出。
pub fn spawn_workers<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let start = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|index| {
            let f = Arc::clone(&f);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                f(index)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
        .collect()
}
