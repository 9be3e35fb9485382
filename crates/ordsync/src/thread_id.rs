//! 线程编号
//!
//! 为每个线程分配一个非零的数值编号，供锁记录持有者使用。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 表示“无人持有”的编号
pub(crate) const NO_THREAD: usize = 0;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CURRENT: usize = NEXT_ID.fetch_add(1, Ordering::Relaxed);
}

/// 当前线程的编号，首次调用时分配，之后不变。
pub(crate) fn current() -> usize {
    CURRENT.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_and_distinct() {
        let me = current();
        assert_ne!(me, NO_THREAD);
        assert_eq!(me, current());

        let other = std::thread::spawn(current).join().unwrap();
        assert_ne!(me, other);
    }
}
