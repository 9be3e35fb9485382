//! 自旋锁封装
//!
//! 提供对数据的互斥访问的自旋锁类型。

use crate::raw_spin_lock::RawSpinLock;

/// 提供对数据的互斥访问的自旋锁。
///
/// 它与 [`BlockingMutex`](crate::BlockingMutex) 都是 `lock_api::Mutex`，
/// 调用方只需替换类型即可在忙等与阻塞之间切换。
///
/// # 示例
/// ```
/// use ordsync::SpinLock;
///
/// let lock = SpinLock::new(0);
/// {
///     let mut guard = lock.lock(); // 获取锁
///     *guard += 1; // 访问和修改数据
/// } // 离开作用域，自动释放锁
/// assert_eq!(*lock.lock(), 1);
/// ```
///
/// # 注意
/// SpinLock 不是可重入的。当持有锁时，尝试再次获取锁将导致永久自旋。
/// 持有期间其他竞争者持续占用 CPU，因此应避免在持锁时执行耗时操作。
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// SpinLock 的 RAII 保护器，离开作用域时自动释放锁。
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_releases() {
        let lock = SpinLock::new(vec![1, 2]);
        {
            let mut guard = lock.lock();
            guard.push(3);
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_const_construction() {
        static COUNTER: SpinLock<u32> = SpinLock::new(0);
        *COUNTER.lock() += 1;
        assert!(*COUNTER.lock() >= 1);
    }

    #[test]
    fn test_counter_under_contention() {
        const THREADS: usize = 4;
        const ITERS: u64 = 10_000;

        let lock = Arc::new(SpinLock::new(0u64));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        // read-modify-write in two steps so a lost update would show
                        let mut guard = lock.lock();
                        let v = *guard;
                        *guard = v + 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), THREADS as u64 * ITERS);
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let lock = Arc::new(SpinLock::new(0));
        let l = Arc::clone(&lock);
        let result = thread::spawn(move || {
            let _guard = l.lock();
            panic!("worker failed inside the critical section");
        })
        .join();
        assert!(result.is_err());
        assert!(!lock.is_locked());
    }
}
