//! 裸自旋锁实现
//!
//! 基于 [`AtomicFlag`] 的忙等互斥，以 `lock_api::RawMutex` 的形式暴露，
//! 从而与阻塞互斥锁共用同一套守卫接口。

use core::sync::atomic::Ordering;

use lock_api::{GuardSend, RawMutex};

use crate::atomic_flag::AtomicFlag;
use crate::backoff::Backoff;

/// 裸自旋锁，只包含一个 [`AtomicFlag`]。
///
/// 加锁时以 Acquire 顺序反复 test-and-set，解锁时以 Release 顺序清除；
/// 解锁一把未被持有的锁会 panic。
/// 这对 Acquire/Release 在前一个持有者的解锁与下一个持有者的加锁之间建立
/// happens-before 关系：临界区内的所有写入对下一个持有者可见。
///
/// 不可重入 (即不能在持有时再次调用 `lock()`，否则永久自旋)。
/// 不保证公平：极端调度下某个线程可能一直抢不到锁，只适合很短的临界区。
///
/// # 示例
/// ```
/// use lock_api::RawMutex;
/// use ordsync::RawSpinLock;
///
/// let lock = RawSpinLock::new();
/// lock.lock();
/// assert!(!lock.try_lock());
/// unsafe { lock.unlock() };
/// assert!(lock.try_lock());
/// ```
#[derive(Debug)]
pub struct RawSpinLock {
    flag: AtomicFlag,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            flag: AtomicFlag::new(),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 自旋锁不记录持有者，守卫可以在其他线程释放
    type GuardMarker = GuardSend;

    fn lock(&self) {
        let backoff = Backoff::new();
        while self.flag.test_and_set(Ordering::Acquire) {
            // 只读等待，避免在锁被占用期间反复争抢缓存行
            while self.flag.test(Ordering::Relaxed) {
                backoff.spin();
            }
        }
    }

    fn try_lock(&self) -> bool {
        !self.flag.test_and_set(Ordering::Acquire)
    }

    unsafe fn unlock(&self) {
        // 未持有时标志本来就是清除状态，先清除再报告不会破坏锁
        if !self.flag.test_and_clear(Ordering::Release) {
            panic!("ordsync: RawSpinLock unlocked while not held");
        }
    }

    /// 检查锁是否被占用 (仅用于调试/测试)
    fn is_locked(&self) -> bool {
        self.flag.test(Ordering::Relaxed)
    }
}
