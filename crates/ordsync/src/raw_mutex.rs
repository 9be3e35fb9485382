//! 裸阻塞互斥锁
//!
//! 竞争时把线程交给操作系统挂起（`parking_lot` 的 parking 机制），
//! 并记录持有者线程，用于廉价地发现自死锁和非法解锁。

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use lock_api::{GuardNoSend, RawMutex, RawMutexTimed};

use crate::thread_id::{self, NO_THREAD};

/// 裸阻塞互斥锁
///
/// 拿不到锁的线程在内核调度器中睡眠而不是自旋，适合较长的临界区。
/// 守卫不可跨线程发送：解锁必须由加锁的线程完成。
pub struct RawBlockingMutex {
    inner: parking_lot::RawMutex,
    /// 持有者线程编号，无人持有时为 [`NO_THREAD`]
    owner: AtomicUsize,
}

impl RawBlockingMutex {
    /// 创建一个未加锁的实例。
    pub const fn new() -> Self {
        RawBlockingMutex {
            inner: <parking_lot::RawMutex as RawMutex>::INIT,
            owner: AtomicUsize::new(NO_THREAD),
        }
    }

    /// 当前线程是否持有该锁 (仅用于调试/测试)
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == thread_id::current()
    }

    // 只有持有者会写入自己的编号，所以读到自己的编号说明正在重入
    fn check_not_reentrant(&self, me: usize) {
        if self.owner.load(Ordering::Relaxed) == me {
            panic!("ordsync: BlockingMutex re-locked by its owning thread (self-deadlock)");
        }
    }

    fn mark_owned(&self, me: usize) {
        self.owner.store(me, Ordering::Relaxed);
    }
}

impl fmt::Debug for RawBlockingMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlockingMutex")
            .field("locked", &self.inner.is_locked())
            .field("owner", &self.owner.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for RawBlockingMutex {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawBlockingMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawBlockingMutex::new();

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        let me = thread_id::current();
        self.check_not_reentrant(me);
        self.inner.lock();
        self.mark_owned(me);
    }

    fn try_lock(&self) -> bool {
        let me = thread_id::current();
        if self.inner.try_lock() {
            self.mark_owned(me);
            true
        } else {
            false
        }
    }

    unsafe fn unlock(&self) {
        if !self.is_owned_by_current_thread() {
            panic!("ordsync: BlockingMutex unlocked by a thread that does not hold it");
        }
        self.owner.store(NO_THREAD, Ordering::Relaxed);
        // SAFETY: 上面的检查确认当前线程持有 inner
        unsafe { self.inner.unlock() };
    }

    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

unsafe impl RawMutexTimed for RawBlockingMutex {
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = thread_id::current();
        self.check_not_reentrant(me);
        if self.inner.try_lock_for(timeout) {
            self.mark_owned(me);
            true
        } else {
            false
        }
    }

    fn try_lock_until(&self, deadline: Instant) -> bool {
        let me = thread_id::current();
        self.check_not_reentrant(me);
        if self.inner.try_lock_until(deadline) {
            self.mark_owned(me);
            true
        } else {
            false
        }
    }
}
