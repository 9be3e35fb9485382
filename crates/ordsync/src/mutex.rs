//! 阻塞互斥锁与作用域守卫
//!
//! 三种获取方式：
//!
//! - **立即获取**：`mutex.lock()` 返回的 [`lock_api::MutexGuard`]，构造即加锁，析构即解锁。
//! - **接管已持有的锁**：[`adopt_lock`]，调用方保证已经持有裸锁，守卫只负责析构时解锁。
//! - **延迟获取**：[`DeferredGuard`]，构造时不加锁，稍后显式加锁（通常交给
//!   [`MultiLockAcquirer`](crate::MultiLockAcquirer)），析构时若持有则解锁。
//!
//! 这些守卫对任意 `R: RawMutex` 泛型，因此同样适用于 [`SpinLock`](crate::SpinLock)。

use core::fmt;
use core::ops::{Deref, DerefMut};
use std::time::Duration;

use lock_api::{Mutex, MutexGuard, RawMutex, RawMutexTimed};

use crate::error::SyncError;
use crate::raw_mutex::RawBlockingMutex;

/// 操作系统辅助的阻塞互斥锁
///
/// # 示例
/// ```
/// use ordsync::BlockingMutex;
///
/// let mutex = BlockingMutex::new(String::new());
/// mutex.lock().push_str("done");
/// assert_eq!(*mutex.lock(), "done");
/// ```
pub type BlockingMutex<T> = Mutex<RawBlockingMutex, T>;

/// BlockingMutex 的 RAII 保护器
pub type BlockingMutexGuard<'a, T> = MutexGuard<'a, RawBlockingMutex, T>;

/// 为已经持有的锁创建守卫，不再次加锁。
///
/// # Safety
/// 调用线程必须已经持有 `mutex` 的裸锁，且没有其他守卫会释放它。
pub unsafe fn adopt_lock<R: RawMutex, T: ?Sized>(mutex: &Mutex<R, T>) -> MutexGuard<'_, R, T> {
    // SAFETY: 由调用方保证锁已被当前线程持有
    unsafe { mutex.make_guard_unchecked() }
}

/// 限时获取：超时返回 [`SyncError::ContentionTimeout`]。
pub fn lock_timeout<R, T>(
    mutex: &Mutex<R, T>,
    timeout: Duration,
) -> Result<MutexGuard<'_, R, T>, SyncError>
where
    R: RawMutexTimed<Duration = Duration>,
    T: ?Sized,
{
    mutex
        .try_lock_for(timeout)
        .ok_or(SyncError::ContentionTimeout)
}

/// 延迟获取的守卫
///
/// 构造时不加锁。持有期间可以解引用访问数据；未持有时解引用会 panic。
/// 析构时如果持有锁则自动释放。
pub struct DeferredGuard<'a, R: RawMutex, T: ?Sized> {
    mutex: &'a Mutex<R, T>,
    guard: Option<MutexGuard<'a, R, T>>,
}

impl<'a, R: RawMutex, T: ?Sized> DeferredGuard<'a, R, T> {
    /// 关联到 `mutex`，但不加锁。
    pub fn new(mutex: &'a Mutex<R, T>) -> Self {
        DeferredGuard { mutex, guard: None }
    }

    /// 接管一把已经持有的锁。
    ///
    /// # Safety
    /// 与 [`adopt_lock`] 相同。
    pub unsafe fn adopt(mutex: &'a Mutex<R, T>) -> Self {
        // SAFETY: 由调用方保证
        let guard = unsafe { adopt_lock(mutex) };
        DeferredGuard {
            mutex,
            guard: Some(guard),
        }
    }

    /// 阻塞直到加锁成功。
    ///
    /// # Panics
    /// 已经持有时 panic。
    pub fn lock(&mut self) {
        self.assert_not_owned();
        self.guard = Some(self.mutex.lock());
    }

    /// 尝试加锁，不阻塞。
    ///
    /// # Panics
    /// 已经持有时 panic。
    pub fn try_lock(&mut self) -> bool {
        self.assert_not_owned();
        self.guard = self.mutex.try_lock();
        self.guard.is_some()
    }

    /// 释放锁，守卫仍然关联在同一把锁上，可以再次加锁。
    ///
    /// # Panics
    /// 未持有时 panic。
    pub fn unlock(&mut self) {
        if self.guard.take().is_none() {
            panic!("ordsync: DeferredGuard::unlock called without owning the lock");
        }
    }

    /// 是否持有锁
    pub fn owns_lock(&self) -> bool {
        self.guard.is_some()
    }

    /// 关联的互斥锁
    pub fn mutex(&self) -> &'a Mutex<R, T> {
        self.mutex
    }

    /// 转换为普通守卫；未持有时返回 `None`。
    pub fn into_guard(mut self) -> Option<MutexGuard<'a, R, T>> {
        self.guard.take()
    }

    fn assert_not_owned(&self) {
        if self.guard.is_some() {
            panic!("ordsync: DeferredGuard already owns its lock");
        }
    }
}

impl<R: RawMutex, T: ?Sized> Deref for DeferredGuard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.guard {
            Some(guard) => guard,
            None => panic!("ordsync: DeferredGuard dereferenced without owning the lock"),
        }
    }
}

impl<R: RawMutex, T: ?Sized> DerefMut for DeferredGuard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => guard,
            None => panic!("ordsync: DeferredGuard dereferenced without owning the lock"),
        }
    }
}

impl<R: RawMutex, T: ?Sized> fmt::Debug for DeferredGuard<'_, R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredGuard")
            .field("owns_lock", &self.owns_lock())
            .finish()
    }
}
