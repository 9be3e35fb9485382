//! 多锁获取
//!
//! 两个线程以相反顺序获取同一对锁时会形成循环等待：A 持有 lock1 等 lock2，
//! B 持有 lock2 等 lock1。本模块提供两种互不依赖、都能避免循环等待的获取策略：
//!
//! - [`AcquireStrategy::Retry`]：全部获取或全部退回。先阻塞获取一把锁（此时不持有任何其他锁），
//!   再依次 `try_lock` 其余锁；任意一把失败就释放本轮已获取的全部锁，退避后从失败的那把锁重新开始。
//!   调用方无需约定全局加锁顺序。
//! - [`AcquireStrategy::GlobalOrder`]：按 [`LockId`] 排序后逐个阻塞加锁。
//!   所有调用点都经由同一排序，不可能出现环，但要求所有调用点都走这一协议。
//!
//! 绕开这两种策略、直接按调用方顺序嵌套 `lock()` 的代码仍然可能死锁。

use core::fmt;
use std::time::{Duration, Instant};

use lock_api::{Mutex, MutexGuard, RawMutex};

use crate::backoff::Backoff;
use crate::error::{SyncError, Violation};
use crate::mutex::DeferredGuard;

/// 锁的身份，取自底层互斥锁的地址
///
/// 守卫借用互斥锁期间互斥锁无法移动，因此在一次获取过程中保持稳定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(usize);

/// 可参与多锁获取的对象
pub trait Lockable {
    /// 底层锁的身份
    fn lock_id(&self) -> LockId;
    /// 当前是否持有锁
    fn owns_lock(&self) -> bool;
    /// 阻塞加锁
    fn lock(&mut self);
    /// 非阻塞加锁
    fn try_lock(&mut self) -> bool;
    /// 解锁
    fn unlock(&mut self);
}

impl<R: RawMutex, T: ?Sized> Lockable for DeferredGuard<'_, R, T> {
    fn lock_id(&self) -> LockId {
        LockId((self.mutex() as *const Mutex<R, T>).cast::<()>() as usize)
    }

    fn owns_lock(&self) -> bool {
        DeferredGuard::owns_lock(self)
    }

    fn lock(&mut self) {
        DeferredGuard::lock(self);
    }

    fn try_lock(&mut self) -> bool {
        DeferredGuard::try_lock(self)
    }

    fn unlock(&mut self) {
        DeferredGuard::unlock(self);
    }
}

/// 多锁获取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireStrategy {
    /// 全部获取或全部退回，失败后退避重试
    #[default]
    Retry,
    /// 按全局顺序逐个阻塞获取
    GlobalOrder,
}

/// 多锁获取协调器
///
/// 收集一组延迟守卫，然后一次性全部获取。获取成功后每把锁由各自的守卫负责释放。
///
/// # 示例
/// ```
/// use ordsync::{BlockingMutex, DeferredGuard, MultiLockAcquirer};
///
/// let a = BlockingMutex::new(1);
/// let b = BlockingMutex::new(2);
/// let mut ga = DeferredGuard::new(&a);
/// let mut gb = DeferredGuard::new(&b);
///
/// MultiLockAcquirer::default()
///     .with(&mut ga)
///     .with(&mut gb)
///     .acquire_all()
///     .unwrap();
/// assert_eq!(*ga + *gb, 3);
/// ```
#[derive(Default)]
pub struct MultiLockAcquirer<'a> {
    locks: Vec<&'a mut dyn Lockable>,
    strategy: AcquireStrategy,
}

impl<'a> MultiLockAcquirer<'a> {
    /// 使用指定策略创建一个空的协调器。
    pub fn new(strategy: AcquireStrategy) -> Self {
        MultiLockAcquirer {
            locks: Vec::new(),
            strategy,
        }
    }

    /// 加入一把待获取的锁。
    pub fn with(mut self, lock: &'a mut dyn Lockable) -> Self {
        self.locks.push(lock);
        self
    }

    /// 阻塞直到全部获取。
    pub fn acquire_all(mut self) -> Result<(), SyncError> {
        match self.strategy {
            AcquireStrategy::Retry => lock_all(&mut self.locks),
            AcquireStrategy::GlobalOrder => lock_all_ordered(&mut self.locks),
        }
    }

    /// 限时全部获取，超时时本轮已获取的锁全部释放。
    ///
    /// 限时获取总是使用重试策略。
    pub fn acquire_all_timeout(mut self, timeout: Duration) -> Result<(), SyncError> {
        try_lock_all_for(&mut self.locks, timeout)
    }
}

impl fmt::Debug for MultiLockAcquirer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiLockAcquirer")
            .field("locks", &self.locks.len())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// 以重试策略获取全部锁。
pub fn lock_all(locks: &mut [&mut dyn Lockable]) -> Result<(), SyncError> {
    acquire_with_retry(locks, None)
}

/// 以重试策略限时获取全部锁。
pub fn try_lock_all_for(
    locks: &mut [&mut dyn Lockable],
    timeout: Duration,
) -> Result<(), SyncError> {
    acquire_with_retry(locks, Some(Instant::now() + timeout))
}

/// 按 [`LockId`] 的全局顺序逐个阻塞获取全部锁。
pub fn lock_all_ordered(locks: &mut [&mut dyn Lockable]) -> Result<(), SyncError> {
    validate(locks)?;
    let mut order: Vec<usize> = (0..locks.len()).collect();
    order.sort_unstable_by_key(|&i| locks[i].lock_id());
    for i in order {
        locks[i].lock();
    }
    Ok(())
}

/// 以重试策略同时锁住两把（类型可以不同的）互斥锁。
///
/// 两个守卫各自在离开作用域时释放。
///
/// # 示例
/// ```
/// use ordsync::{scoped_lock, BlockingMutex, SpinLock};
///
/// let names = BlockingMutex::new(vec!["a"]);
/// let total = SpinLock::new(0usize);
/// let (names, mut total) = scoped_lock(&names, &total).unwrap();
/// *total += names.len();
/// ```
pub fn scoped_lock<'a, R1, A, R2, B>(
    a: &'a Mutex<R1, A>,
    b: &'a Mutex<R2, B>,
) -> Result<(MutexGuard<'a, R1, A>, MutexGuard<'a, R2, B>), SyncError>
where
    R1: RawMutex,
    R2: RawMutex,
    A: ?Sized,
    B: ?Sized,
{
    let mut ga = DeferredGuard::new(a);
    let mut gb = DeferredGuard::new(b);
    lock_all(&mut [&mut ga, &mut gb])?;
    match (ga.into_guard(), gb.into_guard()) {
        (Some(ga), Some(gb)) => Ok((ga, gb)),
        _ => unreachable!("lock_all returned Ok without owning every lock"),
    }
}

fn validate(locks: &[&mut dyn Lockable]) -> Result<(), SyncError> {
    let mut ids = Vec::with_capacity(locks.len());
    for lock in locks {
        if lock.owns_lock() {
            return Err(Violation::AlreadyOwned.into());
        }
        ids.push(lock.lock_id());
    }
    ids.sort_unstable();
    if ids.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(Violation::DuplicateLock.into());
    }
    Ok(())
}

fn acquire_with_retry(
    locks: &mut [&mut dyn Lockable],
    deadline: Option<Instant>,
) -> Result<(), SyncError> {
    validate(locks)?;
    if locks.is_empty() {
        return Ok(());
    }

    let backoff = Backoff::new();
    let mut first = 0;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;

        let holds_first = match deadline {
            None => {
                locks[first].lock();
                true
            }
            Some(_) => locks[first].try_lock(),
        };

        if holds_first {
            match try_lock_rest(locks, first) {
                None => {
                    if attempts > 1 {
                        log::debug!(
                            "ordsync: acquired {} locks after {} attempts",
                            locks.len(),
                            attempts
                        );
                    }
                    return Ok(());
                }
                Some(failed) => {
                    log::trace!(
                        "ordsync: multi-lock attempt {} backed off at lock {}",
                        attempts,
                        failed
                    );
                    first = failed;
                }
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                log::warn!(
                    "ordsync: gave up acquiring {} locks after {} attempts",
                    locks.len(),
                    attempts
                );
                return Err(SyncError::ContentionTimeout);
            }
        }
        backoff.snooze();
    }
}

/// 在持有 `locks[first]` 的前提下依次尝试其余的锁。
///
/// 全部成功返回 `None`；否则释放本轮获取的所有锁（包括 `first`），返回失败的下标。
fn try_lock_rest(locks: &mut [&mut dyn Lockable], first: usize) -> Option<usize> {
    let n = locks.len();
    for offset in 1..n {
        let i = (first + offset) % n;
        if !locks[i].try_lock() {
            for back in 0..offset {
                locks[(first + back) % n].unlock();
            }
            return Some(i);
        }
    }
    None
}
