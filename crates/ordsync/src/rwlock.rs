//! 读写锁
//!
//! 状态机 {Free, Shared(n≥1), Exclusive}：
//!
//! | 当前状态 | 事件 | 新状态 |
//! |---|---|---|
//! | Free | 读者获取 | Shared(1) |
//! | Shared(n) | 读者获取 | Shared(n+1) |
//! | Shared(n) | 读者释放 | Shared(n-1)，n = 1 时回到 Free |
//! | Free | 写者获取 | Exclusive |
//! | Exclusive | 写者释放 | Free |
//!
//! 写者在 Shared(n>0) 或 Exclusive 时阻塞；读者只在 Exclusive 时阻塞，
//! 可以直接加入已有的 Shared 状态。
//!
//! # 公平性
//!
//! 不防止写者饥饿：源源不断的读者可以让写者无限期等待。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lock_api::{GuardSend, RawRwLock, RawRwLockTimed};
use parking_lot::{Condvar, Mutex};

/// 读写锁状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwState {
    /// 无人持有
    Free,
    /// 被 n 个读者共享持有
    Shared(usize),
    /// 被一个写者独占
    Exclusive,
}

#[derive(Debug)]
struct Holders {
    readers: usize,
    writer: bool,
}

impl Holders {
    fn state(&self) -> RwState {
        match (self.writer, self.readers) {
            (true, _) => RwState::Exclusive,
            (false, 0) => RwState::Free,
            (false, n) => RwState::Shared(n),
        }
    }
}

/// 裸读写锁
///
/// 持有者计数放在一把 `parking_lot` 互斥锁里，等待者挂在条件变量上睡眠。
#[derive(Debug)]
pub struct RawReaderWriterLock {
    holders: Mutex<Holders>,
    changed: Condvar,
}

impl RawReaderWriterLock {
    /// 创建一个处于 Free 状态的实例。
    pub const fn new() -> Self {
        RawReaderWriterLock {
            holders: parking_lot::const_mutex(Holders {
                readers: 0,
                writer: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// 当前状态 (仅用于调试/测试)
    pub fn state(&self) -> RwState {
        self.holders.lock().state()
    }

    /// 当前读者数量 (仅用于调试/测试)
    pub fn reader_count(&self) -> usize {
        self.holders.lock().readers
    }

    fn acquire_shared(&self, deadline: Option<Instant>) -> bool {
        let mut holders = self.holders.lock();
        while holders.writer {
            match deadline {
                None => self.changed.wait(&mut holders),
                Some(deadline) => {
                    if self.changed.wait_until(&mut holders, deadline).timed_out()
                        && holders.writer
                    {
                        return false;
                    }
                }
            }
        }
        holders.readers += 1;
        true
    }

    fn acquire_exclusive(&self, deadline: Option<Instant>) -> bool {
        let mut holders = self.holders.lock();
        if holders.writer || holders.readers > 0 {
            log::debug!("ordsync: writer waiting, lock state {:?}", holders.state());
        }
        while holders.writer || holders.readers > 0 {
            match deadline {
                None => self.changed.wait(&mut holders),
                Some(deadline) => {
                    if self.changed.wait_until(&mut holders, deadline).timed_out()
                        && (holders.writer || holders.readers > 0)
                    {
                        return false;
                    }
                }
            }
        }
        holders.writer = true;
        true
    }
}

impl Default for RawReaderWriterLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawRwLock for RawReaderWriterLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawReaderWriterLock::new();

    // 不记录持有者，守卫可以在其他线程释放
    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        self.acquire_shared(None);
    }

    fn try_lock_shared(&self) -> bool {
        let mut holders = self.holders.lock();
        if holders.writer {
            return false;
        }
        holders.readers += 1;
        true
    }

    unsafe fn unlock_shared(&self) {
        let mut holders = self.holders.lock();
        if holders.readers == 0 {
            panic!("ordsync: ReaderWriterLock shared unlock without a reader holding it");
        }
        holders.readers -= 1;
        if holders.readers == 0 {
            // 只有写者会在 Shared 状态下等待
            self.changed.notify_all();
        }
    }

    fn lock_exclusive(&self) {
        self.acquire_exclusive(None);
    }

    fn try_lock_exclusive(&self) -> bool {
        let mut holders = self.holders.lock();
        if holders.writer || holders.readers > 0 {
            return false;
        }
        holders.writer = true;
        true
    }

    unsafe fn unlock_exclusive(&self) {
        let mut holders = self.holders.lock();
        if !holders.writer {
            panic!("ordsync: ReaderWriterLock exclusive unlock without a writer holding it");
        }
        holders.writer = false;
        self.changed.notify_all();
    }

    fn is_locked(&self) -> bool {
        self.state() != RwState::Free
    }

    fn is_locked_exclusive(&self) -> bool {
        self.state() == RwState::Exclusive
    }
}

unsafe impl RawRwLockTimed for RawReaderWriterLock {
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_shared_for(&self, timeout: Duration) -> bool {
        self.acquire_shared(Some(Instant::now() + timeout))
    }

    fn try_lock_shared_until(&self, deadline: Instant) -> bool {
        self.acquire_shared(Some(deadline))
    }

    fn try_lock_exclusive_for(&self, timeout: Duration) -> bool {
        self.acquire_exclusive(Some(Instant::now() + timeout))
    }

    fn try_lock_exclusive_until(&self, deadline: Instant) -> bool {
        self.acquire_exclusive(Some(deadline))
    }
}

/// 读写锁：多个读者并发，写者独占
///
/// # 示例
/// ```
/// use ordsync::ReaderWriterLock;
///
/// let lock = ReaderWriterLock::new(5);
/// {
///     let r1 = lock.read();
///     let r2 = lock.read();
///     assert_eq!(*r1 + *r2, 10);
///     assert!(lock.try_write().is_none());
/// }
/// *lock.write() += 1;
/// assert_eq!(*lock.read(), 6);
/// ```
pub type ReaderWriterLock<T> = lock_api::RwLock<RawReaderWriterLock, T>;

/// 读守卫
pub type ReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawReaderWriterLock, T>;

/// 写守卫
pub type WriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawReaderWriterLock, T>;

/// 读写锁保护的共享映射
///
/// 克隆得到的句柄指向同一张表。读操作只使用不会插入的查找，
/// 读守卫只提供 `&HashMap`，因此读者不可能修改表。
#[derive(Debug)]
pub struct SharedMap<K, V> {
    inner: Arc<ReaderWriterLock<HashMap<K, V>>>,
}

impl<K, V> Clone for SharedMap<K, V> {
    fn clone(&self) -> Self {
        SharedMap {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash, V> Default for SharedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for SharedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SharedMap {
            inner: Arc::new(ReaderWriterLock::new(iter.into_iter().collect())),
        }
    }
}

impl<K: Eq + Hash, V> SharedMap<K, V> {
    /// 创建一张空表。
    pub fn new() -> Self {
        SharedMap {
            inner: Arc::new(ReaderWriterLock::new(HashMap::new())),
        }
    }

    /// 共享持有下查找，缺失时返回 `None` 而不插入任何条目。
    pub fn lookup(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().get(key).cloned()
    }

    /// 是否存在该键
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// 独占持有下插入或覆盖，返回旧值。
    pub fn upsert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// 独占持有下删除。
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// 底层读写锁，用于需要跨多次访问保持同一持有状态的场景
    pub fn lock(&self) -> &ReaderWriterLock<HashMap<K, V>> {
        &self.inner
    }
}
