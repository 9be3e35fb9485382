//! 可原子替换的共享指针
//!
//! 多个线程并发地读取和替换同一个 `Arc<T>`。临界区只做引用计数操作，
//! 因此用 [`SpinLock`] 保护；旧值在锁外析构。

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::spin_lock::SpinLock;

/// 可原子替换的 `Arc<T>` 单元
///
/// # 示例
/// ```
/// use std::sync::Arc;
/// use ordsync::SharedSlot;
///
/// let slot = SharedSlot::new(Arc::new(2023));
/// let before = slot.load();
/// slot.store(Arc::new(2024));
/// assert_eq!(*before, 2023);
/// assert_eq!(*slot.load(), 2024);
/// ```
pub struct SharedSlot<T> {
    slot: SpinLock<Arc<T>>,
}

impl<T> SharedSlot<T> {
    /// 以初值创建。
    pub fn new(value: Arc<T>) -> Self {
        SharedSlot {
            slot: SpinLock::new(value),
        }
    }

    /// 读取当前值的一个引用。
    pub fn load(&self) -> Arc<T> {
        self.slot.lock().clone()
    }

    /// 替换为新值。
    pub fn store(&self, value: Arc<T>) {
        drop(self.swap(value));
    }

    /// 替换为新值并返回旧值。
    pub fn swap(&self, value: Arc<T>) -> Arc<T> {
        let mut guard = self.slot.lock();
        mem::replace(&mut *guard, value)
    }
}

impl<T: Default> Default for SharedSlot<T> {
    fn default() -> Self {
        Self::new(Arc::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedSlot").field(&self.load()).finish()
    }
}
