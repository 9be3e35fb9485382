//! 原子标志
//!
//! 最小的 test-and-set 布尔单元，内存顺序由调用方指定，是 [`RawSpinLock`](crate::RawSpinLock) 的基础。

use core::sync::atomic::{AtomicBool, Ordering};

/// 原子 test-and-set 标志
///
/// 只有两种状态转换：`test_and_set` 把 `false` 变为 `true`；
/// `clear` 把 `true` 或 `false` 变为 `false`。不存在可观察的中间状态。
///
/// # 示例
/// ```
/// use core::sync::atomic::Ordering;
/// use ordsync::AtomicFlag;
///
/// let flag = AtomicFlag::new();
/// assert!(!flag.test_and_set(Ordering::Acquire));
/// assert!(flag.test_and_set(Ordering::Acquire));
/// flag.clear(Ordering::Release);
/// assert!(!flag.test(Ordering::Relaxed));
/// ```
#[derive(Debug, Default)]
pub struct AtomicFlag {
    flag: AtomicBool,
}

impl AtomicFlag {
    /// 创建一个处于清除状态的标志。
    pub const fn new() -> Self {
        AtomicFlag {
            flag: AtomicBool::new(false),
        }
    }

    /// 原子地置位，并返回置位之前的值。
    ///
    /// 接受任意读-改-写内存顺序。
    #[inline]
    pub fn test_and_set(&self, order: Ordering) -> bool {
        self.flag.swap(true, order)
    }

    /// 原子地清除。
    ///
    /// # Panics
    /// `order` 为 `Acquire` 或 `AcqRel` 时 panic：清除是一次纯写操作。
    #[inline]
    pub fn clear(&self, order: Ordering) {
        match order {
            Ordering::Acquire | Ordering::AcqRel => {
                panic!("ordsync: AtomicFlag::clear does not accept {order:?} ordering")
            }
            _ => self.flag.store(false, order),
        }
    }

    /// 原子地清除，并返回清除之前的值。
    ///
    /// 与 [`test_and_set`](Self::test_and_set) 对称，接受任意读-改-写内存顺序。
    #[inline]
    pub fn test_and_clear(&self, order: Ordering) -> bool {
        self.flag.swap(false, order)
    }

    /// 读取当前值（仅用于诊断/测试）
    ///
    /// # Panics
    /// `order` 为 `Release` 或 `AcqRel` 时 panic。
    #[inline]
    pub fn test(&self, order: Ordering) -> bool {
        match order {
            Ordering::Release | Ordering::AcqRel => {
                panic!("ordsync: AtomicFlag::test does not accept {order:?} ordering")
            }
            _ => self.flag.load(order),
        }
    }
}
