//! 退避与等待策略
//!
//! 自旋锁、信号等待和多锁重试都属于忙等循环。[`Backoff`] 让每次失败后的等待
//! 逐步加长：先执行指数增长的自旋提示，再让出 CPU。

use core::cell::Cell;
use core::hint;
use std::thread;
use std::time::Duration;

use crate::config::{DEFAULT_SLEEP, SPIN_LIMIT, YIELD_LIMIT};

/// 指数退避器
///
/// 不可在线程间共享，每个等待循环各自创建一个。
///
/// # 示例
/// ```
/// use ordsync::Backoff;
///
/// let backoff = Backoff::new();
/// for _ in 0..4 {
///     backoff.snooze();
/// }
/// ```
#[derive(Debug, Default)]
pub struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    /// 创建一个处于初始阶段的退避器。
    pub const fn new() -> Self {
        Backoff { step: Cell::new(0) }
    }

    /// 回到初始阶段。
    pub fn reset(&self) {
        self.step.set(0);
    }

    /// 只自旋、从不让出 CPU 的退避。
    ///
    /// 用于自旋锁这类临界区很短的场景。
    pub fn spin(&self) {
        let step = self.step.get().min(SPIN_LIMIT);
        for _ in 0..1u32 << step {
            hint::spin_loop();
        }
        if self.step.get() <= SPIN_LIMIT {
            self.step.set(self.step.get() + 1);
        }
    }

    /// 先自旋，超过 [`SPIN_LIMIT`] 后改为 `thread::yield_now()`。
    pub fn snooze(&self) {
        let step = self.step.get();
        if step <= SPIN_LIMIT {
            for _ in 0..1u32 << step {
                hint::spin_loop();
            }
        } else {
            if step == SPIN_LIMIT + 1 {
                log::trace!("ordsync: backoff escalated to yielding");
            }
            thread::yield_now();
        }
        if step <= YIELD_LIMIT {
            self.step.set(step + 1);
        }
    }

    /// 退避是否已经走完所有阶段
    pub fn is_completed(&self) -> bool {
        self.step.get() > YIELD_LIMIT
    }
}

/// 忙等循环在两次轮询之间的等待方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// 只执行自旋提示
    Spin,
    /// 自旋后让出 CPU
    #[default]
    Yield,
    /// 每次轮询之间休眠固定时长
    Sleep(Duration),
}

impl WaitStrategy {
    /// 以 [`DEFAULT_SLEEP`] 为间隔的休眠策略
    pub const fn sleep() -> Self {
        WaitStrategy::Sleep(DEFAULT_SLEEP)
    }

    /// 执行一次等待。
    pub fn pause(&self, backoff: &Backoff) {
        match self {
            WaitStrategy::Spin => backoff.spin(),
            WaitStrategy::Yield => backoff.snooze(),
            WaitStrategy::Sleep(interval) => thread::sleep(*interval),
        }
    }
}
