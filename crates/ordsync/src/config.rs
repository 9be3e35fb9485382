//! 配置常量
//!
//! 所有忙等循环共用的退避参数。

use std::time::Duration;

/// 退避的自旋阶段上限
///
/// 第 `n` 步执行 `1 << n` 次自旋提示，超过该步数后改为让出 CPU。
pub const SPIN_LIMIT: u32 = 6;

/// 退避的让出阶段上限
///
/// 超过该步数后 [`Backoff::is_completed`](crate::Backoff::is_completed) 返回 `true`，
/// 调用方应考虑改用阻塞等待。
pub const YIELD_LIMIT: u32 = 10;

/// 休眠等待策略的默认轮询间隔
pub const DEFAULT_SLEEP: Duration = Duration::from_millis(5);
