//! 同步原语错误类型
//!
//! 只有可恢复的失败和可廉价检测的误用通过 [`SyncError`] 返回；
//! 不可失败的接口（裸解锁、未持有时解引用延迟守卫等）上的误用直接 panic。

use core::fmt;

/// 调用方违反的使用约定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// 同一把锁在一次多锁获取中出现了两次
    DuplicateLock,
    /// 参与多锁获取的守卫已经持有其锁
    AlreadyOwned,
}

/// 同步原语错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// 调用方违反了使用约定
    UsageViolation(Violation),
    /// 限时获取在期限内未能拿到锁
    ContentionTimeout,
    /// 一次性通道的发送端在发送前被丢弃
    Disconnected,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateLock => f.write_str("the same lock was requested twice"),
            Violation::AlreadyOwned => f.write_str("a guard already owns its lock"),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::UsageViolation(v) => write!(f, "usage violation: {v}"),
            SyncError::ContentionTimeout => f.write_str("timed out waiting for a contended lock"),
            SyncError::Disconnected => f.write_str("sender dropped without publishing"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<Violation> for SyncError {
    fn from(v: Violation) -> Self {
        SyncError::UsageViolation(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            SyncError::from(Violation::DuplicateLock).to_string(),
            "usage violation: the same lock was requested twice"
        );
        assert_eq!(
            SyncError::ContentionTimeout.to_string(),
            "timed out waiting for a contended lock"
        );
    }
}
