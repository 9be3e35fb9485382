//! 临界区区间记录
//!
//! 用一个全局单调的逻辑时钟给每次进入/离开临界区打时间戳，
//! 事后检查区间是否按角色要求互斥。

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// 临界区中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 共享访问者，彼此可以重叠
    Shared,
    /// 独占访问者，不与任何其他区间重叠
    Exclusive,
}

/// 一段已结束的临界区
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// 角色
    pub role: Role,
    /// 进入时刻
    pub start: u64,
    /// 离开时刻
    pub end: u64,
}

impl Interval {
    fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// 进入临界区时得到的凭据，离开时交还
#[derive(Debug)]
#[must_use = "pass the token to IntervalRecorder::exit"]
pub struct EnterToken {
    role: Role,
    start: u64,
}

/// 区间记录器
#[derive(Debug, Default)]
pub struct IntervalRecorder {
    clock: AtomicU64,
    intervals: Mutex<Vec<Interval>>,
}

impl IntervalRecorder {
    /// 创建空的记录器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 在持锁之后调用，记录进入时刻。
    pub fn enter(&self, role: Role) -> EnterToken {
        let start = self.clock.fetch_add(1, Ordering::SeqCst);
        EnterToken { role, start }
    }

    /// 在释放锁之前调用，记录离开时刻。
    pub fn exit(&self, token: EnterToken) {
        let end = self.clock.fetch_add(1, Ordering::SeqCst);
        self.intervals.lock().push(Interval {
            role: token.role,
            start: token.start,
            end,
        });
    }

    /// 已记录区间的快照。
    pub fn intervals(&self) -> Vec<Interval> {
        self.intervals.lock().clone()
    }

    /// 独占区间不与任何其他区间重叠，否则 panic 并给出冲突的两段。
    pub fn assert_exclusive(&self) {
        let intervals = self.intervals();
        for (i, a) in intervals.iter().enumerate() {
            for b in &intervals[i + 1..] {
                let conflict = a.role == Role::Exclusive || b.role == Role::Exclusive;
                if conflict && a.overlaps(b) {
                    panic!("overlapping critical sections: {a:?} and {b:?}");
                }
            }
        }
    }

    /// 给定角色同时处于临界区的最大数量。
    pub fn max_concurrent(&self, role: Role) -> usize {
        let mut events: Vec<(u64, i64)> = self
            .intervals()
            .iter()
            .filter(|iv| iv.role == role)
            .flat_map(|iv| [(iv.start, 1), (iv.end, -1)])
            .collect();
        // 时间戳唯一，排序即可得到事件顺序
        events.sort_unstable();
        let mut current = 0i64;
        let mut max = 0i64;
        for (_, delta) in events {
            current += delta;
            max = max.max(current);
        }
        max as usize
    }

    /// 已记录的区间数。
    pub fn len(&self) -> usize {
        self.intervals.lock().len()
    }

    /// 是否尚无记录。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
