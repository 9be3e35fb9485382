//! 同步原语
//!
//! 提供底层的锁和同步原语，以及它们所依赖的内存顺序约定：
//! 自旋锁、阻塞互斥锁、无死锁的多锁获取、读写锁，以及基于 Acquire/Release 的 happens-before 通道。
//!
//! # 组件
//!
//! - [`AtomicFlag`] - 内存顺序可配置的 test-and-set 标志
//! - [`SpinLock`] - 基于 [`AtomicFlag`] 的忙等互斥
//! - [`BlockingMutex`] - 操作系统辅助的阻塞互斥，配合立即/接管/延迟三种守卫
//! - [`MultiLockAcquirer`] - 同时获取多把锁而不死锁
//! - [`ReaderWriterLock`] - 读者共享、写者独占
//! - [`Signal`] / [`oneshot`] / [`Broadcast`] / [`Pipeline`] - 无锁地发布普通数据
//! - [`SharedSlot`] - 可原子替换的共享指针
//!
//! # 统一的锁接口
//!
//! [`SpinLock`] 与 [`BlockingMutex`] 都是 [`lock_api::Mutex`]，区别只在裸锁类型。
//! 守卫、[`DeferredGuard`] 和多锁获取都对裸锁类型泛型，调用点替换类型即可切换实现。
//!
//! # 误用
//!
//! 重入、解锁未持有的锁等误用在能廉价发现的地方立即 panic；
//! 可失败的接口通过 [`SyncError`] 报告。死锁不在运行时检测，
//! 而是由 [`MultiLockAcquirer`] 从结构上避免。
//!
//! # 日志
//!
//! 通过 `log` 门面输出争用相关的事件（多锁重试、超时、写者等待等），
//! 本 crate 不安装任何 logger。

mod atomic_flag;
mod backoff;
pub mod config;
mod error;
mod hb;
mod multi_lock;
mod mutex;
mod raw_mutex;
mod raw_spin_lock;
mod rwlock;
mod shared_slot;
mod spin_lock;
mod thread_id;

pub use atomic_flag::AtomicFlag;
pub use backoff::{Backoff, WaitStrategy};
pub use error::{SyncError, Violation};
pub use hb::{Broadcast, Pipeline, Receiver, Sender, Signal, Stage, StageGuard, SyncMode, oneshot};
pub use multi_lock::{
    AcquireStrategy, LockId, Lockable, MultiLockAcquirer, lock_all, lock_all_ordered,
    scoped_lock, try_lock_all_for,
};
pub use mutex::{BlockingMutex, BlockingMutexGuard, DeferredGuard, adopt_lock, lock_timeout};
pub use raw_mutex::RawBlockingMutex;
pub use raw_spin_lock::RawSpinLock;
pub use rwlock::{RawReaderWriterLock, ReadGuard, ReaderWriterLock, RwState, SharedMap, WriteGuard};
pub use shared_slot::SharedSlot;
pub use spin_lock::{SpinLock, SpinLockGuard};
