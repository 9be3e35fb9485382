//! Happens-before 通道
//!
//! 用裸原子操作把普通（非原子）数据从生产者发布给消费者，不需要锁。
//!
//! 发布端先写普通数据，再对一个“就绪”原子变量做一次 Release 写；
//! 消费端对同一变量做 Acquire 读，观察到发布值之后才读取普通数据。
//! 发布端在 Release 之前的所有写入，对消费端在匹配的 Acquire 之后的所有读取可见。
//!
//! 这种关系可以传递：A 通过一对 Release/Acquire 先于 B，B 再通过另一对先于 C，
//! 则 A 先于 C，即使 A 与 C 从未接触同一个原子变量。[`Pipeline`] 就建立在这一点上。
//!
//! # 组件
//!
//! - [`Signal`] - 独立的就绪标志
//! - [`oneshot`] - 单生产者/单消费者的一次性值传递
//! - [`Broadcast`] - 通过原子指针发布一次、任意多个读者共享读取
//! - [`Pipeline`] - 多级接力，每一级只与相邻两级共享原子变量

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering, fence};
use std::sync::Arc;
use std::thread;

use crate::backoff::{Backoff, WaitStrategy};
use crate::error::SyncError;

/// 建立 happens-before 关系的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// 发布端 Release 写，消费端 Acquire 读
    #[default]
    AcquireRelease,
    /// 发布端 Release 栅栏 + Relaxed 写，消费端 Relaxed 读 + Acquire 栅栏
    Fence,
}

impl SyncMode {
    #[inline]
    fn publish_flag(self, flag: &AtomicBool) {
        match self {
            SyncMode::AcquireRelease => flag.store(true, Ordering::Release),
            SyncMode::Fence => {
                fence(Ordering::Release);
                flag.store(true, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    fn observe_flag(self, flag: &AtomicBool) -> bool {
        match self {
            SyncMode::AcquireRelease => flag.load(Ordering::Acquire),
            SyncMode::Fence => {
                let raised = flag.load(Ordering::Relaxed);
                if raised {
                    fence(Ordering::Acquire);
                }
                raised
            }
        }
    }
}

/// 就绪标志
///
/// # 示例
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use ordsync::{Signal, SyncMode};
///
/// let signal = Arc::new(Signal::new(SyncMode::AcquireRelease));
/// let s = Arc::clone(&signal);
/// let waiter = thread::spawn(move || s.wait());
/// signal.raise();
/// waiter.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Signal {
    raised: AtomicBool,
    mode: SyncMode,
}

impl Signal {
    /// 创建一个未触发的信号。
    pub const fn new(mode: SyncMode) -> Self {
        Signal {
            raised: AtomicBool::new(false),
            mode,
        }
    }

    /// 发布。此前的所有写入对观察到该信号的线程可见。重复触发无副作用。
    pub fn raise(&self) {
        self.mode.publish_flag(&self.raised);
    }

    /// 是否已触发；返回 `true` 时已与触发方同步。
    pub fn is_raised(&self) -> bool {
        self.mode.observe_flag(&self.raised)
    }

    /// 等待触发，轮询之间自旋后让出 CPU。
    pub fn wait(&self) {
        self.wait_with(WaitStrategy::Yield);
    }

    /// 按指定策略等待触发。
    pub fn wait_with(&self, strategy: WaitStrategy) {
        let backoff = Backoff::new();
        while !self.is_raised() {
            strategy.pause(&backoff);
        }
    }
}

struct OneshotInner<T> {
    value: UnsafeCell<Option<T>>,
    ready: Signal,
    sender_gone: AtomicBool,
}

// SAFETY: value 只在发布前由发送端写、在观察到发布后由唯一的接收端读
unsafe impl<T: Send> Sync for OneshotInner<T> {}

/// 创建一次性通道。
///
/// # 示例
/// ```
/// use std::thread;
/// use ordsync::{oneshot, SyncMode};
///
/// let (tx, rx) = oneshot(SyncMode::Fence);
/// thread::spawn(move || tx.send(vec![1, 0, 3]));
/// assert_eq!(rx.recv().unwrap(), vec![1, 0, 3]);
/// ```
pub fn oneshot<T>(mode: SyncMode) -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(OneshotInner {
        value: UnsafeCell::new(None),
        ready: Signal::new(mode),
        sender_gone: AtomicBool::new(false),
    });
    (
        Sender {
            inner: Arc::clone(&inner),
        },
        Receiver {
            inner,
            strategy: WaitStrategy::Yield,
        },
    )
}

/// 一次性通道的发送端
pub struct Sender<T> {
    inner: Arc<OneshotInner<T>>,
}

impl<T> Sender<T> {
    /// 写入值并发布。发送端随之被消耗，发布之后不可能再写。
    pub fn send(self, value: T) {
        // SAFETY: 发布之前接收端不会访问 value，且发送端唯一
        unsafe { *self.inner.value.get() = Some(value) };
        self.inner.ready.raise();
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.inner.sender_gone.store(true, Ordering::Release);
    }
}

/// 一次性通道的接收端
pub struct Receiver<T> {
    inner: Arc<OneshotInner<T>>,
    strategy: WaitStrategy,
}

impl<T> Receiver<T> {
    /// 设置等待策略。
    pub fn with_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// 等待并取出值。发送端未发送就被丢弃时返回 [`SyncError::Disconnected`]。
    pub fn recv(mut self) -> Result<T, SyncError> {
        let backoff = Backoff::new();
        loop {
            if let Some(value) = self.try_recv() {
                return Ok(value);
            }
            if self.inner.sender_gone.load(Ordering::Acquire) {
                // 发送端在置 sender_gone 之前已经发布，此处必然能观察到
                return match self.try_recv() {
                    Some(value) => Ok(value),
                    None => {
                        log::debug!("ordsync: oneshot sender dropped without sending");
                        Err(SyncError::Disconnected)
                    }
                };
            }
            self.strategy.pause(&backoff);
        }
    }

    /// 已发布则取出值，否则立即返回 `None`。
    pub fn try_recv(&mut self) -> Option<T> {
        if !self.inner.ready.is_raised() {
            return None;
        }
        // SAFETY: 已观察到发布，发送端不会再写；接收端唯一
        unsafe { (*self.inner.value.get()).take() }
    }
}

/// 发布一次、多个读者共享读取的单元
///
/// 值被装箱后通过一次原子指针写发布；读者观察到非空指针后即可读取。
///
/// # 示例
/// ```
/// use ordsync::{Broadcast, SyncMode};
///
/// let cell = Broadcast::new(SyncMode::AcquireRelease);
/// assert!(cell.get().is_none());
/// cell.publish(String::from("C++11")).unwrap();
/// assert_eq!(cell.publish(String::from("again")), Err(String::from("again")));
/// assert_eq!(cell.wait(), "C++11");
/// ```
pub struct Broadcast<T> {
    ptr: AtomicPtr<T>,
    mode: SyncMode,
    _owns: PhantomData<*const T>,
}

// SAFETY: 发布把 T 从发布线程移交给单元，读者只获得 &T
unsafe impl<T: Send> Send for Broadcast<T> {}
unsafe impl<T: Send + Sync> Sync for Broadcast<T> {}

impl<T> Broadcast<T> {
    /// 创建一个尚未发布的单元。
    pub const fn new(mode: SyncMode) -> Self {
        Broadcast {
            ptr: AtomicPtr::new(ptr::null_mut()),
            mode,
            _owns: PhantomData,
        }
    }

    /// 发布值。已经发布过时原样退回。
    pub fn publish(&self, value: T) -> Result<(), T> {
        let new = Box::into_raw(Box::new(value));
        let success = match self.mode {
            SyncMode::AcquireRelease => Ordering::Release,
            SyncMode::Fence => {
                fence(Ordering::Release);
                Ordering::Relaxed
            }
        };
        match self
            .ptr
            .compare_exchange(ptr::null_mut(), new, success, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            // SAFETY: new 来自上面的 Box::into_raw，且从未被发布
            Err(_) => Err(*unsafe { Box::from_raw(new) }),
        }
    }

    /// 已发布则返回值的引用。
    pub fn get(&self) -> Option<&T> {
        let p = match self.mode {
            SyncMode::AcquireRelease => self.ptr.load(Ordering::Acquire),
            SyncMode::Fence => {
                let p = self.ptr.load(Ordering::Relaxed);
                if !p.is_null() {
                    fence(Ordering::Acquire);
                }
                p
            }
        };
        // SAFETY: 非空指针来自已发布的 Box，发布后不再修改，存活到单元析构
        unsafe { p.as_ref() }
    }

    /// 等待发布。
    pub fn wait(&self) -> &T {
        self.wait_with(WaitStrategy::Yield)
    }

    /// 按指定策略等待发布。
    pub fn wait_with(&self, strategy: WaitStrategy) -> &T {
        let backoff = Backoff::new();
        loop {
            if let Some(value) = self.get() {
                return value;
            }
            strategy.pause(&backoff);
        }
    }
}

impl<T> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new(SyncMode::default())
    }
}

impl<T> Drop for Broadcast<T> {
    fn drop(&mut self) {
        let p = *self.ptr.get_mut();
        if !p.is_null() {
            // SAFETY: 独占访问，指针来自已发布的 Box
            drop(unsafe { Box::from_raw(p) });
        }
    }
}

/// 相邻两级之间的交接点
struct Link {
    /// 本级离开后触发
    done: Signal,
    /// 本级未正常完成（未进入就被丢弃，或在持有负载时 panic）
    abandoned: AtomicBool,
}

struct PipelineShared<T> {
    value: UnsafeCell<Option<T>>,
    /// `links[i]` 由第 i 级写、第 i+1 级读
    links: Box<[Link]>,
}

// SAFETY: 任一时刻只有已观察到前一级完成、且尚未完成的那一级访问 value
unsafe impl<T: Send> Sync for PipelineShared<T> {}

/// 多级接力
///
/// 第 i 级等待 `links[i-1]`，离开时触发 `links[i]`，不接触其他任何交接点。
/// 每一级独占访问负载，并看到之前所有级的写入。
///
/// 某一级没有进入就被丢弃（例如它所在的线程提前 panic），或者持有负载时 panic，
/// 下一级的 [`Stage::enter`] 返回 [`SyncError::Disconnected`]，断裂沿链条一直传到最后一级。
pub struct Pipeline;

impl Pipeline {
    /// 创建 `stages` 级接力，负载初值为 `value`。
    ///
    /// # Panics
    /// `stages` 为 0 时 panic。
    ///
    /// # 示例
    /// ```
    /// use std::thread;
    /// use ordsync::{Pipeline, SyncMode};
    ///
    /// let mut stages = Pipeline::new(Vec::new(), 3, SyncMode::AcquireRelease).into_iter();
    /// let (producer, relay, consumer) =
    ///     (stages.next().unwrap(), stages.next().unwrap(), stages.next().unwrap());
    ///
    /// let c = thread::spawn(move || {
    ///     let mut work = consumer.enter().unwrap();
    ///     work[1] = 2;
    ///     work.take()
    /// });
    /// let r = thread::spawn(move || relay.pass());
    /// let p = thread::spawn(move || *producer.enter().unwrap() = vec![1, 0, 3]);
    ///
    /// p.join().unwrap();
    /// r.join().unwrap().unwrap();
    /// assert_eq!(c.join().unwrap(), vec![1, 2, 3]);
    /// ```
    pub fn new<T>(value: T, stages: usize, mode: SyncMode) -> Vec<Stage<T>> {
        assert!(stages > 0, "ordsync: a pipeline needs at least one stage");
        let shared = Arc::new(PipelineShared {
            value: UnsafeCell::new(Some(value)),
            links: (0..stages)
                .map(|_| Link {
                    done: Signal::new(mode),
                    abandoned: AtomicBool::new(false),
                })
                .collect(),
        });
        (0..stages)
            .map(|index| Stage {
                shared: Arc::clone(&shared),
                index,
                finished: false,
            })
            .collect()
    }
}

/// 接力中的一级
///
/// 未进入就被丢弃时，本级被视为中断，下一级会收到 [`SyncError::Disconnected`]。
pub struct Stage<T> {
    shared: Arc<PipelineShared<T>>,
    index: usize,
    finished: bool,
}

impl<T> Stage<T> {
    /// 本级序号
    pub fn index(&self) -> usize {
        self.index
    }

    /// 是否为最后一级
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.shared.links.len()
    }

    /// 前一级是否已离开（第一级恒为 `true`）。前一级中断时同样返回 `true`。
    pub fn is_ready(&self) -> bool {
        self.index == 0 || self.shared.links[self.index - 1].done.is_raised()
    }

    /// 等待前一级完成后进入，获得对负载的独占访问。
    pub fn enter(self) -> Result<StageGuard<T>, SyncError> {
        self.enter_with(WaitStrategy::Yield)
    }

    /// 按指定策略等待前一级完成后进入。
    ///
    /// 前一级中断时返回 [`SyncError::Disconnected`]，本级随之中断。
    pub fn enter_with(self, strategy: WaitStrategy) -> Result<StageGuard<T>, SyncError> {
        if self.index > 0 {
            let prev = &self.shared.links[self.index - 1];
            prev.done.wait_with(strategy);
            if prev.abandoned.load(Ordering::Acquire) {
                log::debug!(
                    "ordsync: pipeline stage {} abandoned, stage {} disconnected",
                    self.index - 1,
                    self.index
                );
                return Err(SyncError::Disconnected);
            }
        }
        Ok(StageGuard {
            stage: self,
            _not_sync: PhantomData,
        })
    }

    /// 不访问负载，只把前一级的完成转交给下一级。
    pub fn pass(self) -> Result<(), SyncError> {
        self.enter().map(drop)
    }

    fn leave(&mut self, abandoned: bool) {
        let link = &self.shared.links[self.index];
        if abandoned {
            link.abandoned.store(true, Ordering::Release);
        }
        link.done.raise();
        self.finished = true;
    }
}

impl<T> Drop for Stage<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.leave(true);
        }
    }
}

/// 一级接力的作用域守卫，析构时通知下一级
///
/// 守卫通过 `&self` 交出 `&T`，因此只有 `T: Sync` 时才能在线程间共享：
///
/// ```compile_fail
/// use std::cell::Cell;
/// use ordsync::StageGuard;
///
/// fn shared_across_threads<S: Sync>() {}
/// shared_across_threads::<StageGuard<Cell<u64>>>();
/// ```
pub struct StageGuard<T> {
    stage: Stage<T>,
    _not_sync: PhantomData<*const ()>,
}

// SAFETY: 守卫代表对负载的独占访问，移交给其他线程等同于移交 T
unsafe impl<T: Send> Send for StageGuard<T> {}
// SAFETY: 共享守卫只能得到 &T
unsafe impl<T: Send + Sync> Sync for StageGuard<T> {}

impl<T> StageGuard<T> {
    /// 取出负载。只有最后一级可以这样做。
    ///
    /// # Panics
    /// 非最后一级调用时 panic。
    pub fn take(self) -> T {
        assert!(
            self.stage.is_last(),
            "ordsync: only the last pipeline stage may take the payload"
        );
        // SAFETY: 本级独占访问负载
        let value = unsafe { (*self.stage.shared.value.get()).take() };
        value.unwrap_or_else(|| unreachable!("pipeline payload taken twice"))
    }

    fn slot(&self) -> *mut Option<T> {
        self.stage.shared.value.get()
    }
}

impl<T> Deref for StageGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 本级独占访问负载；只有最后一级能取走负载，且取走时消耗守卫
        match unsafe { &*self.slot() } {
            Some(value) => value,
            None => unreachable!("pipeline payload accessed after it was taken"),
        }
    }
}

impl<T> DerefMut for StageGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上
        match unsafe { &mut *self.slot() } {
            Some(value) => value,
            None => unreachable!("pipeline payload accessed after it was taken"),
        }
    }
}

impl<T> Drop for StageGuard<T> {
    fn drop(&mut self) {
        // 持有负载时 panic，负载可能只写了一半
        self.stage.leave(thread::panicking());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_signal_is_idempotent() {
        let signal = Signal::new(SyncMode::Fence);
        assert!(!signal.is_raised());
        signal.raise();
        signal.raise();
        assert!(signal.is_raised());
        signal.wait();
    }

    #[test]
    fn test_oneshot_try_recv() {
        let (tx, mut rx) = oneshot(SyncMode::AcquireRelease);
        assert_eq!(rx.try_recv(), None);
        tx.send(42);
        assert_eq!(rx.try_recv(), Some(42));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_oneshot_disconnected() {
        let (tx, rx) = oneshot::<u32>(SyncMode::AcquireRelease);
        drop(tx);
        assert_eq!(rx.recv(), Err(SyncError::Disconnected));
    }

    #[test]
    fn test_oneshot_sleeping_receiver() {
        let (tx, rx) = oneshot(SyncMode::AcquireRelease);
        let rx = rx.with_strategy(WaitStrategy::Sleep(Duration::from_millis(1)));
        let consumer = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(10));
        tx.send(String::from("ready"));
        assert_eq!(consumer.join().unwrap().unwrap(), "ready");
    }

    #[test]
    fn test_broadcast_drops_payload() {
        let payload = Arc::new(());
        {
            let cell = Broadcast::new(SyncMode::Fence);
            cell.publish(Arc::clone(&payload)).unwrap();
            assert_eq!(Arc::strong_count(&payload), 2);
            let rejected = cell.publish(Arc::clone(&payload)).unwrap_err();
            drop(rejected);
            assert_eq!(Arc::strong_count(&payload), 2);
        }
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn test_single_stage_pipeline() {
        let mut stages = Pipeline::new(1, 1, SyncMode::AcquireRelease);
        let stage = stages.pop().unwrap();
        assert!(stage.is_ready() && stage.is_last());
        let mut guard = stage.enter().unwrap();
        *guard += 1;
        assert_eq!(guard.take(), 2);
    }

    #[test]
    fn test_stage_readiness() {
        let mut stages = Pipeline::new((), 2, SyncMode::Fence).into_iter();
        let first = stages.next().unwrap();
        let second = stages.next().unwrap();
        assert_eq!(second.index(), 1);
        assert!(!second.is_ready());
        first.pass().unwrap();
        assert!(second.is_ready());
        assert!(second.enter().is_ok());
    }

    #[test]
    #[should_panic(expected = "only the last pipeline stage")]
    fn test_take_from_middle_stage_panics() {
        let mut stages = Pipeline::new(0, 2, SyncMode::AcquireRelease).into_iter();
        let first = stages.next().unwrap();
        first.enter().unwrap().take();
    }

    #[test]
    fn test_stage_guard_thread_bounds() {
        fn assert_send<S: Send>() {}
        fn assert_sync<S: Sync>() {}

        // 非 Sync 的负载仍可随守卫移交，但守卫不能被共享
        assert_send::<StageGuard<core::cell::Cell<u64>>>();
        assert_send::<Stage<core::cell::Cell<u64>>>();
        assert_sync::<StageGuard<Vec<u64>>>();
    }

    #[test]
    fn test_dropped_stage_disconnects_the_rest() {
        let mut stages = Pipeline::new(0u32, 3, SyncMode::AcquireRelease).into_iter();
        let (first, middle, last) = (
            stages.next().unwrap(),
            stages.next().unwrap(),
            stages.next().unwrap(),
        );

        *first.enter().unwrap() = 7;
        drop(middle);
        assert!(last.is_ready());
        assert_eq!(last.enter().err(), Some(SyncError::Disconnected));
    }

    #[test]
    fn test_panicking_stage_disconnects_next() {
        let mut stages = Pipeline::new(Vec::new(), 2, SyncMode::Fence).into_iter();
        let (first, second) = (stages.next().unwrap(), stages.next().unwrap());

        let writer = thread::spawn(move || {
            let mut work = first.enter().unwrap();
            work.push(1);
            panic!("stage failed halfway");
        });
        assert!(writer.join().is_err());
        assert_eq!(second.enter().err(), Some(SyncError::Disconnected));
    }

    #[test]
    fn test_disconnect_propagates_to_waiting_stage() {
        let mut stages = Pipeline::new((), 3, SyncMode::AcquireRelease).into_iter();
        let (first, middle, last) = (
            stages.next().unwrap(),
            stages.next().unwrap(),
            stages.next().unwrap(),
        );

        let waiter = thread::spawn(move || last.enter().map(|guard| guard.take()));
        let relay = thread::spawn(move || middle.pass());
        thread::sleep(Duration::from_millis(10));
        drop(first);

        assert_eq!(relay.join().unwrap(), Err(SyncError::Disconnected));
        assert_eq!(waiter.join().unwrap(), Err(SyncError::Disconnected));
    }

    #[test]
    #[should_panic(expected = "at least one stage")]
    fn test_empty_pipeline_panics() {
        Pipeline::new(0, 0, SyncMode::AcquireRelease);
    }
}
