//! 帧交付槽
//!
//! 后端 (生产者) 与会话 (消费者) 之间唯一的数据通道。
//!
//! - 没有帧队列：新帧直接替换旧帧 (last-frame-wins)
//! - 替换是在短锁内交换 `Arc<FrameBuffer>`，读者拿到的永远是完整的一帧
//! - 每次 CapStart 开启一个新的 generation，旧 generation 的 FrameSink 交付的帧被丢弃
//! - 回调在回调锁内执行；`end()` 同样需要获取回调锁，所以 `end()` 返回后不会再有回调运行

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::frame::FrameBuffer;
use crate::telemetry::{DeliveryStats, DeliveryTelemetry};
use crate::time::MonotonicStamper;

/// 异步交付回调：在后端的生产者线程上调用，不能阻塞
///
/// 闭包捕获的状态由槽持有，CapStop / Close 时随闭包一起释放。
/// 【关键】回调内部不能再调用同一会话的 CapStop / Close，否则会死锁。
pub type FrameCallback = Box<dyn FnMut(&Arc<FrameBuffer>) + Send>;

/// 帧的驱动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 消费者调用 get_image 时由会话驱动后端 poll 一次
    Poll,
    /// 后端自己的线程持续推送，并调用回调
    Push,
}

struct Inner {
    /// 当前有效的 generation，0 表示没有进行中的采集
    generation: u64,
    next_generation: u64,
    latest: Option<Arc<FrameBuffer>>,
    /// 最新帧是否已被读取过 (用于统计覆盖丢帧)
    latest_read: bool,
    sequence: u64,
    stamper: MonotonicStamper,
}

/// 交付槽本体，由会话以 Arc 持有
pub struct FrameSlot {
    inner: Mutex<Inner>,
    callback: Mutex<Option<FrameCallback>>,
    stats: DeliveryStats,
}

impl fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("FrameSlot")
            .field("generation", &inner.generation)
            .field("filled", &inner.latest.is_some())
            .field("sequence", &inner.sequence)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                next_generation: 1,
                latest: None,
                latest_read: false,
                sequence: 0,
                stamper: MonotonicStamper::new(),
            }),
            callback: Mutex::new(None),
            stats: DeliveryStats::new(),
        }
    }
}

impl FrameSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 开启新的采集周期
    ///
    /// 清空最新帧 (fill flag 复位)，重置帧序号和时间戳基准，
    /// 注册回调 (替换之前的注册)，返回绑定到新 generation 的 FrameSink。
    pub fn begin(self: &Arc<Self>, callback: Option<FrameCallback>) -> FrameSink {
        // 锁顺序始终是 callback -> inner
        let mut cb = lock(&self.callback);
        let mut inner = lock(&self.inner);

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.generation = generation;
        inner.latest = None;
        inner.latest_read = false;
        inner.sequence = 0;
        inner.stamper.reset();
        *cb = callback;

        tracing::debug!(target: "arvideo::slot", generation, "delivery generation opened");

        FrameSink {
            slot: Arc::clone(self),
            generation,
        }
    }

    /// 结束当前采集周期
    ///
    /// 返回后：所有旧 FrameSink 的交付都会被丢弃，回调已被释放且不会再运行。
    /// 最新帧保留 (停止后仍可读取最后一帧)。
    pub fn end(&self) {
        let mut cb = lock(&self.callback);
        let mut inner = lock(&self.inner);
        if inner.generation != 0 {
            tracing::debug!(target: "arvideo::slot", generation = inner.generation, "delivery generation closed");
        }
        inner.generation = 0;
        drop(inner);
        // 在回调锁内释放闭包及其捕获的状态
        cb.take();
    }

    /// 结束采集并释放最新帧 (Close 使用)
    pub fn clear(&self) {
        self.end();
        let mut inner = lock(&self.inner);
        inner.latest = None;
        inner.latest_read = false;
    }

    pub fn reader(self: &Arc<Self>) -> FrameReader {
        FrameReader {
            slot: Arc::clone(self),
        }
    }

    pub fn is_filled(&self) -> bool {
        lock(&self.inner).latest.is_some()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner).generation != 0
    }

    pub fn stats(&self) -> DeliveryTelemetry {
        self.stats.snapshot()
    }

    fn latest(&self) -> Option<Arc<FrameBuffer>> {
        let mut inner = lock(&self.inner);
        if inner.latest.is_some() {
            inner.latest_read = true;
        }
        inner.latest.clone()
    }

    fn deliver(&self, generation: u64, mut frame: FrameBuffer) -> bool {
        // 1. 回调锁贯穿整个交付过程，end() 会等待正在进行的交付完成
        let mut cb = lock(&self.callback);

        // 2. 在 inner 锁内校验 generation 并原子地替换最新帧
        let published = {
            let mut inner = lock(&self.inner);
            if inner.generation != generation {
                drop(inner);
                self.stats.record_stale();
                tracing::trace!(target: "arvideo::slot", generation, "dropping frame from stale generation");
                return false;
            }

            frame.sequence = inner.sequence;
            inner.sequence += 1;
            frame.time = inner.stamper.clamp(frame.time);

            let published = Arc::new(frame);
            let previous = inner.latest.replace(Arc::clone(&published));
            if previous.is_some() && !inner.latest_read {
                self.stats.record_overwritten();
            }
            inner.latest_read = false;
            published
        };
        self.stats.record_delivered();

        // 3. 回调 (inner 锁已释放，回调内可以调用 get_image)
        if let Some(callback) = cb.as_mut() {
            callback(&published);
            self.stats.record_callback();
        }
        true
    }
}

/// 生产者端句柄 (可克隆，可跨线程)
#[derive(Clone)]
pub struct FrameSink {
    slot: Arc<FrameSlot>,
    generation: u64,
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink")
            .field("generation", &self.generation)
            .finish()
    }
}

impl FrameSink {
    /// 发布一帧。帧序号与时间戳由槽负责规范化。
    /// 返回 false 表示本 sink 所属的采集周期已经结束，帧被丢弃。
    pub fn deliver(&self, frame: FrameBuffer) -> bool {
        self.slot.deliver(self.generation, frame)
    }

    /// 生产者线程可以据此提前退出
    pub fn is_active(&self) -> bool {
        lock(&self.slot.inner).generation == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// 消费者端只读句柄
#[derive(Clone)]
pub struct FrameReader {
    slot: Arc<FrameSlot>,
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader").finish_non_exhaustive()
    }
}

impl FrameReader {
    /// 最新交付的帧；自上次 CapStart 以来没有帧时返回 None
    /// 读取不会清除 fill flag
    pub fn latest(&self) -> Option<Arc<FrameBuffer>> {
        self.slot.latest()
    }

    pub fn is_filled(&self) -> bool {
        self.slot.is_filled()
    }

    pub fn stats(&self) -> DeliveryTelemetry {
        self.slot.stats()
    }
}

/// 获取互斥锁；持锁线程 panic 后数据仍然一致 (只有简单赋值)，直接恢复
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
