use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 帧交付统计 (原子计数器，生产者线程与消费者线程共享)
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    overwritten: AtomicU64,
    callbacks: AtomicU64,
    stale: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// 上一帧还没被读取就被新帧覆盖 (last-frame-wins 丢帧)
    pub(crate) fn record_overwritten(&self) {
        self.overwritten.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// 旧一代生产者交付的帧 (CapStop 之后到达)
    pub(crate) fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryTelemetry {
        DeliveryTelemetry {
            delivered_frames: self.delivered.load(Ordering::Relaxed),
            overwritten_frames: self.overwritten.load(Ordering::Relaxed),
            callback_invocations: self.callbacks.load(Ordering::Relaxed),
            stale_frames: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// 某一时刻的交付统计快照
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeliveryTelemetry {
    /// 成功发布到交付槽的帧数
    pub delivered_frames: u64,

    /// 未被读取即被覆盖的帧数
    /// 消费者比生产者慢时这个值会持续增长
    pub overwritten_frames: u64,

    /// 异步回调被调用的次数
    pub callback_invocations: u64,

    /// 被丢弃的过期帧 (来自已停止的采集周期)
    pub stale_frames: u64,
}

impl fmt::Debug for DeliveryTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTelemetry")
            .field("delivered", &self.delivered_frames)
            .field("overwritten", &self.overwritten_frames)
            .field("callbacks", &self.callback_invocations)
            .field("stale", &self.stale_frames)
            .finish()
    }
}

impl DeliveryTelemetry {
    /// 被读取 (或回调) 过的帧占比，没有交付时为 1.0
    pub fn read_ratio(&self) -> f64 {
        if self.delivered_frames == 0 {
            return 1.0;
        }
        1.0 - self.overwritten_frames as f64 / self.delivered_frames as f64
    }
}
