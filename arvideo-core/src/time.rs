use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 帧的采集时间 (秒 + 微秒，UNIX epoch)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureTime {
    pub sec: u64,
    pub usec: u32,
}

impl CaptureTime {
    pub fn now() -> Self {
        Self::from_system(SystemTime::now())
    }

    pub fn from_system(t: SystemTime) -> Self {
        // 系统时钟早于 epoch 时按 0 处理
        let d = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::from_duration(d)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            usec: d.subsec_micros(),
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.sec) + Duration::from_micros(self.usec as u64)
    }
}

/// 单调时间戳生成器
///
/// 墙上时钟可能被 NTP 向回调整，但交付给消费者的帧时间戳必须单调不减。
/// 这里对每个时间戳与上一次结果取 max。
#[derive(Debug, Default)]
pub struct MonotonicStamper {
    last: CaptureTime,
}

impl MonotonicStamper {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把后端给出的时间戳规范化为单调不减
    pub fn clamp(&mut self, t: CaptureTime) -> CaptureTime {
        if t < self.last {
            tracing::trace!(target: "arvideo::time", "clock went backwards, clamping {:?} -> {:?}", t, self.last);
            return self.last;
        }
        self.last = t;
        t
    }

    pub fn reset(&mut self) {
        self.last = CaptureTime::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_backwards_jumps() {
        let mut s = MonotonicStamper::new();
        let t1 = CaptureTime { sec: 10, usec: 500 };
        let t0 = CaptureTime { sec: 10, usec: 100 };
        assert_eq!(s.clamp(t1), t1);
        assert_eq!(s.clamp(t0), t1);
        let t2 = CaptureTime { sec: 11, usec: 0 };
        assert_eq!(s.clamp(t2), t2);
    }

    #[test]
    fn duration_round_trip_keeps_microseconds() {
        let d = Duration::from_micros(1_234_567);
        let t = CaptureTime::from_duration(d);
        assert_eq!(t, CaptureTime { sec: 1, usec: 234_567 });
        assert_eq!(t.as_duration(), d);
    }
}
