use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, VideoError};
use crate::slot::FrameSink;

/// 后端自有的生产者线程
///
/// 调用方 (会话) 不创建也不 join 这个线程；它由后端在 CapStart 时启动、CapStop / Close 时回收。
/// 循环在以下任一条件下退出：stop 标志、sink 所属 generation 失效、produce 返回错误。
#[derive(Debug)]
pub struct Producer {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    /// 启动线程，每隔 `interval` 调用一次 `produce`
    /// interval 为 0 时不休眠 (由 produce 内部的阻塞读取控制节奏)
    pub fn spawn<F>(name: &str, sink: FrameSink, interval: Duration, mut produce: F) -> Result<Self>
    where
        F: FnMut(&FrameSink) -> Result<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread_name = name.to_owned();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!(target: "arvideo::producer", thread = %thread_name, "producer started");
                while !stop_flag.load(Ordering::Acquire) && sink.is_active() {
                    if let Err(e) = produce(&sink) {
                        tracing::error!(target: "arvideo::producer", thread = %thread_name, "producer failed: {}", e);
                        break;
                    }
                    if !interval.is_zero() {
                        // stop() 会 unpark，无需等满一个周期
                        thread::park_timeout(interval);
                    }
                }
                tracing::debug!(target: "arvideo::producer", thread = %thread_name, "producer exited");
            })
            .map_err(|e| VideoError::Failed(format!("failed to spawn producer thread: {}", e)))?;

        Ok(Self {
            name: name.to_owned(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 通知线程退出并等待其结束 (幂等)
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::error!(target: "arvideo::producer", thread = %self.name, "producer thread panicked");
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuffer;
    use crate::pixel_format::PixelFormat;
    use crate::slot::FrameSlot;
    use std::time::Instant;

    #[test]
    fn producer_delivers_until_stopped() {
        let slot = FrameSlot::new();
        let reader = slot.reader();
        let sink = slot.begin(None);

        let mut producer = Producer::spawn("test-producer", sink, Duration::from_millis(1), |sink| {
            sink.deliver(FrameBuffer::packed(1, 1, PixelFormat::Mono, vec![7u8]));
            Ok(())
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while reader.latest().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(reader.latest().is_some());

        producer.stop();
        assert!(!producer.is_running());
        let delivered = reader.stats().delivered_frames;
        thread::sleep(Duration::from_millis(10));
        assert_eq!(reader.stats().delivered_frames, delivered);
    }

    #[test]
    fn producer_exits_when_generation_ends() {
        let slot = FrameSlot::new();
        let sink = slot.begin(None);
        let producer = Producer::spawn("test-producer", sink, Duration::from_millis(1), |_| Ok(())).unwrap();
        slot.end();

        let deadline = Instant::now() + Duration::from_secs(5);
        while producer.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!producer.is_running());
    }

    /// 设备不出帧时 produce 每次等待到超时后返回 Ok，stop 在一个超时周期内完成
    #[test]
    fn stop_is_prompt_when_source_stalls() {
        let slot = FrameSlot::new();
        let sink = slot.begin(None);
        let mut producer = Producer::spawn("test-stalled", sink, Duration::ZERO, |_| {
            thread::sleep(Duration::from_millis(50));
            Ok(())
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        producer.stop();
        assert!(!producer.is_running());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
