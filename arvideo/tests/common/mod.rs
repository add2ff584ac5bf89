#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arvideo::BackendRegistry;
use arvideo_core::device::DeviceType;
use arvideo_core::error::{Result, VideoError};
use arvideo_core::frame::FrameBuffer;
use arvideo_core::params::IntParam;
use arvideo_core::pixel_format::PixelFormat;
use arvideo_core::producer::Producer;
use arvideo_core::slot::{DeliveryMode, FrameSink};
use arvideo_core::traits::{Backend, Capabilities, Driver};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// 假后端的资源计数器
#[derive(Debug, Default)]
pub struct Counters {
    /// 存活的后端实例 (含其帧缓冲)
    pub live: AtomicUsize,
    pub opened: AtomicUsize,
    pub producers_started: AtomicUsize,
    pub producers_live: AtomicUsize,
    pub polls: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// 计数守卫：创建时 +1，释放时 -1
struct Tracked(Arc<Counters>, fn(&Counters) -> &AtomicUsize);

impl Tracked {
    fn new(counters: &Arc<Counters>, field: fn(&Counters) -> &AtomicUsize) -> Self {
        field(counters).fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counters), field)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        (self.1)(&self.0).fetch_sub(1, Ordering::SeqCst);
    }
}

/// 测试通过这个通道把帧 (单字节标记) 交给假后端的生产者线程
#[derive(Debug, Clone)]
pub struct FrameFeed {
    tx: Sender<u8>,
}

impl FrameFeed {
    pub fn push(&self, tag: u8) {
        let _ = self.tx.send(tag);
    }
}

#[derive(Clone)]
pub struct FakeDriver {
    pub counters: Arc<Counters>,
    pub capabilities: Capabilities,
    pub fail_open: bool,
    feed_rx: Receiver<u8>,
}

impl FakeDriver {
    pub fn new(capabilities: Capabilities) -> (Self, FrameFeed) {
        let (tx, rx) = unbounded();
        let driver = Self {
            counters: Arc::new(Counters::default()),
            capabilities,
            fail_open: false,
            feed_rx: rx,
        };
        (driver, FrameFeed { tx })
    }

    pub fn failing() -> Self {
        let (mut driver, _) = Self::new(Capabilities::POLL);
        driver.fail_open = true;
        driver
    }

    /// 只注册这个驱动的注册表，默认设备也指向它
    pub fn registry(&self) -> Arc<BackendRegistry> {
        let mut registry = BackendRegistry::empty(DeviceType::Dummy);
        registry.register(Arc::new(self.clone()));
        Arc::new(registry)
    }
}

impl Driver for FakeDriver {
    fn device_type(&self) -> DeviceType {
        DeviceType::Dummy
    }

    fn open(&self, _config: &str) -> Result<Box<dyn Backend>> {
        // 中间资源先分配，再模拟初始化失败
        let buffer = Tracked::new(&self.counters, |c| &c.live);
        if self.fail_open {
            drop(buffer);
            return Err(VideoError::BackendInitFailed("fake: init failed".into()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBackend {
            counters: Arc::clone(&self.counters),
            capabilities: self.capabilities,
            feed_rx: self.feed_rx.clone(),
            sink: None,
            producer: None,
            next_tag: 0,
            _buffer: buffer,
        }))
    }
}

pub fn frame(tag: u8) -> FrameBuffer {
    FrameBuffer::packed(2, 1, PixelFormat::Mono, vec![tag, tag])
}

struct FakeBackend {
    counters: Arc<Counters>,
    capabilities: Capabilities,
    feed_rx: Receiver<u8>,
    sink: Option<FrameSink>,
    producer: Option<Producer>,
    next_tag: u8,
    _buffer: Tracked,
}

impl Backend for FakeBackend {
    fn device_type(&self) -> DeviceType {
        DeviceType::Dummy
    }

    fn size(&self) -> (u32, u32) {
        (2, 1)
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Mono
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn cap_start(&mut self, sink: FrameSink, mode: DeliveryMode) -> Result<()> {
        if mode == DeliveryMode::Push {
            self.counters.producers_started.fetch_add(1, Ordering::SeqCst);
            let alive = Tracked::new(&self.counters, |c| &c.producers_live);
            let rx = self.feed_rx.clone();
            let producer = Producer::spawn("fake-producer", sink.clone(), Duration::ZERO, move |sink| {
                let _alive = &alive;
                match rx.recv_timeout(Duration::from_millis(5)) {
                    Ok(tag) => {
                        sink.deliver(frame(tag));
                        Ok(())
                    }
                    Err(RecvTimeoutError::Timeout) => Ok(()),
                    Err(RecvTimeoutError::Disconnected) => Err(VideoError::Failed("feed closed".into())),
                }
            })?;
            self.producer = Some(producer);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn poll(&mut self) -> Result<()> {
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = &self.sink {
            self.next_tag = self.next_tag.wrapping_add(1);
            sink.deliver(frame(self.next_tag));
        }
        Ok(())
    }

    fn cap_stop(&mut self) -> Result<()> {
        self.sink = None;
        // Producer 的 Drop 会 join 线程
        self.producer = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.cap_stop()
    }

    fn get_int(&self, key: IntParam) -> Result<i32> {
        match key {
            IntParam::Gain => Ok(7),
            _ => Err(VideoError::NotSupported),
        }
    }
}
