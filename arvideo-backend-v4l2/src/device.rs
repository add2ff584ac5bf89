use std::sync::Arc;
use std::time::Duration;

use v4l::capability::Flags;
use v4l::video::Capture;

use arvideo_calib::DeviceIdentity;
use arvideo_core::config::ConfigTokens;
use arvideo_core::device::DeviceType;
use arvideo_core::error::{Result, VideoError};
use arvideo_core::params::{IntParam, StringParam};
use arvideo_core::pixel_format::PixelFormat;
use arvideo_core::producer::Producer;
use arvideo_core::slot::{DeliveryMode, FrameSink};
use arvideo_core::traits::{Backend, Capabilities, SourceFlags, SourceInfo};

use crate::controls::V4l2Controls;
use crate::pixel_map;
use crate::stream::V4l2Stream;

pub const DEFAULT_DEVICE: &str = "/dev/video0";
pub const DEFAULT_BUFFERS: u32 = 4;

/// 解析后的 V4L2 选项
#[derive(Debug, Clone, PartialEq)]
pub struct V4l2Options {
    pub path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<PixelFormat>,
    pub fps: Option<u32>,
    pub buffers: u32,
    pub camcalib_by_dev_id: bool,
}

impl V4l2Options {
    pub fn parse(config: &str) -> Result<Self> {
        let tokens = ConfigTokens::parse(config);
        let mut opts = Self {
            path: DEFAULT_DEVICE.to_owned(),
            width: None,
            height: None,
            format: None,
            fps: None,
            buffers: DEFAULT_BUFFERS,
            camcalib_by_dev_id: false,
        };

        for token in &tokens {
            match token.key.as_str() {
                "device" => {}
                "dev" => opts.path = token.parse_value()?,
                "source" => opts.path = format!("/dev/video{}", token.parse_value::<u32>()?),
                "width" => opts.width = Some(token.parse_value()?),
                "height" => opts.height = Some(token.parse_value()?),
                "fps" => opts.fps = Some(token.parse_value()?),
                "buffers" => opts.buffers = token.parse_value::<u32>()?.clamp(2, 32),
                "format" => match token.parse_value::<PixelFormat>() {
                    Ok(f) => opts.format = Some(f),
                    Err(_) => tracing::warn!(target: "arvideo::v4l2", "Unsupported pixel format '{}' requested, negotiating from device formats.", token.raw),
                },
                "cachedir" => {}
                "camcalibbydevid" => opts.camcalib_by_dev_id = true,
                _ => {
                    return Err(VideoError::BackendInitFailed(format!(
                        "LinuxV4L2: unrecognised option '{}'",
                        token.raw
                    )))
                }
            }
        }
        Ok(opts)
    }
}

/// 枚举系统中的摄像头设备
pub fn list_sources() -> Result<Vec<SourceInfo>> {
    let mut sources = Vec::new();

    // 遍历 /dev/video* 节点
    for node in v4l::context::enum_devices() {
        let path = node.path().to_string_lossy().to_string();
        let Ok(dev) = v4l::Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // 过滤：必须支持 Video Capture，忽略 Metadata 设备或 Output 设备
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        let flags = if sources.is_empty() {
            SourceFlags::DEFAULT
        } else {
            SourceFlags::empty()
        };
        sources.push(SourceInfo {
            name: node.name().unwrap_or_else(|| "Unknown Camera".into()),
            uid: caps.bus.clone(),
            open_token: format!("-dev={}", path),
            flags,
        });
    }

    Ok(sources)
}

/// 打开设备并完成格式协商
pub fn open(config: &str) -> Result<V4l2Backend> {
    let opts = V4l2Options::parse(config)?;

    // 1. 打开设备句柄
    let dev = v4l::Device::with_path(&opts.path).map_err(|e| {
        VideoError::BackendInitFailed(format!("LinuxV4L2: unable to open {}: {}", opts.path, e))
    })?;
    let caps = dev.query_caps().map_err(VideoError::Io)?;

    // 2. 格式协商
    let negotiated = negotiate_format(&dev, &opts)?;
    if let Some(req) = opts.format {
        if req != negotiated.format {
            tracing::warn!(target: "arvideo::v4l2", "Pixel format {} not available on {}, falling back to {}.", req, opts.path, negotiated.format);
        }
    }

    // 3. 应用格式设置 (ioctl: VIDIOC_S_FMT)
    let mut fmt = dev.format().map_err(VideoError::Io)?;
    fmt.width = negotiated.width;
    fmt.height = negotiated.height;
    fmt.fourcc = pixel_map::to_v4l_fourcc(negotiated.format);
    let applied = dev.set_format(&fmt).map_err(VideoError::Io)?;

    // 驱动可能调整了尺寸或格式，以实际生效的为准
    let format = pixel_map::from_v4l_fourcc(applied.fourcc).ok_or_else(|| {
        VideoError::BackendInitFailed(format!("LinuxV4L2: driver applied unsupported format {}", applied.fourcc))
    })?;

    if let Some(fps) = opts.fps {
        if let Err(e) = dev.set_params(&v4l::video::capture::Parameters::with_fps(fps)) {
            tracing::warn!(target: "arvideo::v4l2", "Unable to set {} fps: {}", fps, e);
        }
    }

    tracing::info!(
        target: "arvideo::v4l2",
        "Camera opened: {} ({}) {}x{} @ {}",
        caps.card,
        opts.path,
        applied.width,
        applied.height,
        applied.fourcc
    );

    let mut identity = DeviceIdentity::new(&caps.driver, &caps.card, &caps.bus);
    if opts.camcalib_by_dev_id {
        if let Some(uid) = DeviceIdentity::from_host(true).unique_id {
            identity = identity.with_unique_id(&uid);
        }
    }

    // Stream 和 Controls 共享同一个 fd
    let dev = Arc::new(dev);
    Ok(V4l2Backend {
        controls: V4l2Controls::new(Arc::clone(&dev)),
        dev,
        width: applied.width,
        height: applied.height,
        stride: applied.stride,
        format,
        opts,
        identity,
        sink: None,
        producer: None,
        closed: false,
    })
}

/// 核心：格式协商算法
/// 遍历硬件支持的所有格式，计算得分，返回最佳配置
#[derive(Debug)]
struct NegotiatedFormat {
    width: u32,
    height: u32,
    format: PixelFormat,
}

fn negotiate_format(dev: &v4l::Device, opts: &V4l2Options) -> Result<NegotiatedFormat> {
    let mut best_score = i64::MIN;
    let mut best = None;

    let supported = dev.enum_formats().map_err(VideoError::Io)?;
    for v4l_fmt in supported {
        // 压缩格式等无法交付的格式直接跳过
        let Some(fmt) = pixel_map::from_v4l_fourcc(v4l_fmt.fourcc) else {
            continue;
        };

        let sizes = dev.enum_framesizes(v4l_fmt.fourcc).unwrap_or_default();
        for size in sizes {
            // 这里简化处理 Discrete 分辨率，Stepwise 暂略
            for d in size.size.to_discrete() {
                let score = calculate_score(opts, d.width, d.height, fmt);
                if score > best_score {
                    best_score = score;
                    best = Some(NegotiatedFormat {
                        width: d.width,
                        height: d.height,
                        format: fmt,
                    });
                }
            }
        }
    }

    best.ok_or_else(|| {
        VideoError::BackendInitFailed("LinuxV4L2: device offers no usable uncompressed format".into())
    })
}

fn calculate_score(opts: &V4l2Options, w: u32, h: u32, fmt: PixelFormat) -> i64 {
    let mut score = 0i64;

    // 1. 分辨率：越接近请求越好
    match (opts.width, opts.height) {
        (Some(rw), Some(rh)) => {
            score -= (w as i64 - rw as i64).abs() + (h as i64 - rh as i64).abs();
        }
        (Some(rw), None) => score -= (w as i64 - rw as i64).abs(),
        (None, Some(rh)) => score -= (h as i64 - rh as i64).abs(),
        // 2. 没有要求时分辨率越大基础分越高 (作为 Tie-breaker)
        (None, None) => score += (w / 100) as i64,
    }

    // 3. 匹配格式
    if opts.format == Some(fmt) {
        score += 100_000;
    }

    score
}

/// V4L2 后端实例
pub struct V4l2Backend {
    dev: Arc<v4l::Device>,
    controls: V4l2Controls,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    opts: V4l2Options,
    identity: DeviceIdentity,
    sink: Option<FrameSink>,
    producer: Option<Producer>,
    closed: bool,
}

impl std::fmt::Debug for V4l2Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Backend")
            .field("path", &self.opts.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("capturing", &self.sink.is_some())
            .finish()
    }
}

impl Backend for V4l2Backend {
    fn device_type(&self) -> DeviceType {
        DeviceType::LinuxV4L2
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::PUSH | Capabilities::IDENTITY | Capabilities::CONTROLS;
        if self.format.is_planar() {
            caps |= Capabilities::ZERO_COPY;
        }
        caps
    }

    /// V4L2 的出队是阻塞的，只支持 Push：由自己的线程把帧写进交付槽
    fn cap_start(&mut self, sink: FrameSink, _mode: DeliveryMode) -> Result<()> {
        if self.closed {
            return Err(VideoError::NotOpen);
        }
        if self.sink.is_some() {
            return Err(VideoError::Busy);
        }

        let mut stream = V4l2Stream::start(
            Arc::clone(&self.dev),
            self.width,
            self.height,
            self.format,
            self.stride,
            self.opts.buffers,
        )?;
        let producer = Producer::spawn("arvideo-v4l2", sink.clone(), Duration::ZERO, move |sink| {
            match stream.next_frame() {
                Ok(Some(frame)) => {
                    sink.deliver(frame);
                    Ok(())
                }
                // 出队超时：回到循环顶部检查停止标志
                Ok(None) => Ok(()),
                // 单帧损坏不终止采集
                Err(VideoError::Failed(msg)) => {
                    tracing::warn!(target: "arvideo::v4l2", "{}", msg);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })?;

        self.producer = Some(producer);
        self.sink = Some(sink);
        Ok(())
    }

    fn cap_stop(&mut self) -> Result<()> {
        if self.sink.take().is_none() {
            return Err(VideoError::Failed("LinuxV4L2: not capturing".into()));
        }
        // 线程退出时释放 mmap 流 (STREAMOFF)
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.sink.is_some() {
            self.cap_stop()?;
        }
        self.closed = true;
        tracing::debug!(target: "arvideo::v4l2", "Camera closed: {}", self.opts.path);
        Ok(())
    }

    fn get_int(&self, key: IntParam) -> Result<i32> {
        match key {
            IntParam::Fps => {
                let params = self.dev.params().map_err(VideoError::Io)?;
                let iv = params.interval;
                if iv.numerator == 0 {
                    return Err(VideoError::NotSupported);
                }
                Ok((iv.denominator / iv.numerator) as i32)
            }
            other => self.controls.get(other),
        }
    }

    fn set_int(&mut self, key: IntParam, value: i32) -> Result<()> {
        self.controls.set(key, value)
    }

    fn get_string(&self, key: StringParam) -> Result<String> {
        match key {
            StringParam::DeviceId => Ok(self.identity.to_string()),
            _ => Err(VideoError::NotSupported),
        }
    }

    fn export_state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "backend": "v4l2",
            "path": self.opts.path,
            "width": self.width,
            "height": self.height,
            "format": self.format.name(),
            "controls": self.controls.export_state(),
        }))
    }
}
