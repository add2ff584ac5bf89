use std::time::Duration;

use arvideo_calib::DeviceIdentity;
use arvideo_core::config::ConfigTokens;
use arvideo_core::device::DeviceType;
use arvideo_core::error::{Result, VideoError};
use arvideo_core::params::{DoubleParam, IntParam, StringParam, FOCAL_LENGTH_DEFAULT};
use arvideo_core::pixel_format::PixelFormat;
use arvideo_core::producer::Producer;
use arvideo_core::slot::{DeliveryMode, FrameSink};
use arvideo_core::traits::{Backend, Capabilities};

use crate::pattern::TestPattern;

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_FORMAT: PixelFormat = PixelFormat::Rgb;
pub const DEFAULT_FPS: u32 = 30;

/// 解析后的 Dummy 选项
#[derive(Debug, Clone, PartialEq)]
pub struct DummyOptions {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
    pub source: i32,
    pub focal_length: f64,
    pub identity: Option<DeviceIdentity>,
    pub camcalib_by_dev_id: bool,
}

impl Default for DummyOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            format: DEFAULT_FORMAT,
            fps: DEFAULT_FPS,
            source: 0,
            focal_length: FOCAL_LENGTH_DEFAULT,
            identity: None,
            camcalib_by_dev_id: false,
        }
    }
}

impl DummyOptions {
    /// 严格解析：不认识的选项导致打开失败
    pub fn parse(config: &str) -> Result<Self> {
        let tokens = ConfigTokens::parse(config);
        let mut opts = Self::default();

        for token in &tokens {
            match token.key.as_str() {
                "device" if token.is_option() => {}
                "width" => opts.width = token.parse_value()?,
                "height" => opts.height = token.parse_value()?,
                "fps" => opts.fps = token.parse_value()?,
                "source" => opts.source = token.parse_value()?,
                "focal" => opts.focal_length = token.parse_value()?,
                "identity" => opts.identity = Some(token.parse_value()?),
                "format" => match token.parse_value::<PixelFormat>() {
                    Ok(fmt) => opts.format = fmt,
                    // Dummy 对不认识的格式回退到默认值，而不是失败
                    Err(_) => tracing::warn!(
                        target: "arvideo::dummy",
                        "Unsupported pixel format '{}' requested. Using default {}.",
                        token.value.as_deref().unwrap_or_default(),
                        DEFAULT_FORMAT
                    ),
                },
                // 由会话的标定解析器读取
                "cachedir" => {}
                "camcalibbydevid" => opts.camcalib_by_dev_id = true,
                _ => {
                    tracing::error!(target: "arvideo::dummy", "Error: unrecognised configuration option '{}'.", token.raw);
                    return Err(VideoError::BackendInitFailed(format!(
                        "Dummy: unrecognised option '{}'",
                        token.raw
                    )));
                }
            }
        }

        if opts.width == 0 || opts.height == 0 {
            return Err(VideoError::BackendInitFailed(format!(
                "Dummy: invalid size {}x{}",
                opts.width, opts.height
            )));
        }
        // 4:2:0 需要偶数尺寸，报告能交付的最接近尺寸
        if opts.format.is_planar() && (opts.width % 2 == 1 || opts.height % 2 == 1) {
            let (w, h) = (opts.width.max(2) & !1, opts.height.max(2) & !1);
            tracing::warn!(
                target: "arvideo::dummy",
                "{}x{} is not valid for {}, delivering {}x{}",
                opts.width, opts.height, opts.format, w, h
            );
            opts.width = w;
            opts.height = h;
        }
        if opts.fps == 0 {
            tracing::warn!(target: "arvideo::dummy", "fps=0 requested, using {}", DEFAULT_FPS);
            opts.fps = DEFAULT_FPS;
        }
        Ok(opts)
    }
}

/// 打开 Dummy 设备
pub fn open(config: &str) -> Result<DummyBackend> {
    let opts = DummyOptions::parse(config)?;
    let identity = match &opts.identity {
        Some(id) => id.clone(),
        None => DeviceIdentity::from_host(opts.camcalib_by_dev_id),
    };

    tracing::info!(
        target: "arvideo::dummy",
        "Dummy source opened: {}x{} {} @ {} fps",
        opts.width,
        opts.height,
        opts.format,
        opts.fps
    );

    Ok(DummyBackend {
        pattern: TestPattern::new(opts.width, opts.height, opts.format),
        opts,
        identity,
        sink: None,
        producer: None,
        closed: false,
    })
}

/// 合成测试图案后端
///
/// Poll 模式下每次 poll 生成一帧；Push 模式下由自己的线程按 fps 推送。
#[derive(Debug)]
pub struct DummyBackend {
    opts: DummyOptions,
    identity: DeviceIdentity,
    pattern: TestPattern,
    sink: Option<FrameSink>,
    producer: Option<Producer>,
    closed: bool,
}

impl DummyBackend {
    pub fn options(&self) -> &DummyOptions {
        &self.opts
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.opts.fps as u64)
    }
}

impl Backend for DummyBackend {
    fn device_type(&self) -> DeviceType {
        DeviceType::Dummy
    }

    fn size(&self) -> (u32, u32) {
        (self.opts.width, self.opts.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.opts.format
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::POLL | Capabilities::PUSH | Capabilities::IDENTITY;
        if self.opts.format.is_planar() {
            caps |= Capabilities::ZERO_COPY;
        }
        caps
    }

    fn cap_start(&mut self, sink: FrameSink, mode: DeliveryMode) -> Result<()> {
        if self.closed {
            return Err(VideoError::NotOpen);
        }
        if self.sink.is_some() {
            return Err(VideoError::Busy);
        }

        if mode == DeliveryMode::Push {
            // 生产者线程拥有一份独立的图案生成器，从当前帧号继续
            let mut pattern = self.pattern.clone();
            let producer = Producer::spawn(
                "arvideo-dummy",
                sink.clone(),
                self.frame_interval(),
                move |sink| {
                    sink.deliver(pattern.next_frame()?);
                    Ok(())
                },
            )?;
            self.producer = Some(producer);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn poll(&mut self) -> Result<()> {
        if self.producer.is_some() {
            return Ok(());
        }
        if let Some(sink) = &self.sink {
            sink.deliver(self.pattern.next_frame()?);
        }
        Ok(())
    }

    fn cap_stop(&mut self) -> Result<()> {
        if self.sink.take().is_none() {
            return Err(VideoError::Failed("Dummy: not capturing".into()));
        }
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
        tracing::debug!(target: "arvideo::dummy", "Dummy source closed");
        Ok(())
    }

    fn get_int(&self, key: IntParam) -> Result<i32> {
        match key {
            IntParam::CameraIndex => Ok(self.opts.source),
            IntParam::CameraFace => Ok(0),
            IntParam::Fps => Ok(self.opts.fps as i32),
            _ => Err(VideoError::NotSupported),
        }
    }

    fn get_double(&self, key: DoubleParam) -> Result<f64> {
        match key {
            DoubleParam::FocalLength => Ok(self.opts.focal_length),
        }
    }

    fn set_double(&mut self, key: DoubleParam, value: f64) -> Result<()> {
        match key {
            DoubleParam::FocalLength => {
                self.opts.focal_length = value;
                Ok(())
            }
        }
    }

    fn get_string(&self, key: StringParam) -> Result<String> {
        match key {
            StringParam::DeviceId => Ok(self.identity.to_string()),
            _ => Err(VideoError::NotSupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_options() {
        let opts = DummyOptions::parse(
            r#"-device=Dummy -width=320 -height=240 -format=nv21 -fps=60 -source=1 -focal=0.0035 -identity="Acme/Model1/BoardX" -cachedir=/tmp -camcalibbydevid"#,
        )
        .unwrap();
        assert_eq!((opts.width, opts.height), (320, 240));
        assert_eq!(opts.format, PixelFormat::Nv21);
        assert_eq!(opts.fps, 60);
        assert_eq!(opts.source, 1);
        assert_eq!(opts.identity.unwrap().to_string(), "Acme/Model1/BoardX");
        assert!(opts.camcalib_by_dev_id);
    }

    #[test]
    fn rejects_unknown_option() {
        let err = DummyOptions::parse("-device=Dummy -foo=bar").unwrap_err();
        assert!(matches!(err, VideoError::BackendInitFailed(_)));
    }

    #[test]
    fn unsupported_format_falls_back() {
        let opts = DummyOptions::parse("-format=h264").unwrap();
        assert_eq!(opts.format, DEFAULT_FORMAT);
    }

    #[test]
    fn odd_planar_size_rounds_down() {
        let opts = DummyOptions::parse("-width=641 -height=481 -format=420f").unwrap();
        assert_eq!((opts.width, opts.height), (640, 480));
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let mut dev = open("-identity=a/b/c").unwrap();
        assert!(dev.cap_stop().is_err());
        dev.close().unwrap();
        dev.close().unwrap();
    }
}
