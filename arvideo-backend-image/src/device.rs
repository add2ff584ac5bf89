use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use arvideo_core::config::ConfigTokens;
use arvideo_core::device::DeviceType;
use arvideo_core::error::{Result, VideoError};
use arvideo_core::frame::FrameBuffer;
use arvideo_core::params::{IntParam, StringParam};
use arvideo_core::pixel_format::PixelFormat;
use arvideo_core::producer::Producer;
use arvideo_core::slot::{DeliveryMode, FrameSink};
use arvideo_core::traits::{Backend, Capabilities};

use crate::decode;

pub const DEFAULT_FORMAT: PixelFormat = PixelFormat::Rgb;
pub const DEFAULT_FPS: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    pub images: Vec<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: PixelFormat,
    pub fps: u32,
}

impl ImageOptions {
    /// 宽松解析：不认识的选项只记录警告
    pub fn parse(config: &str) -> Result<Self> {
        let tokens = ConfigTokens::parse(config);
        let mut opts = Self {
            images: Vec::new(),
            width: None,
            height: None,
            format: DEFAULT_FORMAT,
            fps: DEFAULT_FPS,
        };

        for token in &tokens {
            match token.key.as_str() {
                "device" => {}
                "image" => opts.images.push(PathBuf::from(token.parse_value::<String>()?)),
                "width" => opts.width = Some(token.parse_value()?),
                "height" => opts.height = Some(token.parse_value()?),
                "fps" => opts.fps = token.parse_value::<u32>()?.max(1),
                // Image 后端无法转换的格式在打开时失败
                "format" => opts.format = token.parse_value()?,
                _ => tracing::warn!(target: "arvideo::image", "Ignoring unrecognised option '{}'.", token.raw),
            }
        }
        Ok(opts)
    }
}

/// 打开图片序列：全部解码并转换为同一尺寸/格式
pub fn open(config: &str) -> Result<ImageBackend> {
    let opts = ImageOptions::parse(config)?;
    if opts.images.is_empty() {
        return Err(VideoError::BackendInitFailed(
            "Image: no images specified, use -image=\"path\"".into(),
        ));
    }
    if !decode::is_supported(opts.format) {
        tracing::error!(target: "arvideo::image", "Pixel format {} is not supported by the Image backend.", opts.format);
        return Err(VideoError::BackendInitFailed(format!(
            "Image: pixel format {} is not supported",
            opts.format
        )));
    }

    let first = decode::load(&opts.images[0])?;
    let width = opts.width.unwrap_or(first.width());
    let height = opts.height.unwrap_or(first.height());
    if width == 0 || height == 0 {
        return Err(VideoError::BackendInitFailed(format!(
            "Image: invalid size {}x{}",
            width, height
        )));
    }

    let mut frames = Vec::with_capacity(opts.images.len());
    frames.push(decode::convert(&first, width, height, opts.format)?);
    for path in &opts.images[1..] {
        let img = decode::load(path)?;
        frames.push(decode::convert(&img, width, height, opts.format)?);
    }

    tracing::info!(
        target: "arvideo::image",
        "Image source opened: {} image(s), {}x{} {}",
        frames.len(),
        width,
        height,
        opts.format
    );

    Ok(ImageBackend {
        playlist: Arc::new(Playlist {
            frames,
            paths: opts.images.clone(),
            width,
            height,
            format: opts.format,
            next: AtomicUsize::new(0),
            current: AtomicUsize::new(usize::MAX),
        }),
        opts,
        sink: None,
        producer: None,
        closed: false,
    })
}

/// 预先转换好的帧，循环播放
#[derive(Debug)]
struct Playlist {
    frames: Vec<Bytes>,
    paths: Vec<PathBuf>,
    width: u32,
    height: u32,
    format: PixelFormat,
    next: AtomicUsize,
    /// 最近一次交付的图片下标 (usize::MAX 表示还没有交付过)
    current: AtomicUsize,
}

impl Playlist {
    fn deliver_next(&self, sink: &FrameSink) {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        // Bytes::clone 只增加引用计数
        let frame = FrameBuffer::packed(self.width, self.height, self.format, self.frames[i].clone());
        if sink.deliver(frame) {
            self.current.store(i, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
pub struct ImageBackend {
    opts: ImageOptions,
    playlist: Arc<Playlist>,
    sink: Option<FrameSink>,
    producer: Option<Producer>,
    closed: bool,
}

impl Backend for ImageBackend {
    fn device_type(&self) -> DeviceType {
        DeviceType::Image
    }

    fn size(&self) -> (u32, u32) {
        (self.playlist.width, self.playlist.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.playlist.format
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::POLL | Capabilities::PUSH
    }

    fn cap_start(&mut self, sink: FrameSink, mode: DeliveryMode) -> Result<()> {
        if self.closed {
            return Err(VideoError::NotOpen);
        }
        if self.sink.is_some() {
            return Err(VideoError::Busy);
        }
        if mode == DeliveryMode::Push {
            let playlist = Arc::clone(&self.playlist);
            let interval = Duration::from_micros(1_000_000 / self.opts.fps as u64);
            self.producer = Some(Producer::spawn("arvideo-image", sink.clone(), interval, move |sink| {
                playlist.deliver_next(sink);
                Ok(())
            })?);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn poll(&mut self) -> Result<()> {
        if self.producer.is_none() {
            if let Some(sink) = &self.sink {
                self.playlist.deliver_next(sink);
            }
        }
        Ok(())
    }

    fn cap_stop(&mut self) -> Result<()> {
        if self.sink.take().is_none() {
            return Err(VideoError::Failed("Image: not capturing".into()));
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
        Ok(())
    }

    fn get_int(&self, key: IntParam) -> Result<i32> {
        match key {
            IntParam::Fps => Ok(self.opts.fps as i32),
            _ => Err(VideoError::NotSupported),
        }
    }

    fn get_string(&self, key: StringParam) -> Result<String> {
        match key {
            StringParam::ImagePath => {
                let i = self.playlist.current.load(Ordering::Relaxed);
                self.playlist
                    .paths
                    .get(i)
                    .map(|p| p.display().to_string())
                    .ok_or(VideoError::NotSupported)
            }
            _ => Err(VideoError::NotSupported),
        }
    }
}
