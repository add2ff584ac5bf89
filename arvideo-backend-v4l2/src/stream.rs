use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use v4l::buffer::Type;

// Stream 用于 start (stop 由 mmap::Stream 的 Drop 完成)，CaptureStream 用于 next
use v4l::io::traits::{CaptureStream, Stream as V4lStream};

use arvideo_core::error::{Result, VideoError};
use arvideo_core::frame::FrameBuffer;
use arvideo_core::pixel_format::PixelFormat;
use arvideo_core::time::CaptureTime;

/// 出队等待的上限，超时后生产者线程回到循环顶部检查停止标志
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// mmap 采集流，由生产者线程独占
pub struct V4l2Stream {
    inner: v4l::io::mmap::Stream<'static>,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// 驱动实际使用的行跨度 (bytesperline)
    stride: usize,
    _dev: Arc<v4l::Device>,
}

// mmap 缓冲区只在拥有它的生产者线程中访问
unsafe impl Send for V4l2Stream {}

impl std::fmt::Debug for V4l2Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Stream")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("stride", &self.stride)
            .finish()
    }
}

impl V4l2Stream {
    /// 申请 buffer (mmap) 并开启 DMA
    pub fn start(
        dev: Arc<v4l::Device>,
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: u32,
        buf_count: u32,
    ) -> Result<Self> {
        let mut inner =
            v4l::io::mmap::Stream::with_buffers(&dev, Type::VideoCapture, buf_count).map_err(VideoError::Io)?;
        // 默认 poll 无限等待，设备停止出帧时 stop/join 会永远挂住
        inner.set_timeout(DEQUEUE_TIMEOUT);
        V4lStream::start(&mut inner).map_err(VideoError::Io)?;

        Ok(Self {
            inner,
            width,
            height,
            format,
            stride: stride as usize,
            _dev: dev,
        })
    }

    /// 读取下一帧，最多等待 [`DEQUEUE_TIMEOUT`]
    ///
    /// 超时返回 `Ok(None)`。
    /// 驱动缓冲区在下一次出队时会被复用，所以这里拷贝一次到 Bytes
    /// (行有填充时逐行去掉)；半平面格式随后零拷贝地切分为两个平面。
    pub fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        let (buf, meta) = match CaptureStream::next(&mut self.inner) {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(VideoError::Io(e)),
        };
        let time = CaptureTime::now();

        let used = (meta.bytesused as usize).min(buf.len());
        let Some(data) = pack_rows(&buf[..used], self.width, self.height, self.format, self.stride) else {
            return Err(VideoError::Failed(format!(
                "short V4L2 frame #{}: {} bytes for {}x{} {} (stride {})",
                meta.sequence, used, self.width, self.height, self.format, self.stride
            )));
        };

        let mut frame = if self.format.is_planar() {
            FrameBuffer::semi_planar(self.width, self.height, self.format, data)?
        } else {
            FrameBuffer::packed(self.width, self.height, self.format, data)
        };
        frame.time = time;
        Ok(Some(frame))
    }
}

/// 把按 `stride` 排布的行拷贝为紧密排列的一帧
///
/// 半平面格式的 luma 与 chroma 使用同一个 bytesperline。
/// 数据不足一帧时返回 None。
fn pack_rows(src: &[u8], width: u32, height: u32, format: PixelFormat, stride: usize) -> Option<Bytes> {
    let expected = format.frame_size(width, height);
    let luma_row = width as usize * format.pixel_size();
    let stride = stride.max(luma_row);

    // 1. 无填充：整块拷贝
    if stride == luma_row {
        return (src.len() >= expected).then(|| Bytes::copy_from_slice(&src[..expected]));
    }

    // 2. 逐行拷贝 (luma 平面，然后是 chroma 平面)
    let mut planes = vec![(luma_row, height as usize)];
    if format.is_planar() {
        planes.push((2 * (width as usize).div_ceil(2), (height as usize).div_ceil(2)));
    }
    let mut out = Vec::with_capacity(expected);
    let mut offset = 0;
    for (row_bytes, rows) in planes {
        for _ in 0..rows {
            out.extend_from_slice(src.get(offset..offset + row_bytes)?);
            offset += stride;
        }
    }
    Some(Bytes::from(out))
}
