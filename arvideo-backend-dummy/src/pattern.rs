use bytes::{BufMut, BytesMut};

use arvideo_core::error::Result;
use arvideo_core::frame::FrameBuffer;
use arvideo_core::pixel_format::PixelFormat;

/// 测试图案生成器：随帧号平移的对角渐变
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    format: PixelFormat,
    tick: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// 生成下一帧
    /// 半平面格式整帧写入一块内存，再零拷贝地切分为 luma/chroma 平面
    pub fn next_frame(&mut self) -> Result<FrameBuffer> {
        let (w, h) = (self.width as usize, self.height as usize);
        let t = self.tick as usize;
        self.tick += 1;

        let mut buf = BytesMut::with_capacity(self.format.frame_size(self.width, self.height));
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y + t) & 0xff) as u8;
                put_pixel(&mut buf, self.format, v);
            }
        }

        if self.format.is_planar() {
            // 4:2:0 色度平面：中性灰
            buf.put_bytes(128, 2 * w.div_ceil(2) * h.div_ceil(2));
            return FrameBuffer::semi_planar(self.width, self.height, self.format, buf.freeze());
        }
        Ok(FrameBuffer::packed(self.width, self.height, self.format, buf.freeze()))
    }
}

fn put_pixel(buf: &mut BytesMut, format: PixelFormat, v: u8) {
    let inv = 255 - v;
    match format {
        PixelFormat::Rgb => buf.put_slice(&[v, inv, 128]),
        PixelFormat::Bgr => buf.put_slice(&[128, inv, v]),
        PixelFormat::Rgba => buf.put_slice(&[v, inv, 128, 255]),
        PixelFormat::Bgra => buf.put_slice(&[128, inv, v, 255]),
        PixelFormat::Abgr => buf.put_slice(&[255, 128, inv, v]),
        PixelFormat::Argb => buf.put_slice(&[255, v, inv, 128]),
        // 2 字节 YUV：(Y, chroma) 交错
        PixelFormat::TwoVuy => buf.put_slice(&[128, v]),
        PixelFormat::Yuvs => buf.put_slice(&[v, 128]),
        PixelFormat::Rgb565 => buf.put_u16_le(((v as u16 >> 3) << 11) | ((inv as u16 >> 2) << 5) | 0x10),
        PixelFormat::Rgba5551 => buf.put_u16_le(((v as u16 >> 3) << 11) | ((inv as u16 >> 3) << 6) | (0x10 << 1) | 1),
        PixelFormat::Rgba4444 => buf.put_u16_le(((v as u16 >> 4) << 12) | ((inv as u16 >> 4) << 8) | 0x8f),
        // Mono 与半平面格式的 luma
        PixelFormat::Mono | PixelFormat::Yuv420v | PixelFormat::Yuv420f | PixelFormat::Nv21 => buf.put_u8(v),
    }
}
