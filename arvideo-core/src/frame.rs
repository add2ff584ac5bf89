use bytes::Bytes;

use crate::error::{Result, VideoError};
use crate::pixel_format::PixelFormat;
use crate::time::CaptureTime;

/// 帧数据载荷
///
/// Bytes 是引用计数的只读视图：
/// - Packed: 一整块连续内存
/// - Planar: 有序的平面列表，可能共享同一块底层内存 (零拷贝切分)
///
/// 后端交付的内存只要还有 Bytes 持有就不会被释放，
/// 所以消费者保留旧帧的 Arc 时看到的永远是完整的旧帧，而不是被覆写中的数据。
#[derive(Debug, Clone)]
pub enum Payload {
    Packed(Bytes),
    Planar(Vec<Bytes>),
}

/// 核心帧结构体
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub payload: Payload,

    /// 图像宽度 (Pixels)
    pub width: u32,

    /// 图像高度 (Pixels)
    pub height: u32,

    pub format: PixelFormat,

    /// 帧序号，由交付槽在交付时分配 (每次 CapStart 从 0 开始)
    pub sequence: u64,

    /// 采集时间，交付槽保证单调不减
    pub time: CaptureTime,
}

impl FrameBuffer {
    /// 单平面 (packed/mono) 帧
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::Packed(data.into()),
            width,
            height,
            format,
            sequence: 0,
            time: CaptureTime::now(),
        }
    }

    /// 多平面帧，平面由调用方给出
    pub fn planar(width: u32, height: u32, format: PixelFormat, planes: Vec<Bytes>) -> Self {
        Self {
            payload: Payload::Planar(planes),
            width,
            height,
            format,
            sequence: 0,
            time: CaptureTime::now(),
        }
    }

    /// 【零拷贝】把一块连续的 4:2:0 半平面数据切分为 luma + chroma 两个平面
    /// 两个平面共享同一块底层内存
    pub fn semi_planar(width: u32, height: u32, format: PixelFormat, data: Bytes) -> Result<Self> {
        if !format.is_planar() {
            return Err(VideoError::InvalidConfig(format!(
                "{} is not a semi-planar format",
                format
            )));
        }
        let luma_len = width as usize * height as usize;
        let total = format.frame_size(width, height);
        if data.len() < total {
            return Err(VideoError::Failed(format!(
                "semi-planar frame too short: {} < {} bytes",
                data.len(),
                total
            )));
        }
        let luma = data.slice(0..luma_len);
        let chroma = data.slice(luma_len..total);
        Ok(Self::planar(width, height, format, vec![luma, chroma]))
    }

    pub fn plane_count(&self) -> usize {
        match &self.payload {
            Payload::Packed(_) => 1,
            Payload::Planar(p) => p.len(),
        }
    }

    /// 获取某个平面的数据
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        match &self.payload {
            Payload::Packed(b) if index == 0 => Some(b),
            Payload::Packed(_) => None,
            Payload::Planar(p) => p.get(index).map(|b| b.as_ref()),
        }
    }

    /// 主数据 (packed 的全部数据，或 planar 的 luma 平面)
    pub fn data(&self) -> &[u8] {
        self.plane(0).unwrap_or(&[])
    }

    /// 以 Pod 类型查看某个平面，例如 RGBA 视为 `[u8; 4]`
    /// 长度或对齐不满足时返回 None
    pub fn plane_as<T: bytemuck::Pod>(&self, index: usize) -> Option<&[T]> {
        self.plane(index)
            .and_then(|p| bytemuck::try_cast_slice(p).ok())
    }

    /// 拷贝出所有平面 (依次拼接)，用于需要长期保存的消费者
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Packed(b) => b.to_vec(),
            Payload::Planar(p) => p.iter().flat_map(|b| b.iter().copied()).collect(),
        }
    }

    /// 每行字节数 (plane 0)
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.pixel_size()
    }
}
