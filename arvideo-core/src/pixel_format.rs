use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::VideoError;

/// 四字符代码 (Four Character Code)，视频工业标准
/// 仅用于与平台驱动 (V4L2 等) 之间的格式映射
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FourCC(pub u32);

impl FourCC {
    /// 从 ASCII 字符创建 FourCC
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self((a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24))
    }

    pub const RGB3: Self = Self::new(b'R', b'G', b'B', b'3');
    pub const BGR3: Self = Self::new(b'B', b'G', b'R', b'3');
    /// V4L2_PIX_FMT_RGBA32
    pub const AB24: Self = Self::new(b'A', b'B', b'2', b'4');
    /// V4L2_PIX_FMT_BGRA32
    pub const RA24: Self = Self::new(b'R', b'A', b'2', b'4');
    /// V4L2_PIX_FMT_ARGB32
    pub const BA24: Self = Self::new(b'B', b'A', b'2', b'4');
    /// V4L2_PIX_FMT_ABGR32
    pub const AR24: Self = Self::new(b'A', b'R', b'2', b'4');
    pub const GREY: Self = Self::new(b'G', b'R', b'E', b'Y');
    /// UYVY 4:2:2 (Apple 称之为 2vuy)
    pub const UYVY: Self = Self::new(b'U', b'Y', b'V', b'Y');
    /// YUYV 4:2:2 (Apple 称之为 yuvs)
    pub const YUYV: Self = Self::new(b'Y', b'U', b'Y', b'V');
    pub const RGBP: Self = Self::new(b'R', b'G', b'B', b'P');
    pub const RGBO: Self = Self::new(b'R', b'G', b'B', b'O');
    pub const R444: Self = Self::new(b'R', b'4', b'4', b'4');
    /// NV12 4:2:0 - Y 平面 + 交织 CbCr 平面
    pub const NV12: Self = Self::new(b'N', b'V', b'1', b'2');
    /// NV21 4:2:0 - Y 平面 + 交织 CrCb 平面
    pub const NV21: Self = Self::new(b'N', b'V', b'2', b'1');
}

impl Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();

        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// 像素格式枚举
/// 判别值与旧接口的整数编号一致，不能随意调整顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum PixelFormat {
    Rgb = 0,
    Bgr = 1,
    Rgba = 2,
    Bgra = 3,
    Abgr = 4,
    Mono = 5,
    Argb = 6,
    /// 8-bit 4:2:2 Component Y'CbCr, Cb Y'0 Cr Y'1 顺序
    TwoVuy = 7,
    /// 8-bit 4:2:2 Component Y'CbCr, Y'0 Cb Y'1 Cr 顺序
    Yuvs = 8,
    Rgb565 = 9,
    Rgba5551 = 10,
    Rgba4444 = 11,
    /// 双平面 4:2:0 video-range (luma=[16,235] chroma=[16,240])
    Yuv420v = 12,
    /// 双平面 4:2:0 full-range
    Yuv420f = 13,
    /// 双平面 4:2:0，chroma 平面为 CrCb 顺序
    Nv21 = 14,
}

impl PixelFormat {
    /// 全部格式，按编号排序
    pub const ALL: [PixelFormat; 15] = [
        Self::Rgb,
        Self::Bgr,
        Self::Rgba,
        Self::Bgra,
        Self::Abgr,
        Self::Mono,
        Self::Argb,
        Self::TwoVuy,
        Self::Yuvs,
        Self::Rgb565,
        Self::Rgba5551,
        Self::Rgba4444,
        Self::Yuv420v,
        Self::Yuv420f,
        Self::Nv21,
    ];

    /// 每像素字节数
    /// 对于双平面格式只报告 luma 平面 (plane 0) 的大小
    pub const fn pixel_size(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra | Self::Abgr | Self::Argb => 4,
            Self::Mono | Self::Yuv420v | Self::Yuv420f | Self::Nv21 => 1,
            Self::TwoVuy | Self::Yuvs | Self::Rgb565 | Self::Rgba5551 | Self::Rgba4444 => 2,
        }
    }

    /// 平面数量：packed/mono 为 1，半平面 (luma + 交织 chroma) 为 2
    pub const fn plane_count(self) -> usize {
        match self {
            Self::Yuv420v | Self::Yuv420f | Self::Nv21 => 2,
            _ => 1,
        }
    }

    pub const fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /// 一帧完整图像所需的字节数 (所有平面之和)
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize * self.pixel_size();
        if self.is_planar() {
            // 4:2:0 chroma 平面：宽高各减半，每个样本 2 字节 (CbCr 交织)
            luma + 2 * (width as usize).div_ceil(2) * (height as usize).div_ceil(2)
        } else {
            luma
        }
    }

    /// 旧接口整数编号
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Bgr => "BGR",
            Self::Rgba => "RGBA",
            Self::Bgra => "BGRA",
            Self::Abgr => "ABGR",
            Self::Mono => "MONO",
            Self::Argb => "ARGB",
            Self::TwoVuy => "2vuy",
            Self::Yuvs => "yuvs",
            Self::Rgb565 => "RGB_565",
            Self::Rgba5551 => "RGBA_5551",
            Self::Rgba4444 => "RGBA_4444",
            Self::Yuv420v => "420v",
            Self::Yuv420f => "420f",
            Self::Nv21 => "NV21",
        }
    }

    /// 对应的 V4L2 FourCC
    pub const fn fourcc(self) -> FourCC {
        match self {
            Self::Rgb => FourCC::RGB3,
            Self::Bgr => FourCC::BGR3,
            Self::Rgba => FourCC::AB24,
            Self::Bgra => FourCC::AR24,
            Self::Abgr => FourCC::RA24,
            Self::Argb => FourCC::BA24,
            Self::Mono => FourCC::GREY,
            Self::TwoVuy => FourCC::UYVY,
            Self::Yuvs => FourCC::YUYV,
            Self::Rgb565 => FourCC::RGBP,
            Self::Rgba5551 => FourCC::RGBO,
            Self::Rgba4444 => FourCC::R444,
            // V4L2 没有区分 video-range 与 full-range 的 NV12
            Self::Yuv420v | Self::Yuv420f => FourCC::NV12,
            Self::Nv21 => FourCC::NV21,
        }
    }

    /// 从 FourCC 反查，NV12 映射为 420f
    pub fn from_fourcc(cc: FourCC) -> Option<Self> {
        if cc == FourCC::NV12 {
            return Some(Self::Yuv420f);
        }
        Self::ALL.iter().copied().find(|f| f.fourcc() == cc)
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 从配置字符串中的取值解析 (大小写不敏感)
impl FromStr for PixelFormat {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let fmt = match lower.as_str() {
            "rgb" => Self::Rgb,
            "bgr" => Self::Bgr,
            "rgba" => Self::Rgba,
            "bgra" => Self::Bgra,
            "abgr" => Self::Abgr,
            "argb" => Self::Argb,
            "mono" | "grey" | "gray" => Self::Mono,
            "2vuy" | "uyvy" => Self::TwoVuy,
            "yuvs" | "yuyv" => Self::Yuvs,
            "rgb_565" | "rgb565" => Self::Rgb565,
            "rgba_5551" | "rgba5551" => Self::Rgba5551,
            "rgba_4444" | "rgba4444" => Self::Rgba4444,
            "420v" => Self::Yuv420v,
            "420f" | "nv12" => Self::Yuv420f,
            "nv21" => Self::Nv21,
            _ => {
                return Err(VideoError::InvalidConfig(format!(
                    "unknown pixel format '{}'",
                    s
                )))
            }
        };
        Ok(fmt)
    }
}

impl TryFrom<i32> for PixelFormat {
    type Error = VideoError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(VideoError::NotSupported)
    }
}
