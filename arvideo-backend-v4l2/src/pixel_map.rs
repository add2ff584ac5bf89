use arvideo_core::pixel_format::{FourCC, PixelFormat};
use v4l::format::fourcc::FourCC as V4lFourCC;

/// 将 v4l crate 的 FourCC 转换为 arvideo 的像素格式
/// 压缩格式 (MJPG/H264) 和 Bayer 等没有对应项，返回 None
pub fn from_v4l_fourcc(cc: V4lFourCC) -> Option<PixelFormat> {
    // 提取 u32 原始值
    let code: u32 = cc.into();
    let core_cc = FourCC(code);

    let fmt = PixelFormat::from_fourcc(core_cc);
    if fmt.is_none() {
        tracing::debug!(target: "arvideo::v4l2", "V4L2 pixel format {} has no arvideo equivalent", core_cc);
    }
    fmt
}

/// 将 arvideo 的像素格式转换为 v4l 的 FourCC
/// 用于请求设备设置格式
pub fn to_v4l_fourcc(fmt: PixelFormat) -> V4lFourCC {
    V4lFourCC::new(&fmt.fourcc().0.to_le_bytes())
}
