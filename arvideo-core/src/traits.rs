use bitflags::bitflags;

use crate::device::DeviceType;
use crate::error::{Result, VideoError};
use crate::params::{DoubleParam, IntParam, StringParam};
use crate::pixel_format::PixelFormat;
use crate::slot::{DeliveryMode, FrameSink};

bitflags! {
    /// 后端能力位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// 支持由 get_image 驱动的 poll 交付
        const POLL = 1 << 0;
        /// 拥有自己的生产者线程，支持异步回调交付
        const PUSH = 1 << 1;
        /// 平面数据零拷贝地切分自同一块内存
        const ZERO_COPY = 1 << 2;
        /// 能给出设备身份串 (StringParam::DeviceId)，可以做标定查询
        const IDENTITY = 1 << 3;
        /// 暴露硬件控制项 (曝光/增益/对焦/变焦)
        const CONTROLS = 1 << 4;
    }
}

bitflags! {
    /// 输入源属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SourceFlags: u32 {
        const FRONT_FACING = 1 << 0;
        const BACK_FACING = 1 << 1;
        const DEFAULT = 1 << 2;
        /// 名称/ID 在当前系统上稳定，可以直接写进配置
        const STABLE_ID = 1 << 3;
    }
}

/// 可用输入源信息
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SourceInfo {
    /// 对用户友好的显示名称 (e.g. "Logitech C920")
    pub name: String,

    /// 唯一 ID (e.g. "/dev/video0"、图片路径)
    pub uid: String,

    /// 打开此输入源所需的配置片段，例如 `-dev=/dev/video0`
    pub open_token: String,

    #[cfg_attr(feature = "serialize", serde(skip))]
    pub flags: SourceFlags,
}

/// 后端接收的配置范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    /// 完整配置字符串
    Full,
    /// 只接收 `-device=` token 之后的子串 (后端自己的语法与 `-key=value` 不兼容)
    FollowingDevice,
}

/// 选项说明条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDoc {
    pub option: &'static str,
    pub description: &'static str,
}

/// 1. 驱动入口：每种 DeviceType 一个，注册在 BackendRegistry 中
pub trait Driver: Send + Sync {
    fn device_type(&self) -> DeviceType;

    fn config_scope(&self) -> ConfigScope {
        ConfigScope::Full
    }

    /// 枚举可用输入源
    fn list_sources(&self, _config: &str) -> Result<Vec<SourceInfo>> {
        Err(VideoError::NotSupported)
    }

    /// 打开设备并完成格式协商
    /// 失败时必须已经释放全部中间资源
    fn open(&self, config: &str) -> Result<Box<dyn Backend>>;

    /// 该驱动接受的选项
    fn option_help(&self) -> &'static [OptionDoc] {
        &[]
    }
}

/// 2. 已打开的后端实例
///
/// 尺寸与像素格式在 open 时确定，之后不再改变。
/// 参数访问默认返回 NotSupported，后端按需覆盖。
pub trait Backend: Send {
    fn device_type(&self) -> DeviceType;

    /// 协商后的 (width, height)
    fn size(&self) -> (u32, u32);

    fn pixel_format(&self) -> PixelFormat;

    fn capabilities(&self) -> Capabilities;

    /// 开始采集。帧通过 sink 发布；Push 模式下后端需要启动自己的生产者线程。
    fn cap_start(&mut self, sink: FrameSink, mode: DeliveryMode) -> Result<()>;

    /// Poll 模式下由 get_image 调用，最多产生一帧，不能阻塞等待
    fn poll(&mut self) -> Result<()> {
        Ok(())
    }

    /// 停止采集，返回前回收生产者线程
    fn cap_stop(&mut self) -> Result<()>;

    /// 释放全部资源 (幂等)
    fn close(&mut self) -> Result<()>;

    /// 设备 ID 对 (厂商相关)
    fn get_id(&self) -> Result<(u32, u32)> {
        Err(VideoError::NotSupported)
    }

    fn get_int(&self, _key: IntParam) -> Result<i32> {
        Err(VideoError::NotSupported)
    }

    fn set_int(&mut self, _key: IntParam, _value: i32) -> Result<()> {
        Err(VideoError::NotSupported)
    }

    fn get_double(&self, _key: DoubleParam) -> Result<f64> {
        Err(VideoError::NotSupported)
    }

    fn set_double(&mut self, _key: DoubleParam, _value: f64) -> Result<()> {
        Err(VideoError::NotSupported)
    }

    fn get_string(&self, _key: StringParam) -> Result<String> {
        Err(VideoError::NotSupported)
    }

    fn set_string(&mut self, _key: StringParam, _value: &str) -> Result<()> {
        Err(VideoError::NotSupported)
    }

    /// 导出当前配置快照 (用于调试与持久化)
    #[cfg(feature = "serialize")]
    fn export_state(&self) -> Result<serde_json::Value> {
        let (w, h) = self.size();
        Ok(serde_json::json!({
            "device": self.device_type().name(),
            "width": w,
            "height": h,
            "format": self.pixel_format().name(),
        }))
    }
}
