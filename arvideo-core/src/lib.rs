// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod builder;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod params;
pub mod pixel_format;
pub mod producer;
pub mod slot;
pub mod telemetry;
pub mod time;
pub mod traits;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::builder::CaptureConfig;
    pub use crate::config::{ConfigToken, ConfigTokens};
    pub use crate::device::DeviceType;
    pub use crate::error::{Result, VideoError};
    pub use crate::frame::{FrameBuffer, Payload};
    pub use crate::params::{DoubleParam, IntParam, StringParam};
    pub use crate::pixel_format::PixelFormat;
    pub use crate::slot::{DeliveryMode, FrameCallback, FrameReader, FrameSink, FrameSlot};
    pub use crate::producer::Producer;
    pub use crate::telemetry::DeliveryTelemetry;
    pub use crate::time::CaptureTime;
    pub use crate::traits::{
        Backend, Capabilities, ConfigScope, Driver, OptionDoc, SourceFlags, SourceInfo,
    };
}

// 重新导出依赖中的关键类型，避免用户版本冲突
pub use bytes::Bytes;

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 版本号编码为单个整数：major<<24 | minor<<16 | patch<<8
/// (通过 IntParam::Version 对外暴露，无需打开设备)
pub fn version_code() -> i32 {
    let mut parts = VERSION
        .split(|c: char| c == '.' || c == '-')
        .map(|p| p.parse::<i32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    (major << 24) | (minor << 16) | (patch << 8)
}
