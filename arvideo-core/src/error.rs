use crate::device::DeviceType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Session not open")]
    NotOpen,

    #[error("Session already open")]
    AlreadyOpen,

    /// 与正在进行的操作冲突 (重复 CapStart，或第二个标定请求)
    #[error("Device busy: operation already in flight")]
    Busy,

    /// 操作本身合法，但当前后端/构建不支持
    #[error("Operation or parameter not supported by this backend")]
    NotSupported,

    #[error("Device \"{0}\" not supported on this build/architecture/system")]
    UnsupportedOnThisBuild(DeviceType),

    #[error("Backend initialisation failed: {0}")]
    BackendInitFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Calibration lookup failed: network unavailable")]
    FailedNoNetwork,

    #[error("Operation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VideoError {
    /// 兼容旧接口的平铺返回码。
    /// 旧接口里 "未打开" 与 "不支持" 都是 -1，这里只在边界处做这种合并。
    pub fn legacy_code(&self) -> i32 {
        -1
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;
