#![warn(missing_debug_implementations, rust_2018_idioms)]

pub(crate) mod internal;
pub mod videoio;

pub use videoio::backend::{BackendRegistry, Resolved};
pub use videoio::compat;
pub use videoio::{CaptureSession, SessionState};

// 重新导出底层 crate，用户只需依赖 arvideo
pub use arvideo_calib as calib;
pub use arvideo_core as core;

/// 预置模块，用户可以通过 `use arvideo::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::videoio::backend::BackendRegistry;
    pub use crate::videoio::{CaptureSession, SessionState};
    pub use arvideo_calib::{CalibrationResult, CalibrationState, CameraParams, DeviceIdentity};
    pub use arvideo_core::prelude::*;
}
