use std::sync::Arc;

use v4l::control::{Control, Value};
use v4l::Device;

use arvideo_core::error::{Result, VideoError};
use arvideo_core::params::IntParam;

// --- 手动定义 V4L2 标准常量 (Linux ABI) ---
// 来源: /usr/include/linux/v4l2-controls.h

const V4L2_CID_BASE: u32 = 0x00980000;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = 0x009A0000;

// Gain (增益) 是 User Class Control
const CID_GAIN: u32 = V4L2_CID_BASE + 19; // 0x00980913

// 以下是 Camera Class Controls
const CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1; // 0x009A0901
const CID_EXPOSURE_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 2; // 0x009A0902
const CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 10; // 0x009A090A
const CID_FOCUS_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 11; // 0x009A090B
const CID_ZOOM_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 13; // 0x009A090D

/// 1 = V4L2_EXPOSURE_MANUAL
const EXPOSURE_MANUAL: i64 = 1;

/// 硬件控制项，映射到整数参数键
/// V4L2 允许多线程访问同一个 fd，所以采集线程运行时也可以调整
#[derive(Clone)]
pub struct V4l2Controls {
    dev: Arc<Device>,
}

impl std::fmt::Debug for V4l2Controls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Controls").finish_non_exhaustive()
    }
}

impl V4l2Controls {
    pub fn new(dev: Arc<Device>) -> Self {
        Self { dev }
    }

    /// 参数键对应的 CID，非硬件控制项返回 None
    pub fn cid(key: IntParam) -> Option<u32> {
        match key {
            IntParam::ExposureAbsolute => Some(CID_EXPOSURE_ABSOLUTE),
            IntParam::Gain => Some(CID_GAIN),
            IntParam::FocusAbsolute => Some(CID_FOCUS_ABSOLUTE),
            IntParam::ZoomAbsolute => Some(CID_ZOOM_ABSOLUTE),
            _ => None,
        }
    }

    pub fn get(&self, key: IntParam) -> Result<i32> {
        let cid = Self::cid(key).ok_or(VideoError::NotSupported)?;
        let ctrl = self.dev.control(cid).map_err(not_supported_or_io)?;
        match ctrl.value {
            Value::Integer(v) => Ok(v as i32),
            Value::Boolean(b) => Ok(b as i32),
            _ => Err(VideoError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid value type for control {:#x}", cid),
            ))),
        }
    }

    pub fn set(&self, key: IntParam, value: i32) -> Result<()> {
        let cid = Self::cid(key).ok_or(VideoError::NotSupported)?;

        // 手动值生效前需要先关闭对应的自动模式，设备不支持时忽略
        match key {
            IntParam::ExposureAbsolute => {
                let _ = self.dev.set_control(Control {
                    id: CID_EXPOSURE_AUTO,
                    value: Value::Integer(EXPOSURE_MANUAL),
                });
            }
            IntParam::FocusAbsolute => {
                let _ = self.dev.set_control(Control {
                    id: CID_FOCUS_AUTO,
                    value: Value::Boolean(false),
                });
            }
            _ => {}
        }

        self.dev
            .set_control(Control {
                id: cid,
                value: Value::Integer(value as i64),
            })
            .map_err(not_supported_or_io)
    }

    /// 导出当前控制项快照
    pub fn export_state(&self) -> serde_json::Value {
        let read = |cid: u32| self.dev.control(cid).ok().map(|c| format!("{:?}", c.value));
        serde_json::json!({
            "exposure": read(CID_EXPOSURE_ABSOLUTE),
            "gain": read(CID_GAIN),
            "focus": read(CID_FOCUS_ABSOLUTE),
            "zoom": read(CID_ZOOM_ABSOLUTE),
        })
    }
}

/// 设备没有该控制项时 ioctl 返回 EINVAL
fn not_supported_or_io(e: std::io::Error) -> VideoError {
    if e.kind() == std::io::ErrorKind::InvalidInput {
        VideoError::NotSupported
    } else {
        VideoError::Io(e)
    }
}
