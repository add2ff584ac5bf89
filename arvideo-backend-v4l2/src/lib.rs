// 依赖只在 Linux 上存在，其它平台编译为空 crate
#![cfg(target_os = "linux")]

pub mod controls;
pub mod device;
pub mod pixel_map;
pub mod stream;

use arvideo_core::device::DeviceType;
use arvideo_core::error::Result;
use arvideo_core::traits::{Backend, Driver, OptionDoc, SourceInfo};
use std::sync::Arc;

/// V4L2 驱动单例结构体
/// 通常作为全局单例存在
#[derive(Debug, Clone)]
pub struct V4l2Driver;

impl Default for V4l2Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Driver {
    pub fn new() -> Self {
        Self
    }
}

const OPTIONS: &[OptionDoc] = &[
    OptionDoc { option: "-dev=filepath", description: "specifies the device node (default /dev/video0)." },
    OptionDoc { option: "-source=N", description: "shorthand for -dev=/dev/videoN." },
    OptionDoc { option: "-width=N", description: "requested width; the closest supported size is used." },
    OptionDoc { option: "-height=N", description: "requested height; the closest supported size is used." },
    OptionDoc { option: "-format=X", description: "requested pixel format, e.g. yuyv, uyvy, nv12, nv21, rgb, mono." },
    OptionDoc { option: "-fps=N", description: "requested frame rate." },
    OptionDoc { option: "-buffers=N", description: "number of mmap buffers (2..32, default 4)." },
    OptionDoc { option: "-cachedir=\"path\"", description: "directory of the calibration cache." },
    OptionDoc { option: "-camcalibbydevid", description: "append the unique device ID to the device identity." },
];

// 实现 Driver Trait
impl Driver for V4l2Driver {
    fn device_type(&self) -> DeviceType {
        DeviceType::LinuxV4L2
    }

    fn list_sources(&self, _config: &str) -> Result<Vec<SourceInfo>> {
        device::list_sources()
    }

    fn open(&self, config: &str) -> Result<Box<dyn Backend>> {
        Ok(Box::new(device::open(config)?))
    }

    fn option_help(&self) -> &'static [OptionDoc] {
        OPTIONS
    }
}

// 为了方便直接使用，提供一个默认实例
pub fn default_driver() -> Arc<dyn Driver> {
    Arc::new(V4l2Driver::new())
}
