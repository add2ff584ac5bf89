pub mod device;
pub mod pattern;

use std::sync::Arc;

use arvideo_core::device::DeviceType;
use arvideo_core::error::Result;
use arvideo_core::traits::{Backend, Driver, OptionDoc, SourceFlags, SourceInfo};

/// Dummy 驱动
#[derive(Debug, Clone, Default)]
pub struct DummyDriver;

impl DummyDriver {
    pub fn new() -> Self {
        Self
    }
}

const OPTIONS: &[OptionDoc] = &[
    OptionDoc { option: "-width=N", description: "specifies width of image (default 640)." },
    OptionDoc { option: "-height=N", description: "specifies height of image (default 480)." },
    OptionDoc { option: "-format=X", description: "pixel format of the generated frames, e.g. rgb, bgra, mono, 420f, nv21." },
    OptionDoc { option: "-fps=N", description: "frame rate of asynchronous delivery (default 30)." },
    OptionDoc { option: "-source=N", description: "reported camera index (default 0)." },
    OptionDoc { option: "-focal=F", description: "reported lens focal length in metres." },
    OptionDoc { option: "-identity=\"a/b/c\"", description: "device identity used for calibration lookup (default: host identity)." },
    OptionDoc { option: "-cachedir=\"path\"", description: "directory of the calibration cache." },
    OptionDoc { option: "-camcalibbydevid", description: "append the unique device ID to the device identity." },
];

impl Driver for DummyDriver {
    fn device_type(&self) -> DeviceType {
        DeviceType::Dummy
    }

    fn list_sources(&self, _config: &str) -> Result<Vec<SourceInfo>> {
        Ok(vec![SourceInfo {
            name: "Dummy test pattern".into(),
            uid: "dummy:0".into(),
            open_token: "-source=0".into(),
            flags: SourceFlags::DEFAULT | SourceFlags::STABLE_ID,
        }])
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
    Arc::new(DummyDriver::new())
}
