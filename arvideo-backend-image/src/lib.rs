pub mod decode;
pub mod device;

use std::path::Path;
use std::sync::Arc;

use arvideo_core::device::DeviceType;
use arvideo_core::error::Result;
use arvideo_core::traits::{Backend, Driver, OptionDoc, SourceFlags, SourceInfo};

/// Image 驱动：把一组静态图片当作视频源循环播放
#[derive(Debug, Clone, Default)]
pub struct ImageDriver;

impl ImageDriver {
    pub fn new() -> Self {
        Self
    }
}

const OPTIONS: &[OptionDoc] = &[
    OptionDoc { option: "-image=\"path\"", description: "image file to play; repeat to cycle through several images." },
    OptionDoc { option: "-width=N", description: "scale images to this width (default: width of the first image)." },
    OptionDoc { option: "-height=N", description: "scale images to this height (default: height of the first image)." },
    OptionDoc { option: "-format=X", description: "one of rgb, bgr, rgba, bgra, abgr, argb, mono (default rgb)." },
    OptionDoc { option: "-fps=N", description: "frame rate of asynchronous delivery (default 10)." },
];

impl Driver for ImageDriver {
    fn device_type(&self) -> DeviceType {
        DeviceType::Image
    }

    /// 列出配置中存在的图片文件
    fn list_sources(&self, config: &str) -> Result<Vec<SourceInfo>> {
        let opts = device::ImageOptions::parse(config)?;
        Ok(opts
            .images
            .iter()
            .filter(|p| p.is_file())
            .enumerate()
            .map(|(i, p)| SourceInfo {
                name: file_name(p),
                uid: p.display().to_string(),
                open_token: format!("-image=\"{}\"", p.display()),
                flags: if i == 0 {
                    SourceFlags::DEFAULT | SourceFlags::STABLE_ID
                } else {
                    SourceFlags::STABLE_ID
                },
            })
            .collect())
    }

    fn open(&self, config: &str) -> Result<Box<dyn Backend>> {
        Ok(Box::new(device::open(config)?))
    }

    fn option_help(&self) -> &'static [OptionDoc] {
        OPTIONS
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

pub fn default_driver() -> Arc<dyn Driver> {
    Arc::new(ImageDriver::new())
}
