use crate::device::DeviceType;
use crate::pixel_format::PixelFormat;

/// 强类型的打开请求，最终渲染为配置字符串交给 Dispatcher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureConfig {
    pub device: Option<DeviceType>,
    pub resolution: Option<(u32, u32)>,
    pub format: Option<PixelFormat>,
    pub fps: Option<u32>,
    /// 后端私有选项 (key, value)，value 为 None 表示 flag
    pub options: Vec<(String, Option<String>)>,
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device: DeviceType) -> Self {
        self.device = Some(device);
        self
    }

    /// 添加分辨率要求
    pub fn resolution(mut self, w: u32, h: u32) -> Self {
        self.resolution = Some((w, h));
        self
    }

    /// 添加像素格式要求
    pub fn format(mut self, fmt: PixelFormat) -> Self {
        self.format = Some(fmt);
        self
    }

    /// 添加帧率要求 (仅部分后端支持)
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// 追加后端私有的 `-key=value` 选项
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), Some(value.into())));
        self
    }

    /// 追加后端私有的 `-key` flag
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.options.push((key.into(), None));
        self
    }

    /// 渲染为配置字符串，包含空白的取值会加上双引号
    pub fn to_config_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(d) = self.device {
            parts.push(format!("-device={}", d.name()));
        }
        if let Some((w, h)) = self.resolution {
            parts.push(format!("-width={}", w));
            parts.push(format!("-height={}", h));
        }
        if let Some(f) = self.format {
            parts.push(format!("-format={}", f.name()));
        }
        if let Some(fps) = self.fps {
            parts.push(format!("-fps={}", fps));
        }
        for (k, v) in &self.options {
            match v {
                Some(v) if v.contains([' ', '\t']) => parts.push(format!("-{}=\"{}\"", k, v)),
                Some(v) => parts.push(format!("-{}={}", k, v)),
                None => parts.push(format!("-{}", k)),
            }
        }
        parts.join(" ")
    }
}
