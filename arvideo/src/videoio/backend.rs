use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arvideo_core::config::ConfigTokens;
use arvideo_core::device::DeviceType;
use arvideo_core::error::{Result, VideoError};
use arvideo_core::traits::{Backend, ConfigScope, Driver, OptionDoc, SourceInfo};

/// 分发结果：选中的设备类型，以及交给该后端的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub device_type: DeviceType,
    /// 后端实际收到的配置 (完整字符串，或 `-device=` 之后的子串)
    pub config: String,
    /// 是否由配置中的 `-device=` 显式选择
    pub explicit: bool,
}

/// 后端注册表：设备类型 -> 驱动
///
/// 内置注册表由 cargo feature 决定包含哪些驱动；测试和嵌入方可以注册自己的驱动。
pub struct BackendRegistry {
    drivers: BTreeMap<DeviceType, Arc<dyn Driver>>,
    default_device: DeviceType,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("default_device", &self.default_device)
            .finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl BackendRegistry {
    /// 空注册表
    pub fn empty(default_device: DeviceType) -> Self {
        Self {
            drivers: BTreeMap::new(),
            default_device,
        }
    }

    /// 根据编译特性注册内置驱动
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty(DeviceType::compile_time_default());

        #[cfg(feature = "backend-dummy")]
        registry.register(arvideo_backend_dummy::default_driver());

        #[cfg(feature = "backend-image")]
        registry.register(arvideo_backend_image::default_driver());

        #[cfg(all(feature = "linux-v4l2", target_os = "linux"))]
        registry.register(arvideo_backend_v4l2::default_driver());

        registry
    }

    /// 注册驱动，同一设备类型后注册的替换先注册的
    pub fn register(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        let device = driver.device_type();
        if self.drivers.insert(device, driver).is_some() {
            tracing::debug!(target: "arvideo::registry", %device, "driver replaced");
        }
        self
    }

    pub fn set_default_device(&mut self, device: DeviceType) -> &mut Self {
        self.default_device = device;
        self
    }

    pub fn default_device(&self) -> DeviceType {
        self.default_device
    }

    pub fn is_registered(&self, device: DeviceType) -> bool {
        self.drivers.contains_key(&device)
    }

    /// 已注册的设备类型 (按设备编号排序)
    pub fn devices(&self) -> impl Iterator<Item = DeviceType> + '_ {
        self.drivers.keys().copied()
    }

    fn driver(&self, device: DeviceType) -> Result<&Arc<dyn Driver>> {
        self.drivers
            .get(&device)
            .ok_or(VideoError::UnsupportedOnThisBuild(device))
    }

    /// 选择后端
    ///
    /// 从左到右扫描 token，第一个可识别的 `-device=<Name>` 生效并覆盖编译期默认设备。
    /// 其余 token 一律忽略，由后端自己的解析器决定是否接受。
    pub fn resolve(&self, config: Option<&str>) -> Resolved {
        let Some(config) = config else {
            return Resolved {
                device_type: self.default_device,
                config: String::new(),
                explicit: false,
            };
        };

        let tokens = ConfigTokens::parse(config);
        let mut selected = None;
        for token in &tokens {
            if token.key != "device" {
                continue;
            }
            match DeviceType::from_token(&token.raw) {
                Some(device) => {
                    selected = Some((device, token));
                    break;
                }
                None => tracing::warn!(target: "arvideo::registry", "Ignoring unknown device token '{}'.", token.raw),
            }
        }

        match selected {
            Some((device, token)) => {
                let scope = self
                    .drivers
                    .get(&device)
                    .map(|d| d.config_scope())
                    .unwrap_or(ConfigScope::Full);
                let config = match scope {
                    ConfigScope::Full => config.to_owned(),
                    ConfigScope::FollowingDevice => tokens.remainder_after(token).to_owned(),
                };
                Resolved {
                    device_type: device,
                    config,
                    explicit: true,
                }
            }
            None => Resolved {
                device_type: self.default_device,
                config: config.to_owned(),
                explicit: false,
            },
        }
    }

    /// 构造后端实例
    /// 驱动负责在失败时释放自己的中间资源；这里只做错误归类
    /// 【关键】对外只有两种失败：UnsupportedOnThisBuild 与 BackendInitFailed
    pub fn open(&self, resolved: &Resolved) -> Result<Box<dyn Backend>> {
        let driver = self.driver(resolved.device_type)?;
        tracing::debug!(target: "arvideo::registry", device = %resolved.device_type, "opening backend");
        driver.open(&resolved.config).map_err(|e| match e {
            VideoError::BackendInitFailed(msg) => VideoError::BackendInitFailed(msg),
            VideoError::Io(io) => VideoError::BackendInitFailed(io.to_string()),
            VideoError::InvalidConfig(msg) => VideoError::BackendInitFailed(msg),
            other => VideoError::BackendInitFailed(other.to_string()),
        })
    }

    /// 枚举某个设备类型的输入源
    pub fn list_sources(&self, device: DeviceType, config: &str) -> Result<Vec<SourceInfo>> {
        self.driver(device)?.list_sources(config)
    }

    /// 某个设备类型接受的选项说明
    pub fn option_help(&self, device: DeviceType) -> Result<&'static [OptionDoc]> {
        Ok(self.driver(device)?.option_help())
    }

    /// 打印所有已注册驱动的选项说明
    pub fn print_help(&self) {
        for (device, driver) in &self.drivers {
            tracing::info!(target: "arvideo::registry", "-device={}", device);
            for doc in driver.option_help() {
                tracing::info!(target: "arvideo::registry", "    {}", doc.option);
                tracing::info!(target: "arvideo::registry", "        {}", doc.description);
            }
        }
    }
}
