use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arvideo_core::error::Result;

use crate::cache::ParamCache;
use crate::identity::DeviceIdentity;
use crate::lookup::{HttpLookup, LookupError, LookupQuery, LookupService, LOOKUP_URL_ENV_VAR};
use crate::params::CameraParams;

/// 标定请求的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// 请求已接受，正在查本地缓存
    Initial,
    /// 远端查询进行中
    InProgress,
    /// 终态：得到内参
    Ok,
    /// 终态：查询正常结束，但没有该设备的数据
    ResultNull,
    /// 终态：网络不可用 (或已被关闭)
    FailedNoNetwork,
    /// 终态：其他错误
    Failed,
}

impl CalibrationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Initial | Self::InProgress)
    }
}

/// 标定请求
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRequest {
    pub identity: DeviceIdentity,
    pub camera_index: i32,
    pub width: u32,
    pub height: u32,
    /// 镜头焦距估计 (米)
    pub focal_length: f64,
}

impl CalibrationRequest {
    fn query(&self) -> LookupQuery {
        LookupQuery {
            device_id: self.identity.to_string(),
            camera_index: self.camera_index,
            width: self.width,
            height: self.height,
            focal_length: self.focal_length,
        }
    }
}

/// 终态结果：只有 Ok 携带内参
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub state: CalibrationState,
    pub params: Option<CameraParams>,
}

impl CalibrationResult {
    fn empty(state: CalibrationState) -> Self {
        Self { state, params: None }
    }
}

/// 解析器配置
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// 缓存目录，None 时只使用内存缓存
    pub cache_dir: Option<PathBuf>,
    /// 远端查询服务 URL，None 时不做远端查询
    pub lookup_url: Option<String>,
    pub timeout: Duration,
    /// 初始是否允许访问网络
    pub network_enabled: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            lookup_url: None,
            timeout: Duration::from_secs(10),
            network_enabled: true,
        }
    }
}

impl ResolverConfig {
    /// 默认配置 + 环境变量中的查询服务 URL
    pub fn from_env() -> Self {
        Self {
            lookup_url: std::env::var(LOOKUP_URL_ENV_VAR)
                .ok()
                .filter(|s| !s.trim().is_empty()),
            ..Self::default()
        }
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn lookup_url(mut self, url: impl Into<String>) -> Self {
        self.lookup_url = Some(url.into());
        self
    }
}

struct ResolverInner {
    cache: ParamCache,
    lookup: Option<Arc<dyn LookupService>>,
    network: AtomicBool,
}

/// 内参解析器：先查本地缓存，未命中再查远端
///
/// 可克隆，克隆体共享缓存与网络开关。
#[derive(Clone)]
pub struct CalibrationResolver {
    inner: Arc<ResolverInner>,
}

impl fmt::Debug for CalibrationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalibrationResolver")
            .field("cache_entries", &self.inner.cache.len())
            .field("remote", &self.inner.lookup.is_some())
            .field("network", &self.network_enabled())
            .finish()
    }
}

impl CalibrationResolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let cache = match &config.cache_dir {
            Some(dir) => ParamCache::open(dir)?,
            None => ParamCache::in_memory(),
        };
        let lookup: Option<Arc<dyn LookupService>> = match &config.lookup_url {
            Some(url) => match HttpLookup::new(url.clone(), config.timeout) {
                Ok(l) => Some(Arc::new(l)),
                Err(e) => {
                    tracing::error!(target: "arvideo::calib", "unable to initialise lookup client: {}", e);
                    return Err(arvideo_core::error::VideoError::Failed(e.to_string()));
                }
            },
            None => None,
        };
        Ok(Self::from_parts(cache, lookup, config.network_enabled))
    }

    /// 自定义缓存与查询服务 (测试或嵌入式场景)
    pub fn from_parts(cache: ParamCache, lookup: Option<Arc<dyn LookupService>>, network_enabled: bool) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                cache,
                lookup,
                network: AtomicBool::new(network_enabled),
            }),
        }
    }

    pub fn cache(&self) -> &ParamCache {
        &self.inner.cache
    }

    pub fn set_network_enabled(&self, enabled: bool) {
        tracing::debug!(target: "arvideo::calib", enabled, "internet state changed");
        self.inner.network.store(enabled, Ordering::Release);
    }

    pub fn network_enabled(&self) -> bool {
        self.inner.network.load(Ordering::Acquire)
    }

    /// 执行一次解析，`on_state` 在每次非终态迁移时调用
    pub async fn resolve<F>(&self, request: &CalibrationRequest, mut on_state: F) -> CalibrationResult
    where
        F: FnMut(CalibrationState) + Send,
    {
        let device_id = request.identity.to_string();
        on_state(CalibrationState::Initial);
        tracing::debug!(target: "arvideo::calib", device_id = %device_id, index = request.camera_index, "calibration lookup: Initial");

        // 1. 本地缓存 (带唯一 ID 的身份未命中时回退到型号级身份)
        if let Some(params) = self.lookup_cached(request) {
            tracing::debug!(target: "arvideo::calib", device_id = %device_id, "calibration lookup: cache hit");
            return CalibrationResult {
                state: CalibrationState::Ok,
                params: Some(params),
            };
        }

        // 2. 远端
        let Some(lookup) = &self.inner.lookup else {
            tracing::debug!(target: "arvideo::calib", device_id = %device_id, "calibration lookup: no remote service, ResultNull");
            return CalibrationResult::empty(CalibrationState::ResultNull);
        };
        if !self.network_enabled() {
            tracing::warn!(target: "arvideo::calib", "calibration lookup needs the network, but internet access is disabled");
            return CalibrationResult::empty(CalibrationState::FailedNoNetwork);
        }

        on_state(CalibrationState::InProgress);
        tracing::debug!(target: "arvideo::calib", device_id = %device_id, "calibration lookup: InProgress");

        match lookup.lookup(&request.query()).await {
            Ok(Some(params)) => {
                let params = if params.width == request.width && params.height == request.height {
                    params
                } else {
                    match params.change_size(request.width, request.height) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::error!(target: "arvideo::calib", "unusable remote parameters: {}", e);
                            return CalibrationResult::empty(CalibrationState::Failed);
                        }
                    }
                };
                if let Err(e) = self.inner.cache.insert(&device_id, request.camera_index, params.clone()) {
                    tracing::warn!(target: "arvideo::calib", "unable to persist calibration cache: {}", e);
                }
                CalibrationResult {
                    state: CalibrationState::Ok,
                    params: Some(params),
                }
            }
            Ok(None) => CalibrationResult::empty(CalibrationState::ResultNull),
            Err(LookupError::NoNetwork) => {
                tracing::error!(target: "arvideo::calib", "Error during calibration lookup. Internet connection unavailable.");
                CalibrationResult::empty(CalibrationState::FailedNoNetwork)
            }
            Err(e) => {
                tracing::error!(target: "arvideo::calib", "Error during calibration lookup: {}", e);
                CalibrationResult::empty(CalibrationState::Failed)
            }
        }
    }

    fn lookup_cached(&self, request: &CalibrationRequest) -> Option<CameraParams> {
        let cache = &self.inner.cache;
        let (w, h, idx) = (request.width, request.height, request.camera_index);
        cache
            .lookup(&request.identity.to_string(), idx, w, h)
            .or_else(|| {
                request
                    .identity
                    .unique_id
                    .as_ref()
                    .and_then(|_| cache.lookup(&request.identity.without_unique_id().to_string(), idx, w, h))
            })
    }
}
