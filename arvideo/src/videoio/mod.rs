pub mod backend;
pub mod compat;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arvideo_calib::{
    CalibrationRequest, CalibrationResolver, CalibrationResult, CalibrationSlot, CalibrationState,
    DeviceIdentity, ResolverConfig,
};
use arvideo_core::config::{effective_config, ConfigTokens};
use arvideo_core::device::DeviceType;
use arvideo_core::error::{Result, VideoError};
use arvideo_core::frame::FrameBuffer;
use arvideo_core::params::{DoubleParam, IntParam, StringParam, FOCAL_LENGTH_DEFAULT};
use arvideo_core::pixel_format::PixelFormat;
use arvideo_core::slot::{DeliveryMode, FrameReader, FrameSlot};
use arvideo_core::telemetry::DeliveryTelemetry;
use arvideo_core::traits::{Backend, Capabilities};
use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::internal::runtime;
use backend::BackendRegistry;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opened,
    Capturing,
    Stopped,
}

/// 一次 Open 到 Close 之间持有的全部资源
struct OpenSession {
    device_type: DeviceType,
    backend: Box<dyn Backend>,
    width: u32,
    height: u32,
    format: PixelFormat,
    capabilities: Capabilities,
    state: SessionState,
    mode: Option<DeliveryMode>,
    frames: Arc<FrameSlot>,
    reader: FrameReader,
    calibration: CalibrationSlot,
    resolver: CalibrationResolver,
    config: ConfigTokens,
}

/// 采集会话
///
/// 调用方持有的显式句柄，每个已打开的设备一个；多个会话可以同时存在。
/// Open / Close / CapStart / CapStop 需要 `&mut self`，由借用规则保证串行。
/// get_image 与参数访问可以和异步回调并发进行。
pub struct CaptureSession {
    registry: Arc<BackendRegistry>,
    resolver_config: ResolverConfig,
    open: Option<OpenSession>,
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("CaptureSession");
        d.field("state", &self.state());
        if let Some(s) = &self.open {
            d.field("device", &s.device_type)
                .field("size", &(s.width, s.height))
                .field("format", &s.format)
                .field("mode", &s.mode);
        }
        d.finish()
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    /// 使用内置注册表创建 (Closed 状态)
    pub fn new() -> Self {
        Self::with_registry(Arc::new(BackendRegistry::with_builtin()))
    }

    pub fn with_registry(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            resolver_config: ResolverConfig::from_env(),
            open: None,
        }
    }

    /// 标定解析器配置，在下一次 Open 时生效
    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.resolver_config = config;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.open.as_ref().map_or(SessionState::Closed, |s| s.state)
    }

    pub fn is_opened(&self) -> bool {
        self.open.is_some()
    }

    fn session(&self) -> Result<&OpenSession> {
        self.open.as_ref().ok_or(VideoError::NotOpen)
    }

    fn session_mut(&mut self) -> Result<&mut OpenSession> {
        self.open.as_mut().ok_or(VideoError::NotOpen)
    }

    // ------------------------------------------------------------------
    // 生命周期
    // ------------------------------------------------------------------

    /// 打开设备
    ///
    /// `config` 为 None 或空串时使用 ARVIDEO_VCONF，再没有则使用编译期默认设备。
    /// 失败时会话保持 Closed，已构造的后端会先被关闭。
    pub fn open(&mut self, config: Option<&str>) -> Result<()> {
        if self.open.is_some() {
            return Err(VideoError::AlreadyOpen);
        }

        // 1. 分发
        let config = effective_config(config);
        let resolved = self.registry.resolve(config.as_deref());
        let tokens = ConfigTokens::parse(config.as_deref().unwrap_or(""));

        // 2. 构造后端 (尺寸与格式在这里确定)
        let mut backend = self.registry.open(&resolved)?;

        // 3. 标定解析器，失败时回滚
        let resolver = match self.build_resolver(&tokens) {
            Ok(r) => r,
            Err(e) => {
                if let Err(close_err) = backend.close() {
                    tracing::error!(target: "arvideo::session", "rollback close failed: {}", close_err);
                }
                return Err(e);
            }
        };

        let (width, height) = backend.size();
        let format = backend.pixel_format();
        let capabilities = backend.capabilities();
        tracing::info!(
            target: "arvideo::session",
            "Opened {} device: {}x{} {} ({:?})",
            resolved.device_type,
            width,
            height,
            format,
            capabilities
        );

        let frames = FrameSlot::new();
        self.open = Some(OpenSession {
            device_type: resolved.device_type,
            backend,
            width,
            height,
            format,
            capabilities,
            state: SessionState::Opened,
            mode: None,
            reader: frames.reader(),
            frames,
            calibration: CalibrationSlot::new(),
            resolver,
            config: tokens,
        });
        Ok(())
    }

    /// 用 `-cachedir=` 覆盖缓存目录；目录不可用时退回内存缓存
    fn build_resolver(&self, tokens: &ConfigTokens) -> Result<CalibrationResolver> {
        let mut config = self.resolver_config.clone();
        if let Some(dir) = tokens.get("cachedir").and_then(|t| t.value.clone()) {
            config = config.cache_dir(dir);
        }
        match CalibrationResolver::new(config.clone()) {
            Ok(r) => Ok(r),
            Err(e) if config.cache_dir.is_some() => {
                tracing::warn!(target: "arvideo::session", "Calibration cache unavailable ({}), using in-memory cache.", e);
                CalibrationResolver::new(ResolverConfig {
                    cache_dir: None,
                    ..config
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 关闭设备 (任何状态下都可调用，幂等)
    ///
    /// 返回后：回调不会再运行，最新帧已释放，挂起的标定请求不会再回调。
    pub fn close(&mut self) -> Result<()> {
        let Some(mut session) = self.open.take() else {
            return Ok(());
        };

        session.frames.clear();
        session.calibration.close();
        let result = session.backend.close();
        match &result {
            Ok(()) => tracing::info!(target: "arvideo::session", "Closed {} device.", session.device_type),
            Err(e) => tracing::error!(target: "arvideo::session", "Error closing {} device: {}", session.device_type, e),
        }
        result
    }

    /// 开始同步采集：get_image 取帧
    ///
    /// 支持 poll 的后端由 get_image 驱动；其余后端由自己的线程推送到交付槽。
    pub fn cap_start(&mut self) -> Result<()> {
        let session = self.session_mut()?;
        let mode = if session.capabilities.contains(Capabilities::POLL) {
            DeliveryMode::Poll
        } else {
            DeliveryMode::Push
        };
        Self::start(session, mode, None)
    }

    /// 开始异步采集
    ///
    /// 回调在后端的生产者线程上对每一帧调用一次，替换之前注册的回调。
    /// 回调不能阻塞，也不能调用本会话的 cap_stop / close。
    /// 回调拿到的 `Arc` 可以保留；不保留时下一帧会覆盖它。
    pub fn cap_start_async<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&Arc<FrameBuffer>) + Send + 'static,
    {
        let session = self.session_mut()?;
        if !session.capabilities.contains(Capabilities::PUSH) {
            return Err(VideoError::NotSupported);
        }
        Self::start(session, DeliveryMode::Push, Some(Box::new(callback)))
    }

    fn start(
        session: &mut OpenSession,
        mode: DeliveryMode,
        callback: Option<arvideo_core::slot::FrameCallback>,
    ) -> Result<()> {
        if session.state == SessionState::Capturing {
            return Err(VideoError::Busy);
        }

        // 1. 开启新的交付周期 (清空最新帧)
        let sink = session.frames.begin(callback);

        // 2. 启动后端，失败时关闭交付周期并释放回调
        if let Err(e) = session.backend.cap_start(sink, mode) {
            session.frames.end();
            tracing::error!(target: "arvideo::session", "CapStart failed: {}", e);
            return Err(e);
        }

        session.state = SessionState::Capturing;
        session.mode = Some(mode);
        tracing::debug!(target: "arvideo::session", ?mode, "capture started");
        Ok(())
    }

    /// 停止采集；返回后不会再有回调运行
    pub fn cap_stop(&mut self) -> Result<()> {
        let session = self.session_mut()?;
        if session.state != SessionState::Capturing {
            return Err(VideoError::Failed("capture not started".into()));
        }

        // 【关键】先结束交付周期 (等待正在执行的回调)，再回收后端线程
        session.frames.end();
        session.state = SessionState::Stopped;
        session.mode = None;
        session.backend.cap_stop()
    }

    /// 获取最新帧，从不阻塞
    ///
    /// 自上次 CapStart 以来没有帧时返回 None。读取不消费帧：
    /// 没有新帧到达时重复调用返回同一帧。
    pub fn get_image(&mut self) -> Result<Option<Arc<FrameBuffer>>> {
        let session = self.session_mut()?;
        if session.mode == Some(DeliveryMode::Poll) {
            session.backend.poll()?;
        }
        Ok(session.reader.latest())
    }

    /// 消费者端只读句柄，可以交给其它线程
    pub fn frame_reader(&self) -> Result<FrameReader> {
        Ok(self.session()?.reader.clone())
    }

    pub fn stats(&self) -> Result<DeliveryTelemetry> {
        Ok(self.session()?.reader.stats())
    }

    // ------------------------------------------------------------------
    // 协商结果
    // ------------------------------------------------------------------

    pub fn device_type(&self) -> Result<DeviceType> {
        Ok(self.session()?.device_type)
    }

    pub fn size(&self) -> Result<(u32, u32)> {
        let s = self.session()?;
        Ok((s.width, s.height))
    }

    pub fn pixel_format(&self) -> Result<PixelFormat> {
        Ok(self.session()?.format)
    }

    /// 每像素字节数 (平面格式只计亮度平面)
    pub fn pixel_size(&self) -> Result<usize> {
        Ok(self.session()?.format.pixel_size())
    }

    pub fn capabilities(&self) -> Result<Capabilities> {
        Ok(self.session()?.capabilities)
    }

    pub fn get_id(&self) -> Result<(u32, u32)> {
        self.session()?.backend.get_id()
    }

    /// 会话与后端状态快照
    pub fn export_state(&self) -> Result<String> {
        let s = self.session()?;
        let value = s.backend.export_state()?;
        Ok(value.to_string())
    }

    // ------------------------------------------------------------------
    // 参数
    // ------------------------------------------------------------------

    pub fn get_int(&self, key: IntParam) -> Result<i32> {
        // 唯一不需要打开设备的键
        if key == IntParam::Version {
            return Ok(arvideo_core::version_code());
        }
        let s = self.session()?;
        match key {
            IntParam::Width => Ok(s.width as i32),
            IntParam::Height => Ok(s.height as i32),
            IntParam::PixelFormat => Ok(s.format.code()),
            IntParam::InternetState => Ok(s.resolver.network_enabled() as i32),
            other => s.backend.get_int(other),
        }
    }

    pub fn set_int(&mut self, key: IntParam, value: i32) -> Result<()> {
        let s = self.session_mut()?;
        match key {
            // 尺寸与格式在 Open 时确定，之后不再改变
            IntParam::Version | IntParam::Width | IntParam::Height | IntParam::PixelFormat => {
                Err(VideoError::NotSupported)
            }
            IntParam::InternetState => {
                s.resolver.set_network_enabled(value != 0);
                Ok(())
            }
            other => s.backend.set_int(other, value),
        }
    }

    pub fn get_double(&self, key: DoubleParam) -> Result<f64> {
        self.session()?.backend.get_double(key)
    }

    pub fn set_double(&mut self, key: DoubleParam, value: f64) -> Result<()> {
        self.session_mut()?.backend.set_double(key, value)
    }

    pub fn get_string(&self, key: StringParam) -> Result<String> {
        self.session()?.backend.get_string(key)
    }

    pub fn set_string(&mut self, key: StringParam, value: &str) -> Result<()> {
        self.session_mut()?.backend.set_string(key, value)
    }

    // ------------------------------------------------------------------
    // 标定
    // ------------------------------------------------------------------

    /// 当前设备的身份：后端给出的优先，否则使用主机身份
    pub fn device_identity(&self) -> Result<DeviceIdentity> {
        let s = self.session()?;
        match s.backend.get_string(StringParam::DeviceId) {
            Ok(id) => id
                .parse()
                .map_err(|_| VideoError::Failed(format!("backend reported malformed device identity '{}'", id))),
            Err(VideoError::NotSupported) => Ok(DeviceIdentity::from_host(s.config.contains_flag("camcalibbydevid"))),
            Err(e) => Err(e),
        }
    }

    /// 异步获取当前设备的相机内参
    ///
    /// 回调在到达终态时恰好调用一次 (在后台线程上)。同一时间只能有一个请求，
    /// 第二个请求立即返回 Busy。Close 之后挂起请求的回调永远不会被调用。
    pub fn get_camera_params_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(CalibrationResult) + Send + 'static,
    {
        let s = self.session()?;
        let request = CalibrationRequest {
            identity: self.device_identity()?,
            camera_index: s.backend.get_int(IntParam::CameraIndex).unwrap_or(0),
            width: s.width,
            height: s.height,
            focal_length: s
                .backend
                .get_double(DoubleParam::FocalLength)
                .unwrap_or(FOCAL_LENGTH_DEFAULT),
        };
        tracing::debug!(target: "arvideo::session", identity = %request.identity, "requesting camera parameters");
        s.calibration
            .submit(&runtime::handle()?, &s.resolver, request, Box::new(callback))
    }

    /// 阻塞等待标定结果
    /// 超时后请求仍在后台进行，完成前再次请求会得到 Busy
    pub fn get_camera_params_blocking(&self, timeout: Duration) -> Result<CalibrationResult> {
        let (tx, rx) = bounded(1);
        self.get_camera_params_async(move |result| {
            let _ = tx.send(result);
        })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(VideoError::Failed(format!(
                "calibration lookup did not finish within {:?}",
                timeout
            ))),
            // 回调被丢弃 (会话在等待期间被关闭)
            Err(RecvTimeoutError::Disconnected) => Err(VideoError::NotOpen),
        }
    }

    pub fn calibration_state(&self) -> Result<Option<CalibrationState>> {
        Ok(self.session()?.calibration.state())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(target: "arvideo::session", "close on drop failed: {}", e);
        }
    }
}
