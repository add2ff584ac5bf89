use std::fmt;
use std::str::FromStr;

use arvideo_core::error::{Result, VideoError};
use serde::{Deserialize, Serialize};

/// 设备身份
///
/// 同一型号的设备被认为拥有相同的摄像头，所以默认只用 manufacturer/model/board 区分；
/// 需要区分单台设备时 (`-camcalibbydevid`) 追加唯一设备 ID。
/// 只在边界处序列化为 `manufacturer/model/board[/uid]`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub board: String,
    pub unique_id: Option<String>,
}

const UNKNOWN: &str = "unknown";

impl DeviceIdentity {
    pub fn new(manufacturer: &str, model: &str, board: &str) -> Self {
        Self {
            manufacturer: sanitize(manufacturer),
            model: sanitize(model),
            board: sanitize(board),
            unique_id: None,
        }
    }

    pub fn with_unique_id(mut self, uid: &str) -> Self {
        let uid = sanitize(uid);
        self.unique_id = (uid != UNKNOWN).then_some(uid);
        self
    }

    /// 从宿主系统读取身份
    ///
    /// Linux 上读取 DMI (`/sys/class/dmi/id`) 和 `/etc/machine-id`，
    /// 读取失败的字段记为 "unknown"。
    pub fn from_host(with_unique_id: bool) -> Self {
        let mut id = Self::new(
            &read_host_field("sys_vendor"),
            &read_host_field("product_name"),
            &read_host_field("board_name"),
        );
        if with_unique_id {
            match host_unique_id() {
                Some(uid) => {
                    tracing::info!(target: "arvideo::calib", "adding unique device ID to device identity");
                    id = id.with_unique_id(&uid);
                }
                None => tracing::warn!(target: "arvideo::calib", "unique device ID requested but unavailable"),
            }
        }
        id
    }

    /// 不含唯一 ID 的身份 (缓存回退查询使用)
    pub fn without_unique_id(&self) -> Self {
        Self {
            unique_id: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.manufacturer, self.model, self.board)?;
        if let Some(uid) = &self.unique_id {
            write!(f, "/{}", uid)?;
        }
        Ok(())
    }
}

impl FromStr for DeviceIdentity {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if !(3..=4).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(VideoError::InvalidConfig(format!(
                "device identity must be 'manufacturer/model/board[/uid]', got '{}'",
                s
            )));
        }
        let id = Self::new(parts[0], parts[1], parts[2]);
        Ok(match parts.get(3) {
            Some(uid) => id.with_unique_id(uid),
            None => id,
        })
    }
}

/// '/' 是分隔符，不能出现在字段里
fn sanitize(field: &str) -> String {
    let s = field.trim().replace('/', "_");
    if s.is_empty() {
        UNKNOWN.to_owned()
    } else {
        s
    }
}

#[cfg(target_os = "linux")]
fn read_host_field(name: &str) -> String {
    std::fs::read_to_string(format!("/sys/class/dmi/id/{}", name))
        .map(|s| s.trim().to_owned())
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_host_field(name: &str) -> String {
    match name {
        "sys_vendor" => std::env::consts::OS.to_owned(),
        "product_name" => std::env::consts::ARCH.to_owned(),
        _ => String::new(),
    }
}

#[cfg(target_os = "linux")]
fn host_unique_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_owned())
        .find(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
fn host_unique_id() -> Option<String> {
    None
}
