use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::params::CameraParams;

/// 远端查询服务的 Base URL
pub const LOOKUP_URL_ENV_VAR: &str = "ARVIDEO_CPARAM_URL";

#[derive(Error, Debug)]
pub enum LookupError {
    /// 连接失败或超时
    #[error("Network unavailable")]
    NoNetwork,

    #[error("Lookup service returned HTTP {0}")]
    Status(u16),

    #[error("Malformed lookup response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// 一次远端查询的参数
#[derive(Debug, Clone, PartialEq)]
pub struct LookupQuery {
    /// 序列化后的设备身份串
    pub device_id: String,
    pub camera_index: i32,
    pub width: u32,
    pub height: u32,
    /// 镜头焦距估计 (米)，0 表示未知
    pub focal_length: f64,
}

/// 远端内参查询服务
///
/// `Ok(None)` 表示服务正常应答但没有该设备的数据。
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn lookup(&self, query: &LookupQuery) -> Result<Option<CameraParams>, LookupError>;
}

/// 基于 HTTP GET 的查询服务
///
/// `GET <base>?device_id=..&camera_index=..&width=..&height=..&focal_length=..`
/// - 200: JSON 编码的 CameraParams
/// - 404 / 204: 没有数据
#[derive(Debug, Clone)]
pub struct HttpLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("arvideo-calib/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LookupService for HttpLookup {
    async fn lookup(&self, query: &LookupQuery) -> Result<Option<CameraParams>, LookupError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("device_id", query.device_id.clone()),
                ("camera_index", query.camera_index.to_string()),
                ("width", query.width.to_string()),
                ("height", query.height.to_string()),
                ("focal_length", query.focal_length.to_string()),
            ])
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let params: CameraParams = resp
            .json()
            .await
            .map_err(|e| LookupError::Protocol(e.to_string()))?;
        if params.width == 0 || params.height == 0 {
            return Err(LookupError::Protocol("camera parameters with zero size".into()));
        }
        Ok(Some(params))
    }
}

/// 连接类错误视为 "无网络"
fn classify(e: reqwest::Error) -> LookupError {
    if e.is_connect() || e.is_timeout() {
        LookupError::NoNetwork
    } else {
        LookupError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_maps_to_no_network() {
        // 端口 9 (discard) 在测试环境中没有监听
        let lookup = HttpLookup::new("http://127.0.0.1:9/cparam", Duration::from_secs(2)).unwrap();
        let query = LookupQuery {
            device_id: "a/b/c".into(),
            camera_index: 0,
            width: 640,
            height: 480,
            focal_length: 0.0,
        };
        let err = lookup.lookup(&query).await.unwrap_err();
        assert!(matches!(err, LookupError::NoNetwork), "got {:?}", err);
    }
}
