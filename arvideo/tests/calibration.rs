#![cfg(feature = "backend-dummy")]

use std::f64::consts::FRAC_PI_4;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arvideo::calib::{CalibrationState, CameraParams, ParamCache, ResolverConfig};
use arvideo::CaptureSession;
use arvideo_core::error::VideoError;
use arvideo_core::params::IntParam;
use crossbeam_channel::unbounded;

#[test]
fn cached_identity_resolves_through_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let expected = CameraParams::from_fov_y(640, 480, FRAC_PI_4)?;
    ParamCache::open(dir.path())?.insert("Acme/Model1/BoardX", 0, expected.clone())?;

    let mut s = CaptureSession::new().with_resolver_config(ResolverConfig::default());
    let config = format!(
        r#"-device=Dummy -width=640 -height=480 -focal=0.0035 -identity="Acme/Model1/BoardX" -cachedir="{}""#,
        dir.path().display()
    );
    s.open(Some(&config))?;

    let first = s.get_camera_params_blocking(Duration::from_secs(5))?;
    assert_eq!(first.state, CalibrationState::Ok);
    assert_eq!(first.params.as_ref(), Some(&expected));

    // 同一身份再次请求：同样的结果
    let second = s.get_camera_params_blocking(Duration::from_secs(5))?;
    assert_eq!(second, first);
    assert_eq!(s.calibration_state()?, Some(CalibrationState::Ok));
    Ok(())
}

#[test]
fn cache_miss_without_lookup_service_is_result_null() -> Result<()> {
    let mut s = CaptureSession::new().with_resolver_config(ResolverConfig::default());
    s.open(Some(r#"-device=Dummy -identity="Acme/Unknown/Board""#))?;
    let result = s.get_camera_params_blocking(Duration::from_secs(5))?;
    assert_eq!(result.state, CalibrationState::ResultNull);
    assert!(result.params.is_none());
    Ok(())
}

#[test]
fn internet_state_off_fails_with_no_network() -> Result<()> {
    let config = ResolverConfig::default().lookup_url("http://127.0.0.1:9/cparam");
    let mut s = CaptureSession::new().with_resolver_config(config);
    s.open(Some(r#"-device=Dummy -identity="Acme/Model2/Board""#))?;
    s.set_int(IntParam::InternetState, 0)?;

    let result = s.get_camera_params_blocking(Duration::from_secs(5))?;
    assert_eq!(result.state, CalibrationState::FailedNoNetwork);
    assert!(result.params.is_none());
    Ok(())
}

/// 远端服务接受连接但永不应答：请求一直挂起
#[test]
fn second_request_is_busy_and_close_drops_pending_callback() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}/cparam", listener.local_addr()?);
    let mut config = ResolverConfig::default().lookup_url(url);
    config.timeout = Duration::from_secs(30);

    let mut s = CaptureSession::new().with_resolver_config(config);
    s.open(Some(r#"-device=Dummy -identity="Acme/Slow/Board""#))?;

    let (tx, rx) = unbounded();
    let witness = Arc::new(());
    let held = Arc::clone(&witness);
    s.get_camera_params_async(move |result| {
        let _held = held;
        let _ = tx.send(result.state);
    })?;

    // 第二个请求立即失败，不影响第一个
    let err = s.get_camera_params_async(|_| {}).unwrap_err();
    assert!(matches!(err, VideoError::Busy));
    assert!(matches!(
        s.calibration_state()?,
        Some(CalibrationState::Initial) | Some(CalibrationState::InProgress)
    ));

    // 关闭会话：挂起请求的回调被释放，且永远不会被调用
    s.close()?;
    assert_eq!(Arc::strong_count(&witness), 1);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    drop(listener);
    Ok(())
}

/// 在调用方自己的 tokio Runtime 中使用异步接口
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_request_from_tokio_context() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let expected = CameraParams::from_fov_y(320, 240, FRAC_PI_4)?;
    ParamCache::open(dir.path())?.insert("Acme/Model1/BoardX", 2, expected.clone())?;

    let mut s = CaptureSession::new().with_resolver_config(ResolverConfig::default().cache_dir(dir.path()));
    s.open(Some(r#"-device=Dummy -width=640 -height=480 -source=2 -identity="Acme/Model1/BoardX""#))?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    s.get_camera_params_async(move |result| {
        let _ = tx.send(result);
    })?;
    let result = tokio::time::timeout(Duration::from_secs(5), rx).await??;

    // 缓存中只有 320x240，同宽高比的条目被缩放到请求尺寸
    assert_eq!(result.state, CalibrationState::Ok);
    let params = result.params.expect("rescaled parameters");
    assert_eq!((params.width, params.height), (640, 480));
    assert!((params.fx() - expected.fx() * 2.0).abs() < 1e-9);
    Ok(())
}
