use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use arvideo::calib::ResolverConfig;
use arvideo::{compat, BackendRegistry, CaptureSession};
use arvideo_core::device::DeviceType;
use arvideo_core::error::VideoError;
use arvideo_core::params::{IntParam, StringParam};
use arvideo_core::pixel_format::PixelFormat;

fn session() -> CaptureSession {
    CaptureSession::new().with_resolver_config(ResolverConfig::default())
}

#[test]
fn builtin_registry_follows_features() {
    let registry = BackendRegistry::with_builtin();
    assert_eq!(registry.is_registered(DeviceType::Dummy), cfg!(feature = "backend-dummy"));
    assert_eq!(registry.is_registered(DeviceType::Image), cfg!(feature = "backend-image"));
    assert!(!registry.is_registered(DeviceType::WinMF));
}

#[test]
fn unregistered_device_is_reported() {
    let mut s = session();
    let err = s.open(Some("-device=WinMF")).unwrap_err();
    assert!(matches!(err, VideoError::UnsupportedOnThisBuild(DeviceType::WinMF)));
    assert_eq!(compat::status(Err::<(), _>(err)), -1);
}

#[cfg(feature = "backend-dummy")]
mod dummy {
    use super::*;

    #[test]
    fn open_reports_requested_size() -> Result<()> {
        let mut s = session();
        s.open(Some("-device=Dummy -width=640 -height=480"))?;
        assert_eq!(s.size()?, (640, 480));
        assert_eq!(s.get_int(IntParam::Width)?, 640);
        assert_eq!(s.get_int(IntParam::Height)?, 480);
        assert_eq!(s.device_type()?, DeviceType::Dummy);
        Ok(())
    }

    #[test]
    fn dispatcher_ignores_unknown_tokens_but_strict_backend_rejects_them() {
        let registry = BackendRegistry::with_builtin();
        let resolved = registry.resolve(Some("-device=Dummy -foo=bar"));
        assert_eq!(resolved.device_type, DeviceType::Dummy);

        let mut s = session();
        let err = s.open(Some("-device=Dummy -foo=bar")).unwrap_err();
        assert!(matches!(err, VideoError::BackendInitFailed(_)));
        assert!(!s.is_opened());
    }

    #[test]
    fn malformed_option_value_fails_backend_init() -> Result<()> {
        let mut s = session();
        match s.open(Some("-device=Dummy -width=abc")) {
            Err(VideoError::BackendInitFailed(msg)) => assert!(msg.contains("-width="), "{}", msg),
            other => panic!("unexpected open result: {:?}", other.map(|_| ())),
        }
        assert!(!s.is_opened());

        // 失败后同一会话可以正常打开
        s.open(Some("-device=Dummy -width=64 -height=48"))?;
        assert_eq!(s.size()?, (64, 48));
        Ok(())
    }

    #[test]
    fn sync_capture_polls_test_pattern() -> Result<()> {
        let mut s = session();
        s.open(Some("-device=Dummy -width=64 -height=48 -format=nv21"))?;
        assert_eq!(s.pixel_format()?, PixelFormat::Nv21);
        assert_eq!(s.pixel_size()?, 1);

        assert!(s.get_image()?.is_none());
        s.cap_start()?;
        let frame = s.get_image()?.expect("dummy poll delivers a frame");
        assert_eq!(frame.plane_count(), 2);
        assert_eq!(frame.plane(0).map(<[u8]>::len), Some(64 * 48));
        assert_eq!(frame.plane(1).map(<[u8]>::len), Some(64 * 48 / 2));
        assert!(compat::image_or_null(s.get_image()).is_some());
        s.cap_stop()?;
        s.close()?;
        Ok(())
    }

    #[test]
    fn async_capture_invokes_callback_until_stopped() -> Result<()> {
        let mut s = session();
        s.open(Some("-device=Dummy -width=32 -height=24 -fps=200"))?;

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        s.cap_start_async(move |frame| {
            assert_eq!((frame.width, frame.height), (32, 24));
            h.fetch_add(1, Ordering::SeqCst);
        })?;

        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(hits.load(Ordering::SeqCst) >= 3);

        s.cap_stop()?;
        let after_stop = hits.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(Ordering::SeqCst), after_stop);
        assert!(s.stats()?.delivered_frames >= 3);
        Ok(())
    }

    #[test]
    fn dummy_reports_identity_and_index() -> Result<()> {
        let mut s = session();
        s.open(Some(r#"-device=Dummy -source=1 -identity="Acme/Model1/BoardX""#))?;
        assert_eq!(s.get_string(StringParam::DeviceId)?, "Acme/Model1/BoardX");
        assert_eq!(s.device_identity()?.model, "Model1");
        assert_eq!(s.get_int(IntParam::CameraIndex)?, 1);
        Ok(())
    }

    #[test]
    fn sessions_are_independent() -> Result<()> {
        let mut a = session();
        let mut b = session();
        a.open(Some("-device=Dummy -width=16 -height=16"))?;
        b.open(Some("-device=Dummy -width=32 -height=32"))?;
        a.close()?;
        assert_eq!(b.size()?, (32, 32));
        assert!(matches!(a.size(), Err(VideoError::NotOpen)));
        Ok(())
    }

    #[test]
    fn option_help_lists_dummy_options() -> Result<()> {
        let registry = BackendRegistry::with_builtin();
        let help = registry.option_help(DeviceType::Dummy)?;
        assert!(help.iter().any(|d| d.option.starts_with("-width")));
        let sources = registry.list_sources(DeviceType::Dummy, "")?;
        assert_eq!(sources.len(), 1);
        Ok(())
    }
}
