mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use arvideo::calib::ResolverConfig;
use arvideo::{CaptureSession, SessionState};
use arvideo_core::error::VideoError;
use arvideo_core::params::{DoubleParam, IntParam, StringParam};
use arvideo_core::traits::Capabilities;
use common::{Counters, FakeDriver};

fn session(driver: &FakeDriver) -> CaptureSession {
    CaptureSession::with_registry(driver.registry()).with_resolver_config(ResolverConfig::default())
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn open_then_close_releases_everything() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::PUSH);
    let mut s = session(&driver);

    s.open(Some("-device=Dummy"))?;
    assert_eq!(s.state(), SessionState::Opened);
    assert_eq!(Counters::get(&driver.counters.live), 1);

    s.close()?;
    assert_eq!(s.state(), SessionState::Closed);
    assert_eq!(Counters::get(&driver.counters.live), 0);
    assert_eq!(Counters::get(&driver.counters.producers_live), 0);

    // 关闭是幂等的
    s.close()?;
    Ok(())
}

#[test]
fn close_while_capturing_releases_producer() -> Result<()> {
    let (driver, feed) = FakeDriver::new(Capabilities::PUSH);
    let mut s = session(&driver);
    s.open(None)?;
    s.cap_start()?;
    feed.push(1);
    assert_eq!(Counters::get(&driver.counters.producers_live), 1);

    s.close()?;
    assert_eq!(Counters::get(&driver.counters.live), 0);
    assert_eq!(Counters::get(&driver.counters.producers_live), 0);
    Ok(())
}

#[test]
fn dropping_session_closes_backend() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::PUSH);
    {
        let mut s = session(&driver);
        s.open(None)?;
        s.cap_start()?;
    }
    assert_eq!(Counters::get(&driver.counters.live), 0);
    assert_eq!(Counters::get(&driver.counters.producers_live), 0);
    Ok(())
}

#[test]
fn failed_open_leaves_session_closed() {
    let driver = FakeDriver::failing();
    let mut s = session(&driver);
    let err = s.open(Some("-device=Dummy")).unwrap_err();
    assert!(matches!(err, VideoError::BackendInitFailed(_)));
    assert_eq!(s.state(), SessionState::Closed);
    assert_eq!(Counters::get(&driver.counters.live), 0);
    assert!(matches!(s.cap_start(), Err(VideoError::NotOpen)));
}

#[test]
fn double_open_fails_without_side_effects() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::POLL);
    let mut s = session(&driver);
    s.open(None)?;
    assert!(matches!(s.open(None), Err(VideoError::AlreadyOpen)));
    assert_eq!(Counters::get(&driver.counters.opened), 1);
    assert_eq!(Counters::get(&driver.counters.live), 1);
    assert_eq!(s.state(), SessionState::Opened);
    Ok(())
}

#[test]
fn operations_before_open_and_after_close_fail_with_not_open() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::POLL | Capabilities::PUSH);
    let mut s = session(&driver);

    assert!(matches!(s.get_image(), Err(VideoError::NotOpen)));
    assert!(matches!(s.cap_start(), Err(VideoError::NotOpen)));
    assert!(matches!(s.cap_stop(), Err(VideoError::NotOpen)));
    assert!(matches!(s.get_int(IntParam::Width), Err(VideoError::NotOpen)));
    assert!(matches!(s.set_double(DoubleParam::FocalLength, 1.0), Err(VideoError::NotOpen)));
    assert!(matches!(s.get_string(StringParam::DeviceId), Err(VideoError::NotOpen)));
    assert!(matches!(s.pixel_size(), Err(VideoError::NotOpen)));

    s.open(None)?;
    s.close()?;
    assert!(matches!(s.get_image(), Err(VideoError::NotOpen)));
    assert!(matches!(s.cap_start_async(|_| {}), Err(VideoError::NotOpen)));
    assert_eq!(Counters::get(&driver.counters.polls), 0);
    Ok(())
}

#[test]
fn cap_start_twice_is_busy_and_starts_one_producer() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::PUSH);
    let mut s = session(&driver);
    s.open(None)?;

    s.cap_start()?;
    assert!(matches!(s.cap_start(), Err(VideoError::Busy)));
    assert!(matches!(s.cap_start_async(|_| {}), Err(VideoError::Busy)));
    assert_eq!(Counters::get(&driver.counters.producers_started), 1);
    assert_eq!(s.state(), SessionState::Capturing);
    Ok(())
}

#[test]
fn get_image_before_first_frame_is_none() -> Result<()> {
    let (driver, feed) = FakeDriver::new(Capabilities::PUSH);
    let mut s = session(&driver);
    s.open(None)?;
    s.cap_start()?;
    assert!(s.get_image()?.is_none());

    feed.push(42);
    let reader = s.frame_reader()?;
    assert!(wait_until(|| reader.is_filled()));
    let frame = s.get_image()?.expect("frame delivered");
    assert_eq!(frame.data(), &[42, 42]);
    Ok(())
}

#[test]
fn poll_backends_are_driven_by_get_image() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::POLL);
    let mut s = session(&driver);
    s.open(None)?;
    s.cap_start()?;

    let first = s.get_image()?.expect("poll delivers one frame");
    let second = s.get_image()?.expect("poll delivers one frame");
    assert_eq!(first.sequence, 0);
    assert_eq!(second.sequence, 1);
    assert_eq!(Counters::get(&driver.counters.producers_started), 0);
    Ok(())
}

#[test]
fn stop_then_restart_opens_a_fresh_generation() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::POLL);
    let mut s = session(&driver);
    s.open(None)?;

    assert!(s.cap_stop().is_err());
    s.cap_start()?;
    assert!(s.get_image()?.is_some());
    s.cap_stop()?;
    assert_eq!(s.state(), SessionState::Stopped);
    // 停止后仍可读取最后一帧
    assert!(s.frame_reader()?.latest().is_some());

    s.cap_start()?;
    assert_eq!(s.state(), SessionState::Capturing);
    assert!(s.frame_reader()?.latest().is_none());
    assert_eq!(s.get_image()?.map(|f| f.sequence), Some(0));
    Ok(())
}

#[test]
fn async_capture_requires_push_capability() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::POLL);
    let mut s = session(&driver);
    s.open(None)?;
    assert!(matches!(s.cap_start_async(|_| {}), Err(VideoError::NotSupported)));
    assert_eq!(s.state(), SessionState::Opened);
    Ok(())
}

#[test]
fn callback_state_is_released_on_stop() -> Result<()> {
    let (driver, feed) = FakeDriver::new(Capabilities::PUSH);
    let mut s = session(&driver);
    s.open(None)?;

    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    s.cap_start_async(move |_frame| {
        h.fetch_add(1, Ordering::SeqCst);
    })?;
    feed.push(1);
    assert!(wait_until(|| hits.load(Ordering::SeqCst) == 1));

    s.cap_stop()?;
    assert_eq!(Arc::strong_count(&hits), 1);
    feed.push(2);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn parameters_are_layered_over_the_backend() -> Result<()> {
    let (driver, _feed) = FakeDriver::new(Capabilities::POLL);
    let mut s = session(&driver);

    // Version 不需要打开设备
    assert_eq!(s.get_int(IntParam::Version)?, arvideo_core::version_code());
    s.open(None)?;

    assert_eq!(s.get_int(IntParam::Width)?, 2);
    assert_eq!(s.get_int(IntParam::Height)?, 1);
    assert_eq!(s.get_int(IntParam::PixelFormat)?, arvideo_core::pixel_format::PixelFormat::Mono.code());
    assert_eq!(s.pixel_size()?, 1);
    assert_eq!(s.get_int(IntParam::Gain)?, 7);

    assert!(matches!(s.set_int(IntParam::Width, 320), Err(VideoError::NotSupported)));
    assert!(matches!(s.get_int(IntParam::ZoomAbsolute), Err(VideoError::NotSupported)));
    assert!(matches!(s.get_double(DoubleParam::FocalLength), Err(VideoError::NotSupported)));
    assert!(matches!(s.get_id(), Err(VideoError::NotSupported)));

    assert_eq!(s.get_int(IntParam::InternetState)?, 1);
    s.set_int(IntParam::InternetState, 0)?;
    assert_eq!(s.get_int(IntParam::InternetState)?, 0);
    Ok(())
}
