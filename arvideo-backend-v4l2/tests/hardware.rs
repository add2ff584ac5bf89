#![cfg(target_os = "linux")]

// 需要真实摄像头：cargo test -p arvideo-backend-v4l2 -- --ignored

use std::time::{Duration, Instant};

use anyhow::Result;
use arvideo_backend_v4l2::V4l2Driver;
use arvideo_core::slot::{DeliveryMode, FrameSlot};
use arvideo_core::traits::{Capabilities, Driver};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
#[ignore = "requires a V4L2 capture device"]
fn captures_frames_from_first_device() -> Result<()> {
    init_logging();
    let driver = V4l2Driver::new();
    let sources = driver.list_sources("")?;
    let Some(first) = sources.first() else {
        return Ok(());
    };

    let mut backend = driver.open(&first.open_token)?;
    assert!(backend.capabilities().contains(Capabilities::PUSH));
    let (w, h) = backend.size();

    let slot = FrameSlot::new();
    let reader = slot.reader();
    backend.cap_start(slot.begin(None), DeliveryMode::Push)?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while reader.latest().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let frame = reader.latest().expect("no frame within 5s");
    assert_eq!((frame.width, frame.height), (w, h));
    assert_eq!(frame.to_vec().len(), backend.pixel_format().frame_size(w, h));

    slot.end();
    backend.cap_stop()?;
    backend.close()?;
    backend.close()?;
    Ok(())
}

#[test]
fn missing_node_fails_open() {
    let err = V4l2Driver::new().open("-dev=/dev/arvideo-no-such-node").err();
    assert!(matches!(
        err,
        Some(arvideo_core::error::VideoError::BackendInitFailed(_))
    ));
}
