mod common;

use std::time::Duration;

use anyhow::Result;
use arvideo::calib::ResolverConfig;
use arvideo::CaptureSession;
use arvideo_core::traits::Capabilities;
use common::FakeDriver;
use crossbeam_channel::{unbounded, RecvTimeoutError};

const WAIT: Duration = Duration::from_secs(5);

/// 三帧依次到达：每次回调都停在同步点，由测试决定何时放行。
/// 回调没有拷贝帧数据时，下一次回调之后 get_image 看到的是新帧；
/// 回调期间拿到的 Arc 仍然指向旧帧 (不会被撕裂或覆盖)。
#[test]
fn slow_consumer_observes_last_frame_wins() -> Result<()> {
    let (driver, feed) = FakeDriver::new(Capabilities::PUSH);
    let mut session = CaptureSession::with_registry(driver.registry())
        .with_resolver_config(ResolverConfig::default());
    session.open(Some("-device=Dummy"))?;

    let (seen_tx, seen_rx) = unbounded();
    let (go_tx, go_rx) = unbounded::<()>();
    session.cap_start_async(move |frame| {
        let _ = seen_tx.send(frame.data()[0]);
        // 同步点：等测试放行
        let _ = go_rx.recv_timeout(WAIT);
    })?;

    // 第 1 帧：回调进行中，get_image 返回第 1 帧
    feed.push(1);
    assert_eq!(seen_rx.recv_timeout(WAIT)?, 1);
    let during_first = session.get_image()?.expect("frame 1 published before callback");
    assert_eq!(during_first.data(), &[1, 1]);
    assert_eq!(during_first.sequence, 0);
    go_tx.send(())?;

    // 第 2 帧：消费者没有拷贝第 1 帧，get_image 现在给出第 2 帧
    feed.push(2);
    assert_eq!(seen_rx.recv_timeout(WAIT)?, 2);
    let after_second = session.get_image()?.expect("frame 2 published");
    assert_eq!(after_second.data(), &[2, 2]);
    assert_eq!(after_second.sequence, 1);
    // 持有的旧快照保持完整
    assert_eq!(during_first.data(), &[1, 1]);
    go_tx.send(())?;

    feed.push(3);
    assert_eq!(seen_rx.recv_timeout(WAIT)?, 3);
    go_tx.send(())?;

    session.cap_stop()?;
    let stats = session.stats()?;
    assert_eq!(stats.callback_invocations, 3);
    assert_eq!(stats.delivered_frames, 3);
    // 第 3 帧从未通过 get_image 读取，但它没有被覆盖
    assert_eq!(stats.overwritten_frames, 0);

    // 停止之后不会再有回调
    feed.push(4);
    assert!(matches!(
        seen_rx.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected)
    ));
    Ok(())
}

/// 消费者完全不读取时，中间帧被计为覆盖丢帧，而不是排队
#[test]
fn unread_frames_are_overwritten_not_queued() -> Result<()> {
    let (driver, feed) = FakeDriver::new(Capabilities::PUSH);
    let mut session = CaptureSession::with_registry(driver.registry())
        .with_resolver_config(ResolverConfig::default());
    session.open(None)?;

    let (seen_tx, seen_rx) = unbounded();
    session.cap_start_async(move |frame| {
        let _ = seen_tx.send(frame.sequence);
    })?;
    for tag in 1..=5 {
        feed.push(tag);
    }
    for expected in 0..5u64 {
        assert_eq!(seen_rx.recv_timeout(WAIT)?, expected);
    }

    let latest = session.get_image()?.expect("frames delivered");
    assert_eq!(latest.data(), &[5, 5]);
    let stats = session.stats()?;
    assert_eq!(stats.overwritten_frames, 4);

    session.close()?;
    Ok(())
}
