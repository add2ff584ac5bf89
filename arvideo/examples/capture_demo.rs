// arvideo/examples/capture_demo.rs
//
// cargo run -p arvideo --example capture_demo -- "-device=Dummy -width=320 -height=240 -fps=60"
// RUST_LOG=debug 可以看到后端与标定查询的详细日志

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use arvideo::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = std::env::args().nth(1);
    let mut session = CaptureSession::new();
    session.registry().print_help();

    // 1. 打开设备
    // 没有参数时使用 ARVIDEO_VCONF，再没有则使用编译期默认设备
    session.open(config.as_deref())?;
    let (w, h) = session.size()?;
    println!(
        "Opened {} {}x{} {} (pixel size {})",
        session.device_type()?,
        w,
        h,
        session.pixel_format()?,
        session.pixel_size()?
    );

    // 2. 同步采集：get_image 从不阻塞，没有新帧时返回 None
    session.cap_start()?;
    let start = Instant::now();
    let mut frames = 0;
    while start.elapsed() < Duration::from_secs(1) {
        if let Some(frame) = session.get_image()? {
            frames += 1;
            if frames == 1 {
                println!("First frame: seq={} planes={} time={:?}", frame.sequence, frame.plane_count(), frame.time);
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    session.cap_stop()?;
    println!("Sync capture: {} frames in 1s", frames);

    // 3. 异步采集：回调在后端线程上运行，只做计数
    let counter = Arc::new(AtomicU64::new(0));
    let c = Arc::clone(&counter);
    if session.capabilities()?.contains(Capabilities::PUSH) {
        session.cap_start_async(move |_frame| {
            c.fetch_add(1, Ordering::Relaxed);
        })?;
        std::thread::sleep(Duration::from_secs(1));
        session.cap_stop()?;
        println!(
            "Async capture: {} callbacks, telemetry {:?}",
            counter.load(Ordering::Relaxed),
            session.stats()?
        );
    }

    // 4. 标定查询
    match session.get_camera_params_blocking(Duration::from_secs(5)) {
        Ok(result) => match result.params {
            Some(p) => println!("Calibration {:?}: fx={:.1} fy={:.1} c={:?}", result.state, p.fx(), p.fy(), p.principal_point()),
            None => println!("Calibration {:?}: no parameters available", result.state),
        },
        Err(e) => eprintln!("Calibration request failed: {}", e),
    }

    session.close()?;
    Ok(())
}
