use std::sync::OnceLock;

use arvideo_core::error::{Result, VideoError};
use tokio::runtime::{Handle, Runtime};

// 全局单例 Runtime (创建失败的结果也会被记住，不会反复重试)
static RUNTIME: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

/// 获取全局 Runtime，如果不存在则创建
/// 这允许用户不写 #[tokio::main] 也能发起标定查询
pub(crate) fn get_runtime() -> Result<&'static Runtime> {
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .worker_threads(2) // 这里的 IO 任务不繁重，2个线程足矣
                .thread_name("arvideo-bg-worker")
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| VideoError::Failed(format!("failed to create background runtime: {}", e)))
}

/// 后台 Runtime 的句柄，标定任务在这里运行
pub(crate) fn handle() -> Result<Handle> {
    Ok(get_runtime()?.handle().clone())
}
