//! 旧接口的返回码边界
//!
//! 内部使用带类型的错误；只有在需要兼容平铺返回码 (0 成功，-1 失败) 的地方才做这种合并。

use std::sync::Arc;

use arvideo_core::error::Result;
use arvideo_core::frame::FrameBuffer;

/// 成功为 0，任何错误为 -1
pub fn status<T>(result: Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            tracing::debug!(target: "arvideo::compat", "operation failed: {}", e);
            e.legacy_code()
        }
    }
}

/// get_image 的旧语义：出错与无帧都返回 None
pub fn image_or_null(result: Result<Option<Arc<FrameBuffer>>>) -> Option<Arc<FrameBuffer>> {
    result.ok().flatten()
}

/// 取值类接口：失败时返回 (-1, None)
pub fn value_or_status<T>(result: Result<T>) -> (i32, Option<T>) {
    match result {
        Ok(v) => (0, Some(v)),
        Err(e) => (e.legacy_code(), None),
    }
}
