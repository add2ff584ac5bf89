//! 每个所有者 (会话) 一个的标定请求槽
//!
//! - 同一时间最多一个未完成的请求，第二个请求立即返回 Busy，不影响原请求
//! - 回调在到达终态时恰好调用一次
//! - 解析任务只持有槽的弱引用；`close()` 返回后回调不会再被调用

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arvideo_core::error::{Result, VideoError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::resolver::{CalibrationRequest, CalibrationResolver, CalibrationResult, CalibrationState};

/// 标定完成回调，终态时调用一次
pub type CalibrationCallback = Box<dyn FnOnce(CalibrationResult) + Send>;

struct Gate {
    pending: bool,
    closed: bool,
    state: Option<CalibrationState>,
    callback: Option<CalibrationCallback>,
    task: Option<JoinHandle<()>>,
}

struct SlotInner {
    gate: Mutex<Gate>,
    /// 回调执行期间持有；close() 通过它等待正在执行的回调
    firing: Mutex<()>,
}

pub struct CalibrationSlot {
    inner: Arc<SlotInner>,
}

impl fmt::Debug for CalibrationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = lock(&self.inner.gate);
        f.debug_struct("CalibrationSlot")
            .field("pending", &gate.pending)
            .field("closed", &gate.closed)
            .field("state", &gate.state)
            .finish()
    }
}

impl Default for CalibrationSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                gate: Mutex::new(Gate {
                    pending: false,
                    closed: false,
                    state: None,
                    callback: None,
                    task: None,
                }),
                firing: Mutex::new(()),
            }),
        }
    }

    /// 提交请求，解析在 `runtime` 上异步进行
    pub fn submit(
        &self,
        runtime: &Handle,
        resolver: &CalibrationResolver,
        request: CalibrationRequest,
        callback: CalibrationCallback,
    ) -> Result<()> {
        // 1. 检查并占用槽位
        let mut gate = lock(&self.inner.gate);
        if gate.closed {
            return Err(VideoError::NotOpen);
        }
        if gate.pending {
            tracing::warn!(target: "arvideo::calib", "calibration request rejected: another request is pending");
            return Err(VideoError::Busy);
        }
        gate.pending = true;
        gate.state = Some(CalibrationState::Initial);
        gate.callback = Some(callback);

        // 2. 任务只持有弱引用，所有者销毁后不会延长槽的生命周期
        let weak = Arc::downgrade(&self.inner);
        let resolver = resolver.clone();
        let task = runtime.spawn(async move {
            let progress = weak.clone();
            let result = resolver
                .resolve(&request, move |state| {
                    if let Some(inner) = progress.upgrade() {
                        let mut gate = lock(&inner.gate);
                        if gate.pending {
                            gate.state = Some(state);
                        }
                    }
                })
                .await;
            complete(&weak, result);
        });
        gate.task = Some(task);
        Ok(())
    }

    /// 当前 (或最近一次) 请求的状态
    pub fn state(&self) -> Option<CalibrationState> {
        lock(&self.inner.gate).state
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner.gate).pending
    }

    /// 关闭槽位
    ///
    /// 正在执行的回调会先执行完；之后挂起的请求被丢弃，它的回调永远不会被调用。
    /// 【关键】不能在标定回调内部调用，否则会死锁。
    pub fn close(&self) {
        let _firing = lock(&self.inner.firing);
        let mut gate = lock(&self.inner.gate);
        if gate.pending {
            tracing::debug!(target: "arvideo::calib", "closing with a pending calibration request; callback dropped");
        }
        gate.closed = true;
        gate.pending = false;
        if let Some(task) = gate.task.take() {
            task.abort();
        }
        // 闭包在锁内释放
        gate.callback.take();
    }
}

impl Drop for CalibrationSlot {
    fn drop(&mut self) {
        self.close();
    }
}

fn complete(weak: &Weak<SlotInner>, result: CalibrationResult) {
    // 所有者已销毁
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let _firing = lock(&inner.firing);
    let callback = {
        let mut gate = lock(&inner.gate);
        if gate.closed {
            return;
        }
        gate.pending = false;
        gate.state = Some(result.state);
        gate.task = None;
        gate.callback.take()
    };

    tracing::debug!(target: "arvideo::calib", state = ?result.state, "calibration lookup finished");
    // gate 锁已释放，回调内可以再次提交请求
    if let Some(callback) = callback {
        callback(result);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
