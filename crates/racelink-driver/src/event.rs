//! 首帧事件（一次性）
//!
//! 会话内第一次成功写入帧时由 [`FrameIngest`](crate::FrameIngest) 触发。
//! 编排层在启动需要图像的控制器前等待它。

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FirstFrameEvent {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl FirstFrameEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发事件；只有真正触发的那次调用返回 `true`
    pub fn set(&self) -> bool {
        let mut fired = self.fired.lock();
        if *fired {
            return false;
        }
        *fired = true;
        self.cond.notify_all();
        true
    }

    pub fn is_set(&self) -> bool {
        *self.fired.lock()
    }

    /// 阻塞直到事件触发或超时
    ///
    /// 返回事件是否已触发
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut fired = self.fired.lock();
        if !*fired {
            let _ = self
                .cond
                .wait_while_for(&mut fired, |fired| !*fired, timeout);
        }
        *fired
    }
}
