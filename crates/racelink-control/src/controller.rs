//! Controller trait - 控制器通用接口
//!
//! # 设计理念
//!
//! - **Tick 模式**: 控制循环负责定时与读取最新状态，控制器只负责计算
//! - **最新值语义**: 每次 tick 拿到的是 FrameStore 中的最新帧，
//!   可能与上次相同（重复处理），也可能跳过了若干帧
//! - **输出钳位**: 返回 `TorqueCommand`，构造时已钳位到 `[-1, 1]`
//!
//! # 示例
//!
//! ```rust
//! use racelink_control::{ControlError, ControlInput, Controller};
//! use racelink_protocol::TorqueCommand;
//!
//! /// 原地旋转
//! struct Spin;
//!
//! impl Controller for Spin {
//!     fn name(&self) -> &str {
//!         "spin"
//!     }
//!
//!     fn needs_frame(&self) -> bool {
//!         false
//!     }
//!
//!     fn tick(&mut self, _input: &ControlInput) -> Result<TorqueCommand, ControlError> {
//!         Ok(TorqueCommand::new(0.5, -0.5))
//!     }
//! }
//! ```

use crate::error::ControlError;
use racelink_driver::Frame;
use racelink_protocol::TorqueCommand;
use std::sync::Arc;

/// 一次 tick 的输入
#[derive(Debug, Clone, Default)]
pub struct ControlInput {
    /// FrameStore 中的最新帧（首帧之前为 `None`）
    pub frame: Option<Arc<Frame>>,
    /// 最新荷电状态
    pub charge: f64,
}

/// 控制器通用接口
///
/// 控制器在控制循环线程上运行，因此要求 `Send`。
pub trait Controller: Send {
    /// 控制器名称（日志用）
    fn name(&self) -> &str;

    /// 是否需要图像输入
    ///
    /// 返回 `true` 时，首帧到达之前控制循环直接输出零扭矩，不调用 `tick()`。
    fn needs_frame(&self) -> bool {
        true
    }

    /// 计算一步控制输出
    ///
    /// # 错误
    ///
    /// `ControlError::Decode` / `ControlError::Model` 视为单次失败：
    /// 控制循环保留上一次输出并继续。
    fn tick(&mut self, input: &ControlInput) -> Result<TorqueCommand, ControlError>;
}

impl<C: Controller + ?Sized> Controller for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn needs_frame(&self) -> bool {
        (**self).needs_frame()
    }

    fn tick(&mut self, input: &ControlInput) -> Result<TorqueCommand, ControlError> {
        (**self).tick(input)
    }
}
