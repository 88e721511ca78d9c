//! # racelink-control
//!
//! 控制层：把 FrameStore 中的最新帧与荷电状态转换为左右轮扭矩。
//!
//! - [`Controller`] - 控制器通用接口（tick 模式）
//! - [`StartSignalDetector`] - 三灯发车信号检测
//! - [`LineTracker`] - 白线循迹（最小二乘拟合）
//! - [`RuleBasedController`] - 等待发车 → 循迹 状态机
//! - [`ManualController`] - 键盘控制
//! - [`TableController`] - CSV 扭矩表回放
//! - [`InferenceController`] - 学习模型外壳
//! - [`ControlLoop`] - 控制循环线程
//!
//! # 示例
//!
//! ```rust,no_run
//! use racelink_control::{ControlLoop, LoopConfig, RuleBasedController};
//! use racelink_driver::{CommandSource, PipelineConfig, SessionServer, TorqueSink};
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = SessionServer::bind("127.0.0.1:12346", PipelineConfig::default())?;
//! let output = Arc::new(TorqueSink::new());
//! let keep_running = AtomicBool::new(true);
//! let session = server.accept(output.clone() as Arc<dyn CommandSource>, &keep_running)?;
//!
//! let control = ControlLoop::spawn(
//!     Box::new(RuleBasedController::default()),
//!     session.context().clone(),
//!     output,
//!     session.running_flag(),
//!     LoopConfig::default(),
//! )?;
//! let stats = control.join()?;
//! println!("{} control ticks", stats.iterations);
//! # Ok(())
//! # }
//! ```

mod error;

pub mod controller;
pub mod inference;
pub mod line_tracker;
pub mod manual;
pub mod rule_based;
pub mod runner;
pub mod start_signal;
pub mod table;
pub mod vision;

pub use controller::{ControlInput, Controller};
pub use error::ControlError;
pub use inference::{INPUT_LEN, INPUT_SIZE, InferenceController, TorqueModel};
pub use line_tracker::{LineFit, LineTracker, LineTrackerConfig, TrackOutcome};
pub use manual::{Key, KeyState, ManualController};
pub use rule_based::{RobotState, RuleBasedController};
pub use runner::{ControlLoop, LoopConfig, LoopStats, LoopStatsSnapshot, run_control_loop, step_once};
pub use start_signal::{LampBand, LampObservation, StartSignalConfig, StartSignalDetector};
pub use table::TableController;
pub use vision::decode_jpeg;
