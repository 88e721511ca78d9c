//! 规则控制器（状态机）
//!
//! ```text
//! WaitingStart ──(发车信号)──> RunStraight
//! RunCorner: 预留状态，输出零扭矩
//! ```
//!
//! | 状态 | 输入 | 输出 | 下一状态 |
//! |---|---|---|---|
//! | WaitingStart | 未发车 | (0, 0) | WaitingStart |
//! | WaitingStart | 发车 | (0, 0) | RunStraight |
//! | RunStraight | 任意帧 | LineTracker 输出 | RunStraight |
//! | RunCorner | 任意 | (0, 0) | RunCorner |
//!
//! 每次 tick 处理 FrameStore 中的最新帧；同一帧被重复处理时复用上一次的解码结果。

use crate::controller::{ControlInput, Controller};
use crate::error::ControlError;
use crate::line_tracker::{LineTracker, LineTrackerConfig};
use crate::start_signal::{StartSignalConfig, StartSignalDetector};
use crate::vision::decode_jpeg;
use image::RgbImage;
use racelink_driver::FrameId;
use racelink_protocol::TorqueCommand;
use std::fmt;
use tracing::info;

/// 车辆状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RobotState {
    /// 等待发车信号
    #[default]
    WaitingStart,
    /// 循线行驶
    RunStraight,
    /// 弯道（预留，未实现）
    RunCorner,
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotState::WaitingStart => write!(f, "WAITING_START"),
            RobotState::RunStraight => write!(f, "RUN_STRAIGHT"),
            RobotState::RunCorner => write!(f, "RUN_CORNER"),
        }
    }
}

/// 规则控制器（每个会话一个实例）
#[derive(Debug, Default)]
pub struct RuleBasedController {
    state: RobotState,
    detector: StartSignalDetector,
    tracker: LineTracker,
    decoded: Option<(FrameId, RgbImage)>,
}

impl RuleBasedController {
    pub fn new(signal: StartSignalConfig, tracking: LineTrackerConfig) -> Self {
        Self {
            state: RobotState::WaitingStart,
            detector: StartSignalDetector::new(signal),
            tracker: LineTracker::new(tracking),
            decoded: None,
        }
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn detector(&self) -> &StartSignalDetector {
        &self.detector
    }

    /// 对已解码的图像执行一步状态机
    pub fn step(&mut self, charge: f64, image: &RgbImage) -> TorqueCommand {
        match self.state {
            RobotState::WaitingStart => {
                if self.detector.observe(image) {
                    self.transition(RobotState::RunStraight);
                }
                TorqueCommand::ZERO
            },
            RobotState::RunStraight => self.tracker.track(charge, image),
            RobotState::RunCorner => TorqueCommand::ZERO,
        }
    }

    fn transition(&mut self, next: RobotState) {
        info!("Rule-based controller: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl Controller for RuleBasedController {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn tick(&mut self, input: &ControlInput) -> Result<TorqueCommand, ControlError> {
        let Some(frame) = input.frame.as_ref() else {
            return Ok(TorqueCommand::ZERO);
        };

        let (id, image) = match self.decoded.take() {
            Some((id, image)) if id == frame.id() => (id, image),
            _ => (frame.id(), decode_jpeg(frame.image())?),
        };

        let command = self.step(input.charge, &image);
        self.decoded = Some((id, image));
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::start_signal::LampObservation;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([220, 20, 20]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn lamps(lit: bool) -> RgbImage {
        let mut image = RgbImage::new(200, 100);
        if lit {
            for (x0, x1) in [(70, 100), (110, 140), (150, 180)] {
                for y in 0..20 {
                    for x in x0..x1 {
                        image.put_pixel(x, y, RED);
                    }
                }
            }
        }
        // 前视区域中有一条明显的线，等待阶段也不能驱动
        for x in 60..=140 {
            image.put_pixel(x, 70, WHITE);
        }
        image
    }

    #[test]
    fn test_waiting_start_outputs_zero() {
        let mut controller = RuleBasedController::default();
        for _ in 0..5 {
            assert_eq!(controller.step(1.0, &lamps(false)), TorqueCommand::ZERO);
        }
        assert_eq!(controller.state(), RobotState::WaitingStart);
    }

    #[test]
    fn test_go_transitions_to_run_straight() {
        let mut controller = RuleBasedController::default();
        assert_eq!(controller.step(1.0, &lamps(true)), TorqueCommand::ZERO);
        assert!(controller.detector().is_armed());
        assert_eq!(controller.step(1.0, &lamps(false)), TorqueCommand::ZERO);
        assert_eq!(controller.state(), RobotState::RunStraight);

        // 线在中心，水平 → (0.3, 0.3)
        let command = controller.step(1.0, &lamps(false));
        assert!((command.left() - 0.3).abs() < 1e-9);
        assert!((command.right() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_run_straight_respects_low_charge() {
        let mut controller = RuleBasedController::default();
        controller.step(1.0, &lamps(true));
        controller.step(1.0, &lamps(false));
        assert_eq!(controller.step(0.1, &lamps(false)), TorqueCommand::ZERO);
    }

    #[test]
    fn test_run_corner_outputs_zero() {
        let mut controller = RuleBasedController {
            state: RobotState::RunCorner,
            ..Default::default()
        };
        assert_eq!(controller.step(1.0, &lamps(false)), TorqueCommand::ZERO);
        assert_eq!(controller.state(), RobotState::RunCorner);
    }

    #[test]
    fn test_tick_without_frame_is_zero() {
        let mut controller = RuleBasedController::default();
        let command = controller.tick(&ControlInput::default()).unwrap();
        assert_eq!(command, TorqueCommand::ZERO);
    }

    #[test]
    fn test_partial_lamps_do_not_start() {
        let mut controller = RuleBasedController::default();
        // 直接驱动检测器：2 灯 → 全灭，不应发车
        assert!(!controller.detector.update(LampObservation::new([true, true, false])));
        assert_eq!(controller.step(1.0, &lamps(false)), TorqueCommand::ZERO);
        assert_eq!(controller.state(), RobotState::WaitingStart);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RobotState::WaitingStart.to_string(), "WAITING_START");
        assert_eq!(RobotState::RunStraight.to_string(), "RUN_STRAIGHT");
    }
}
