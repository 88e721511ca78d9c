//! 键盘控制
//!
//! 按键采集不在本 crate 内。输入端把按住的按键集合写入 [`KeyState`]，
//! [`ManualController`] 每个 tick 读取一次：
//!
//! - `w` / `z`：左轮 前进 / 后退
//! - `i` / `m`：右轮 前进 / 后退
//! - `space`：保留
//!
//! 按住的按键每个 tick 让对应轮子变化一个步长；没有按键或前后同时按住时归零。

use crate::controller::{ControlInput, Controller};
use crate::error::ControlError;
use racelink_protocol::TorqueCommand;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// 按键按住时每个 tick 的扭矩变化量
pub const DEFAULT_STEP: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    LeftForward,
    LeftBackward,
    RightForward,
    RightBackward,
    Space,
}

impl Key {
    pub const ALL: [Key; 5] = [
        Key::LeftForward,
        Key::LeftBackward,
        Key::RightForward,
        Key::RightBackward,
        Key::Space,
    ];

    pub fn from_char(c: char) -> Option<Key> {
        match c.to_ascii_lowercase() {
            'w' => Some(Key::LeftForward),
            'z' => Some(Key::LeftBackward),
            'i' => Some(Key::RightForward),
            'm' => Some(Key::RightBackward),
            ' ' => Some(Key::Space),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Key::LeftForward => 1 << 0,
            Key::LeftBackward => 1 << 1,
            Key::RightForward => 1 << 2,
            Key::RightBackward => 1 << 3,
            Key::Space => 1 << 4,
        }
    }
}

/// 当前按住的按键集合（单写者：输入端；多读者）
#[derive(Debug, Default)]
pub struct KeyState {
    held: AtomicU8,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: Key) {
        self.held.fetch_or(key.bit(), Ordering::AcqRel);
    }

    pub fn release(&self, key: Key) {
        self.held.fetch_and(!key.bit(), Ordering::AcqRel);
    }

    /// 整体替换按住的集合
    pub fn set_held(&self, keys: impl IntoIterator<Item = Key>) {
        let mask = keys.into_iter().fold(0u8, |mask, key| mask | key.bit());
        self.held.store(mask, Ordering::Release);
    }

    pub fn clear(&self) {
        self.held.store(0, Ordering::Release);
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.load(Ordering::Acquire) & key.bit() != 0
    }

    pub fn held(&self) -> Vec<Key> {
        let mask = self.held.load(Ordering::Acquire);
        Key::ALL
            .into_iter()
            .filter(|key| mask & key.bit() != 0)
            .collect()
    }
}

#[derive(Debug)]
pub struct ManualController {
    keys: Arc<KeyState>,
    step: f64,
    left: f64,
    right: f64,
}

impl ManualController {
    pub fn new(keys: Arc<KeyState>) -> Self {
        Self::with_step(keys, DEFAULT_STEP)
    }

    pub fn with_step(keys: Arc<KeyState>, step: f64) -> Self {
        Self {
            keys,
            step,
            left: 0.0,
            right: 0.0,
        }
    }

    fn wheel(&self, current: f64, forward: Key, backward: Key) -> f64 {
        let delta = self.keys.is_held(forward) as i8 - self.keys.is_held(backward) as i8;
        if delta == 0 {
            return 0.0;
        }
        current + f64::from(delta) * self.step
    }
}

impl Controller for ManualController {
    fn name(&self) -> &str {
        "keyboard"
    }

    fn needs_frame(&self) -> bool {
        false
    }

    fn tick(&mut self, _input: &ControlInput) -> Result<TorqueCommand, ControlError> {
        let left = self.wheel(self.left, Key::LeftForward, Key::LeftBackward);
        let right = self.wheel(self.right, Key::RightForward, Key::RightBackward);

        let command = TorqueCommand::new(left, right);
        self.left = command.left();
        self.right = command.right();
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(controller: &mut ManualController) -> TorqueCommand {
        controller.tick(&ControlInput::default()).unwrap()
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Key::from_char('w'), Some(Key::LeftForward));
        assert_eq!(Key::from_char('M'), Some(Key::RightBackward));
        assert_eq!(Key::from_char(' '), Some(Key::Space));
        assert_eq!(Key::from_char('x'), None);
    }

    #[test]
    fn test_key_state() {
        let keys = KeyState::new();
        keys.press(Key::LeftForward);
        keys.press(Key::RightBackward);
        assert!(keys.is_held(Key::LeftForward));
        assert_eq!(keys.held(), vec![Key::LeftForward, Key::RightBackward]);

        keys.release(Key::LeftForward);
        assert!(!keys.is_held(Key::LeftForward));

        keys.set_held([Key::Space]);
        assert_eq!(keys.held(), vec![Key::Space]);
        keys.clear();
        assert!(keys.held().is_empty());
    }

    #[test]
    fn test_held_key_ramps_and_saturates() {
        let keys = Arc::new(KeyState::new());
        let mut controller = ManualController::new(keys.clone());

        keys.press(Key::LeftForward);
        assert_eq!(tick(&mut controller), TorqueCommand::new(0.25, 0.0));
        assert_eq!(tick(&mut controller), TorqueCommand::new(0.5, 0.0));
        for _ in 0..10 {
            tick(&mut controller);
        }
        assert_eq!(tick(&mut controller), TorqueCommand::new(1.0, 0.0));
    }

    #[test]
    fn test_release_snaps_to_zero() {
        let keys = Arc::new(KeyState::new());
        let mut controller = ManualController::new(keys.clone());

        keys.set_held([Key::LeftForward, Key::RightBackward]);
        tick(&mut controller);
        assert_eq!(tick(&mut controller), TorqueCommand::new(0.5, -0.5));

        keys.release(Key::LeftForward);
        assert_eq!(tick(&mut controller), TorqueCommand::new(0.0, -0.75));
        keys.clear();
        assert_eq!(tick(&mut controller), TorqueCommand::ZERO);
    }

    #[test]
    fn test_opposing_keys_snap_to_zero() {
        let keys = Arc::new(KeyState::new());
        let mut controller = ManualController::new(keys.clone());

        keys.press(Key::LeftForward);
        tick(&mut controller);
        assert_eq!(tick(&mut controller), TorqueCommand::new(0.5, 0.0));

        keys.press(Key::LeftBackward);
        assert_eq!(tick(&mut controller), TorqueCommand::ZERO);

        // 松开后退键后从 0 重新爬升
        keys.release(Key::LeftBackward);
        assert_eq!(tick(&mut controller), TorqueCommand::new(0.25, 0.0));
    }

    #[test]
    fn test_space_does_not_drive() {
        let keys = Arc::new(KeyState::new());
        let mut controller = ManualController::new(keys.clone());
        keys.press(Key::Space);
        assert_eq!(tick(&mut controller), TorqueCommand::ZERO);
    }
}
