//! 扭矩命令
//!
//! 左右驱动轮的执行量。构造时即钳位，因此任何 `TorqueCommand` 的分量
//! 都保证落在 `[-1.0, 1.0]` 内。

/// 扭矩分量下限
pub const TORQUE_MIN: f64 = -1.0;
/// 扭矩分量上限
pub const TORQUE_MAX: f64 = 1.0;

/// 将单个扭矩值钳位到 `[-1.0, 1.0]`
///
/// NaN 视为 0（没有可信的输出时不驱动车轮）。
pub fn saturate(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(TORQUE_MIN, TORQUE_MAX)
}

/// 左右轮扭矩命令
///
/// 字段私有，只能通过 [`TorqueCommand::new`] 构造，保证钳位不变量。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TorqueCommand {
    left: f64,
    right: f64,
}

impl TorqueCommand {
    /// 零扭矩（停车）
    pub const ZERO: TorqueCommand = TorqueCommand {
        left: 0.0,
        right: 0.0,
    };

    /// 创建命令（两个分量都会被钳位）
    pub fn new(left: f64, right: f64) -> Self {
        Self {
            left: saturate(left),
            right: saturate(right),
        }
    }

    /// 左轮扭矩
    pub fn left(&self) -> f64 {
        self.left
    }

    /// 右轮扭矩
    pub fn right(&self) -> f64 {
        self.right
    }

    /// 是否为零扭矩
    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

impl From<(f64, f64)> for TorqueCommand {
    fn from((left, right): (f64, f64)) -> Self {
        Self::new(left, right)
    }
}
