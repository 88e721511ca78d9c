//! 控制层错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    /// 帧图像无法解码（跳过本次轮询，保留上一次输出）
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// 学习模型推理失败
    #[error("Model error: {0}")]
    Model(String),

    /// 扭矩表（CSV）读取失败
    #[error("Torque table error: {0}")]
    Table(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Control loop thread panicked")]
    LoopPanicked,
}

impl ControlError {
    /// 是否为单次轮询级别的错误（控制循环继续运行）
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlError::Decode(_) | ControlError::Model(_))
    }
}
