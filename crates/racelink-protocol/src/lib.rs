//! # Racelink Protocol
//!
//! 仿真车辆桥接协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `command`: 扭矩命令（左右轮，钳位到 `[-1, 1]`）
//! - `packet`: 传感器二进制包（长度前缀 + JSON 头 + JPEG）
//! - `message`: 文本 JSON 消息（握手、控制、比赛结束）
//! - `telemetry`: 对端上报的比赛元数据
//!
//! ## 字节序
//!
//! 二进制包的长度前缀使用小端字节序（little-endian u32）。

pub mod command;
pub mod message;
pub mod packet;
pub mod telemetry;

// 重新导出常用类型
pub use command::*;
pub use message::*;
pub use packet::*;
pub use telemetry::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid packet length: expected at least {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Bad sensor header: {0}")]
    BadHeader(String),

    #[error("JPEG payload too small: {actual} bytes (minimum {min})")]
    TooSmall { min: usize, actual: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// 小端字节序转 u32（长度前缀）
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// u32 转小端字节序（长度前缀）
pub fn u32_to_bytes_le(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}
