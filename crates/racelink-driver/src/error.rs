//! 驱动层错误类型定义

use crate::transport::TransportError;
use racelink_protocol::ProtocolError;
use thiserror::Error;

/// 传感器帧摄取错误
///
/// 两种错误都是单条消息级别的：丢弃该消息、记录日志、会话继续，
/// 且不会修改 `FrameStore`。
#[derive(Error, Debug)]
pub enum IngestError {
    /// 长度前缀或 JSON 头无法解析
    #[error("Bad sensor header: {0}")]
    BadHeader(String),

    /// JPEG 负载为空或小于最小阈值（截断帧）
    #[error("Sensor frame too small: {actual} bytes (minimum {min})")]
    TooSmall { min: usize, actual: usize },
}

impl From<ProtocolError> for IngestError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::TooSmall { min, actual } => IngestError::TooSmall { min, actual },
            other => IngestError::BadHeader(other.to_string()),
        }
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO 错误（绑定端口、创建线程等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 出站消息发送失败（对端已关闭），对会话是致命的
    #[error("Send failure: {0}")]
    SendFailure(TransportError),

    /// 会话已结束（IO 线程退出）
    #[error("Session closed")]
    ChannelClosed,

    /// 出站队列已满
    #[error("Outbox full (capacity: {0})")]
    ChannelFull(usize),

    /// 配置无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 等待连接时收到取消信号
    #[error("Cancelled")]
    Cancelled,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}
