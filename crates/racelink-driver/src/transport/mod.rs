//! 传输层抽象
//!
//! 会话只依赖两个只读/只写半边：
//!
//! - [`RxAdapter`]: 接收入站消息（带超时，`TransportError::Timeout` 是正常结果）
//! - [`TxAdapter`]: 发送出站 JSON 消息
//!
//! 实现：
//!
//! - [`websocket`]: WebSocket over TCP（仿真引擎对端）
//! - [`channel`]: 进程内 Channel 对（进程内协作方与测试）

pub mod channel;
pub mod websocket;

use bytes::Bytes;
use racelink_protocol::{BridgeMessage, ProtocolError};
use std::io;
use thiserror::Error;

pub use channel::{ChannelRx, ChannelTransport, ChannelTx, PeerEndpoint, channel_transport};
pub use websocket::{WsListener, WsRx, WsTransport, WsTx};

/// 入站消息
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// 二进制消息（传感器包）
    Binary(Bytes),
    /// 文本消息（JSON）
    Text(String),
    /// 控制帧（ping/pong 等），由传输层自行处理
    Control,
}

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    /// 读超时（无数据），非致命
    #[error("Receive timeout")]
    Timeout,

    /// 对端已关闭连接
    #[error("Connection closed by peer")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// 除超时外，所有错误都会结束会话
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Timeout)
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        use tungstenite::error::ProtocolError as WsProtocolError;

        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            },
            tungstenite::Error::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => {
                TransportError::Closed
            },
            tungstenite::Error::Io(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                TransportError::Timeout
            },
            tungstenite::Error::Io(e) => TransportError::Io(e),
            other => TransportError::WebSocket(Box::new(other)),
        }
    }
}

/// 只读半边
pub trait RxAdapter {
    /// 接收一条消息
    ///
    /// 超时返回 `TransportError::Timeout`，调用方应继续循环。
    fn receive(&mut self) -> Result<Incoming, TransportError>;
}

/// 只写半边
pub trait TxAdapter {
    /// 发送一条出站消息（单次尝试，不重试）
    fn send(&mut self, message: &BridgeMessage) -> Result<(), TransportError>;

    /// 关闭连接（尽力而为）
    fn close(&mut self) {}
}

/// 可分离为 RX/TX 两个半边的传输
pub trait SplittableTransport {
    type Rx: RxAdapter + Send + 'static;
    type Tx: TxAdapter + Send + 'static;

    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError>;
}
