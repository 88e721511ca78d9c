//! 进程内传输（crossbeam Channel 对）
//!
//! 桥接端拿到 [`ChannelTransport`]，对端拿到 [`PeerEndpoint`]。
//! 出站消息以线上 JSON 文本传递，与 WebSocket 完全一致。

use super::{Incoming, RxAdapter, SplittableTransport, TransportError, TxAdapter};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use racelink_protocol::BridgeMessage;
use std::time::Duration;

const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(5);

/// 创建一对进程内端点
///
/// `capacity` 是对端 → 桥接方向的队列容量（对端发送时会在队列满时阻塞）。
///
/// 接收超时默认 5ms，只能通过 [`ChannelTransport::with_receive_timeout`] 设置；
/// `PipelineConfig::receive_timeout_ms` 只作用于 [`SessionServer`](crate::SessionServer)
/// 接受的 WebSocket 连接。
pub fn channel_transport(capacity: usize) -> (ChannelTransport, PeerEndpoint) {
    let (inbound_tx, inbound_rx) = bounded(capacity);
    let (outbound_tx, outbound_rx) = unbounded();
    (
        ChannelTransport {
            inbound_rx,
            outbound_tx,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        },
        PeerEndpoint {
            inbound_tx,
            outbound_rx,
        },
    )
}

/// 桥接端
pub struct ChannelTransport {
    inbound_rx: Receiver<Incoming>,
    outbound_tx: Sender<String>,
    receive_timeout: Duration,
}

impl ChannelTransport {
    /// 设置 RX 线程单次接收的等待时间
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

impl SplittableTransport for ChannelTransport {
    type Rx = ChannelRx;
    type Tx = ChannelTx;

    fn split(self) -> Result<(ChannelRx, ChannelTx), TransportError> {
        Ok((
            ChannelRx {
                rx: self.inbound_rx,
                timeout: self.receive_timeout,
            },
            ChannelTx {
                tx: Some(self.outbound_tx),
            },
        ))
    }
}

pub struct ChannelRx {
    rx: Receiver<Incoming>,
    timeout: Duration,
}

impl RxAdapter for ChannelRx {
    fn receive(&mut self) -> Result<Incoming, TransportError> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(msg) => Ok(msg),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

pub struct ChannelTx {
    tx: Option<Sender<String>>,
}

impl TxAdapter for ChannelTx {
    fn send(&mut self, message: &BridgeMessage) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        let text = message.to_json()?;
        tx.send(text).map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        // drop Sender，对端随后收到 Disconnected
        self.tx = None;
    }
}

/// 对端（仿真引擎的进程内替身）
///
/// drop 即关闭连接。
pub struct PeerEndpoint {
    inbound_tx: Sender<Incoming>,
    outbound_rx: Receiver<String>,
}

impl PeerEndpoint {
    /// 发送二进制消息（传感器包）
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), TransportError> {
        self.inbound_tx
            .send(Incoming::Binary(data.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// 发送文本消息
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.inbound_tx
            .send(Incoming::Text(text.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// 接收一条桥接端发出的原始 JSON 文本
    pub fn recv_text(&self, timeout: Duration) -> Result<String, TransportError> {
        match self.outbound_rx.recv_timeout(timeout) {
            Ok(text) => Ok(text),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// 接收并解析一条桥接端消息
    pub fn recv_timeout(&self, timeout: Duration) -> Result<BridgeMessage, TransportError> {
        let text = self.recv_text(timeout)?;
        Ok(BridgeMessage::from_json(&text)?)
    }

    /// 取出当前已排队的全部消息（不等待）
    pub fn drain(&self) -> Vec<String> {
        self.outbound_rx.try_iter().collect()
    }

    /// 关闭连接
    pub fn close(self) {}
}
