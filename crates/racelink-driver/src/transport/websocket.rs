//! WebSocket 传输（tungstenite，阻塞 IO）
//!
//! 读写两个半边共享同一个 `WebSocket<TcpStream>`，由 `parking_lot::Mutex` 保护：
//!
//! - RX 持锁最多一个读超时（默认 5ms），读完用 `unlock_fair` 释放，
//!   保证等锁的 TX 线程一定能拿到锁，不会被连续的读饿死
//! - TX 每次发送一条完整消息后释放

use super::{Incoming, RxAdapter, SplittableTransport, TransportError, TxAdapter};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use racelink_protocol::BridgeMessage;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use tungstenite::{Message, WebSocket};

/// 握手阶段的读超时
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// accept 轮询间隔（检查取消标志）
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// WebSocket 监听器（一次只服务一个对端）
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// 等待一个对端连接并完成 WebSocket 升级
    ///
    /// `keep_running` 被清除时返回 `Ok(None)`。
    pub fn accept(
        &self,
        receive_timeout: Duration,
        keep_running: &AtomicBool,
    ) -> Result<Option<WsTransport>, TransportError> {
        loop {
            if !keep_running.load(Ordering::Acquire) {
                debug!("Accept cancelled");
                return Ok(None);
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("Peer connected from {}", peer);
                    return WsTransport::upgrade(stream, peer, receive_timeout).map(Some);
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// 已完成升级的 WebSocket 连接
pub struct WsTransport {
    socket: WebSocket<TcpStream>,
    peer: SocketAddr,
}

impl WsTransport {
    fn upgrade(
        stream: TcpStream,
        peer: SocketAddr,
        receive_timeout: Duration,
    ) -> Result<Self, TransportError> {
        // 监听器是非阻塞的，部分平台上 accept 出来的 socket 会继承该属性
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let socket =
            tungstenite::accept(stream).map_err(|e| TransportError::Handshake(e.to_string()))?;

        // 读超时不能为 0（set_read_timeout 会拒绝）
        let timeout = receive_timeout.max(Duration::from_millis(1));
        socket.get_ref().set_read_timeout(Some(timeout))?;
        debug!("WebSocket upgrade complete for {}", peer);

        Ok(Self { socket, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl SplittableTransport for WsTransport {
    type Rx = WsRx;
    type Tx = WsTx;

    fn split(self) -> Result<(WsRx, WsTx), TransportError> {
        let socket = Arc::new(Mutex::new(self.socket));
        Ok((
            WsRx {
                socket: socket.clone(),
            },
            WsTx { socket },
        ))
    }
}

pub struct WsRx {
    socket: Arc<Mutex<WebSocket<TcpStream>>>,
}

impl RxAdapter for WsRx {
    fn receive(&mut self) -> Result<Incoming, TransportError> {
        let mut socket = self.socket.lock();
        let result = socket.read();
        MutexGuard::unlock_fair(socket);

        match result? {
            Message::Binary(data) => Ok(Incoming::Binary(Bytes::from(data))),
            Message::Text(text) => Ok(Incoming::Text(text)),
            Message::Close(frame) => {
                debug!("Peer sent close frame: {:?}", frame);
                Err(TransportError::Closed)
            },
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                trace!("WebSocket control frame");
                Ok(Incoming::Control)
            },
        }
    }
}

pub struct WsTx {
    socket: Arc<Mutex<WebSocket<TcpStream>>>,
}

impl TxAdapter for WsTx {
    fn send(&mut self, message: &BridgeMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        self.socket.lock().send(Message::Text(text))?;
        Ok(())
    }

    fn close(&mut self) {
        let mut socket = self.socket.lock();
        if let Err(e) = socket.close(None) {
            let e = TransportError::from(e);
            if !matches!(e, TransportError::Closed) {
                warn!("Failed to close WebSocket: {}", e);
            }
            return;
        }
        let _ = socket.flush();
    }
}
