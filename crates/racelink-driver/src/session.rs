//! 会话管理（SessionManager）
//!
//! 一个 [`Session`] 拥有一条活动连接：发送握手、启动 RX 线程与控制分发线程，
//! 并对外暴露最新状态（帧、荷电状态、已发送命令）、首帧事件与指标。
//!
//! 对端断开或任何发送失败都会清除会话的运行标志，会话随之整体结束（不重连）。

use crate::error::DriverError;
use crate::event::FirstFrameEvent;
use crate::hooks::{HookManager, TelemetryHook};
use crate::ingest::FrameIngest;
use crate::metrics::BridgeMetrics;
use crate::pipeline::{PipelineConfig, dispatch_loop, rx_loop};
use crate::sink::{ChargeSlot, CommandSource, TorqueSink};
use crate::store::FrameStore;
use crate::transport::{SplittableTransport, TxAdapter, WsListener};
use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::RwLock;
use racelink_protocol::BridgeMessage;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // Watchdog thread joins the target so we can wait with a deadline
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 会话共享状态
///
/// 所有字段都是单写者/多读者的最新值存储，读取从不阻塞 IO 线程。
#[derive(Debug, Default)]
pub struct BridgeContext {
    /// 最新传感器帧（写者：RX 线程）
    pub frames: Arc<FrameStore>,
    /// 最新荷电状态（写者：RX 线程）
    pub charge: Arc<ChargeSlot>,
    /// 最近一次发送的扭矩命令（写者：分发线程）
    pub torque: Arc<TorqueSink>,
    /// 首帧事件
    pub first_frame: Arc<FirstFrameEvent>,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 一个活动会话
pub struct Session {
    ctx: Arc<BridgeContext>,
    hooks: Arc<RwLock<HookManager>>,
    metrics: Arc<BridgeMetrics>,
    is_running: Arc<AtomicBool>,
    outbox: Sender<BridgeMessage>,
    outbox_capacity: usize,
    rx_thread: Option<JoinHandle<()>>,
    dispatch_thread: Option<JoinHandle<()>>,
}

impl Session {
    /// 在已建立的连接上启动会话
    ///
    /// 依次：校验配置 → 拆分传输 → 发送握手 → 启动 RX 与分发线程。
    ///
    /// # 参数
    /// - `transport`: 已建立的连接
    /// - `source`: 控制分发线程每个 tick 读取的命令来源
    /// - `config`: Pipeline 配置
    ///
    /// # 错误
    /// - `InvalidConfig`: 配置无效
    /// - `SendFailure`: 握手发送失败（对端已关闭）
    pub fn start<T>(
        transport: T,
        source: Arc<dyn CommandSource>,
        config: PipelineConfig,
    ) -> Result<Self, DriverError>
    where
        T: SplittableTransport,
    {
        config.validate()?;

        let (rx, mut tx) = transport.split()?;
        tx.send(&BridgeMessage::handshake())
            .map_err(DriverError::SendFailure)?;
        info!("Handshake sent");

        let ctx = Arc::new(BridgeContext::new());
        let hooks = Arc::new(RwLock::new(HookManager::new()));
        let metrics = Arc::new(BridgeMetrics::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let (outbox_tx, outbox_rx) = bounded(config.outbox_capacity);

        let ingest = FrameIngest::new(
            ctx.frames.clone(),
            ctx.charge.clone(),
            ctx.first_frame.clone(),
            metrics.clone(),
        );

        let rx_thread = {
            let hooks = hooks.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            std::thread::Builder::new()
                .name("racelink-rx".into())
                .spawn(move || rx_loop(rx, ingest, hooks, is_running, metrics))?
        };

        let dispatch_thread = {
            let sink = ctx.torque.clone();
            let thread_running = is_running.clone();
            let metrics = metrics.clone();
            let config = config.clone();
            let spawned = std::thread::Builder::new()
                .name("racelink-dispatch".into())
                .spawn(move || {
                    dispatch_loop(tx, source, sink, outbox_rx, thread_running, metrics, config)
                });
            // RX 线程已经启动，分发线程启动失败时需要让它退出
            stop_on_spawn_failure(spawned, &is_running)?
        };

        Ok(Self {
            ctx,
            hooks,
            metrics,
            is_running,
            outbox: outbox_tx,
            outbox_capacity: config.outbox_capacity,
            rx_thread: Some(rx_thread),
            dispatch_thread: Some(dispatch_thread),
        })
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub fn frames(&self) -> &Arc<FrameStore> {
        &self.ctx.frames
    }

    pub fn charge(&self) -> &Arc<ChargeSlot> {
        &self.ctx.charge
    }

    /// 最近一次发送的扭矩命令
    pub fn torque(&self) -> &Arc<TorqueSink> {
        &self.ctx.torque
    }

    pub fn first_frame(&self) -> &Arc<FirstFrameEvent> {
        &self.ctx.first_frame
    }

    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 会话取消信号（与控制循环等外部任务共享）
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.is_running.clone()
    }

    /// 注册元数据钩子
    pub fn add_telemetry_hook(&self, hook: Arc<dyn TelemetryHook>) {
        self.hooks.write().add_callback(hook);
    }

    /// 入队一条一次性出站消息，由分发线程在下一个空闲时刻发送
    ///
    /// # 错误
    /// - `ChannelClosed`: 会话已结束
    /// - `ChannelFull`: 出站队列已满
    pub fn send_message(&self, message: BridgeMessage) -> Result<(), DriverError> {
        if !self.is_running() {
            return Err(DriverError::ChannelClosed);
        }
        self.outbox.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DriverError::ChannelFull(self.outbox_capacity),
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }

    /// 通知对端比赛结束
    pub fn send_race_end(&self) -> Result<(), DriverError> {
        self.send_message(BridgeMessage::race_end())?;
        info!("RaceEnd queued");
        Ok(())
    }

    /// 检查会话健康状态
    pub fn check_health(&self) -> Result<(), DriverError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(DriverError::ChannelClosed)
        }
    }

    /// 请求结束会话（不等待线程退出）
    pub fn shutdown(&self) {
        if self.is_running.swap(false, Ordering::AcqRel) {
            info!("Session shutdown requested");
        }
    }

    /// 等待会话结束（对端断开、发送失败或 `shutdown()`）
    ///
    /// 返回会话是否已结束。
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            spin_sleep::sleep((deadline - now).min(Duration::from_millis(10)));
        }
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Release: 之前的写入对 IO 线程可见
        self.is_running.store(false, Ordering::Release);

        let join_timeout = Duration::from_secs(2);

        if let Some(handle) = self.rx_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "RX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        if let Some(handle) = self.dispatch_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "Dispatch thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        info!("Session closed");
    }
}

/// WebSocket 会话服务器（一次服务一个对端）
pub struct SessionServer {
    listener: WsListener,
    config: PipelineConfig,
}

impl SessionServer {
    pub fn bind(addr: impl ToSocketAddrs, config: PipelineConfig) -> Result<Self, DriverError> {
        config.validate()?;
        let listener = WsListener::bind(addr)?;
        if let Ok(local) = listener.local_addr() {
            info!("Listening on ws://{}", local);
        }
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DriverError> {
        Ok(self.listener.local_addr()?)
    }

    /// 等待一个对端并启动会话
    ///
    /// # 错误
    /// - `Cancelled`: 等待期间 `keep_running` 被清除
    /// - `Transport`: 升级失败
    /// - `SendFailure`: 握手发送失败
    pub fn accept(
        &self,
        source: Arc<dyn CommandSource>,
        keep_running: &AtomicBool,
    ) -> Result<Session, DriverError> {
        let transport = match self
            .listener
            .accept(self.config.receive_timeout(), keep_running)?
        {
            Some(transport) => transport,
            None => return Err(DriverError::Cancelled),
        };

        let peer = transport.peer_addr();
        let session = Session::start(transport, source, self.config.clone());
        if let Err(e) = &session {
            warn!("Failed to start session with {}: {}", peer, e);
        }
        session
    }
}

/// 线程启动失败时清除运行标志，让已启动的线程退出
fn stop_on_spawn_failure<T>(
    spawned: std::io::Result<T>,
    is_running: &AtomicBool,
) -> Result<T, DriverError> {
    spawned.map_err(|e| {
        error!("Failed to spawn dispatch thread: {}", e);
        is_running.store(false, Ordering::Release);
        e.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, channel_transport};
    use racelink_protocol::TorqueCommand;

    #[test]
    fn test_start_sends_handshake_first() {
        let (transport, peer) = channel_transport(4);
        let source = Arc::new(TorqueSink::new());
        let session = Session::start(transport, source, PipelineConfig::default()).unwrap();

        let first = peer.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(first, BridgeMessage::handshake());
        assert!(session.is_running());
        assert!(session.check_health().is_ok());
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let (transport, _peer) = channel_transport(4);
        let result = Session::start(
            transport,
            Arc::new(TorqueSink::new()),
            PipelineConfig {
                control_period_ms: 0,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_handshake_failure_is_send_failure() {
        let (transport, peer) = channel_transport(4);
        drop(peer);
        let result = Session::start(
            transport,
            Arc::new(TorqueSink::new()),
            PipelineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(DriverError::SendFailure(TransportError::Closed))
        ));
    }

    #[test]
    fn test_send_after_shutdown_is_closed() {
        let (transport, _peer) = channel_transport(4);
        let session = Session::start(
            transport,
            Arc::new(TorqueSink::new()),
            PipelineConfig::default(),
        )
        .unwrap();

        session.shutdown();
        assert!(session.wait_closed(Duration::from_millis(100)));
        assert!(matches!(
            session.send_race_end(),
            Err(DriverError::ChannelClosed)
        ));
        assert!(matches!(
            session.check_health(),
            Err(DriverError::ChannelClosed)
        ));
    }

    #[test]
    fn test_spawn_failure_clears_running_flag() {
        let is_running = AtomicBool::new(true);
        let spawned: std::io::Result<()> = Err(std::io::Error::other("no threads left"));
        let result = stop_on_spawn_failure(spawned, &is_running);
        assert!(matches!(result, Err(DriverError::Io(_))));
        assert!(!is_running.load(Ordering::Acquire));

        let is_running = AtomicBool::new(true);
        assert_eq!(stop_on_spawn_failure(Ok(7), &is_running).unwrap(), 7);
        assert!(is_running.load(Ordering::Acquire));
    }

    /// 控制消息发送很慢的传输，用于占住分发线程
    struct SlowTransport;
    struct IdleRx;
    struct SlowTx;

    impl crate::transport::RxAdapter for IdleRx {
        fn receive(&mut self) -> Result<crate::transport::Incoming, TransportError> {
            std::thread::sleep(Duration::from_millis(1));
            Err(TransportError::Timeout)
        }
    }

    impl TxAdapter for SlowTx {
        fn send(&mut self, message: &BridgeMessage) -> Result<(), TransportError> {
            if message.is_control() {
                std::thread::sleep(Duration::from_millis(300));
            }
            Ok(())
        }
    }

    impl SplittableTransport for SlowTransport {
        type Rx = IdleRx;
        type Tx = SlowTx;

        fn split(self) -> Result<(IdleRx, SlowTx), TransportError> {
            Ok((IdleRx, SlowTx))
        }
    }

    #[test]
    fn test_outbox_full() {
        let config = PipelineConfig {
            control_period_ms: 10_000,
            outbox_capacity: 1,
            ..Default::default()
        };
        let session =
            Session::start(SlowTransport, Arc::new(TorqueSink::new()), config).unwrap();

        // 第一个 tick 立即发送控制消息并阻塞 300ms，期间队列无人消费
        std::thread::sleep(Duration::from_millis(50));
        session.send_race_end().unwrap();
        assert!(matches!(
            session.send_race_end(),
            Err(DriverError::ChannelFull(1))
        ));
    }

    #[test]
    fn test_server_accept_cancelled() {
        let server = SessionServer::bind("127.0.0.1:0", PipelineConfig::default()).unwrap();
        assert!(server.local_addr().unwrap().port() > 0);
        let keep_running = AtomicBool::new(false);
        let result = server.accept(Arc::new(TorqueSink::new()), &keep_running);
        assert!(matches!(result, Err(DriverError::Cancelled)));
    }

    #[test]
    fn test_torque_reflects_source() {
        let (transport, peer) = channel_transport(4);
        let source = Arc::new(TorqueSink::new());
        source.set(TorqueCommand::new(-0.2, 0.6));
        let session = Session::start(
            transport,
            source.clone(),
            PipelineConfig {
                control_period_ms: 5,
                ..Default::default()
            },
        )
        .unwrap();

        // 握手之后是控制消息
        assert_eq!(
            peer.recv_timeout(Duration::from_millis(500)).unwrap(),
            BridgeMessage::handshake()
        );
        assert_eq!(
            peer.recv_timeout(Duration::from_millis(500)).unwrap(),
            BridgeMessage::control(TorqueCommand::new(-0.2, 0.6))
        );
        assert_eq!(session.torque().get(), TorqueCommand::new(-0.2, 0.6));
    }
}
