//! Pipeline IO 循环模块
//!
//! 会话的两个 IO 线程：
//!
//! - `rx_loop`: 接收入站消息，二进制交给 FrameIngest，文本交给元数据钩子
//! - `dispatch_loop`: 固定周期（默认 50ms）读取当前扭矩命令并发送，
//!   两个 tick 之间发送出站队列中的一次性消息（RaceEnd 等）
//!
//! 两个线程通过共享的 `is_running` 标志联动：任何一方遇到致命错误都会清除该标志，
//! 另一方在下一个循环边界退出。

use crate::error::DriverError;
use crate::hooks::HookManager;
use crate::ingest::FrameIngest;
use crate::metrics::BridgeMetrics;
use crate::sink::{CommandSource, TorqueSink};
use crate::transport::{Incoming, RxAdapter, TransportError, TxAdapter};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;
use racelink_protocol::{BridgeMessage, InboundText, classify_text};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use racelink_driver::PipelineConfig;
///
/// // 默认配置（50ms 控制周期，5ms 接收超时）
/// let config = PipelineConfig::default();
/// assert!(config.validate().is_ok());
///
/// let config = PipelineConfig {
///     control_period_ms: 20,
///     ..Default::default()
/// };
/// assert_eq!(config.control_period().as_millis(), 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 控制消息发送周期（毫秒）
    pub control_period_ms: u64,
    /// 接收超时（毫秒），决定 RX 线程检查运行标志的频率
    pub receive_timeout_ms: u64,
    /// 出站一次性消息队列容量
    pub outbox_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            control_period_ms: 50,
            receive_timeout_ms: 5,
            outbox_capacity: 8,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.control_period_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "control_period_ms must be > 0".to_string(),
            ));
        }
        if self.outbox_capacity == 0 {
            return Err(DriverError::InvalidConfig(
                "outbox_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// RX 线程主循环
///
/// # 参数
/// - `rx`: RX 适配器（只读）
/// - `ingest`: 帧摄取器（FrameStore 的唯一写者）
/// - `hooks`: 元数据钩子
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 性能指标
pub fn rx_loop(
    mut rx: impl RxAdapter,
    ingest: FrameIngest,
    hooks: Arc<RwLock<HookManager>>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<BridgeMetrics>,
) {
    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let incoming = match rx.receive() {
            Ok(incoming) => incoming,
            Err(TransportError::Timeout) => {
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(TransportError::Closed) => {
                info!("RX thread: peer closed the connection");
                is_running.store(false, Ordering::Release);
                break;
            },
            Err(e) => {
                error!("RX thread: fatal transport error: {}", e);
                metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                is_running.store(false, Ordering::Release);
                break;
            },
        };

        match incoming {
            Incoming::Binary(raw) => {
                metrics.rx_messages_total.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = ingest.ingest(raw) {
                    warn!("RX thread: dropped sensor frame: {}", e);
                }
            },
            Incoming::Text(text) => {
                metrics.rx_messages_total.fetch_add(1, Ordering::Relaxed);
                metrics.rx_text_messages.fetch_add(1, Ordering::Relaxed);
                handle_text(&text, &hooks, &metrics);
            },
            Incoming::Control => {},
        }
    }

    debug!("RX thread: exited");
}

fn handle_text(text: &str, hooks: &RwLock<HookManager>, metrics: &BridgeMetrics) {
    match classify_text(text) {
        Ok(InboundText::RaceMetadata(metadata)) => {
            metrics.rx_metadata_messages.fetch_add(1, Ordering::Relaxed);
            info!(
                "RX thread: race metadata received ({} records)",
                metadata.data.len()
            );
            hooks.read().trigger_all(&metadata);
        },
        Ok(InboundText::Other(value)) => {
            debug!("RX thread: ignoring text message: {}", value);
        },
        Err(e) => {
            warn!("RX thread: undecodable text message: {}", e);
        },
    }
}

/// 控制分发线程主循环
///
/// 每个 tick：读取 `source` 的当前命令 → 写入 `sink` → 发送 control 消息。
/// tick 之间阻塞在 `outbox` 上，一次性消息到达后立即发送。
///
/// 任何发送失败（对端已关闭）都不重试：记录错误、清除 `is_running`、退出。
///
/// # 参数
/// - `tx`: TX 适配器（只写）
/// - `source`: 当前扭矩命令来源（控制器输出槽位）
/// - `sink`: 最近一次发送的命令
/// - `outbox`: 一次性消息队列接收端
/// - `is_running`: 运行标志（用于生命周期联动）
/// - `metrics`: 性能指标
/// - `config`: Pipeline 配置
pub fn dispatch_loop(
    mut tx: impl TxAdapter,
    source: Arc<dyn CommandSource>,
    sink: Arc<TorqueSink>,
    outbox: Receiver<BridgeMessage>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<BridgeMetrics>,
    config: PipelineConfig,
) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Dispatch thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set dispatch thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let period = config.control_period();
    let mut next_tick = Instant::now();
    let mut outbox_open = true;

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("Dispatch thread: is_running flag is false, exiting");
            break;
        }

        let now = Instant::now();
        if now < next_tick {
            if !outbox_open {
                spin_sleep::sleep(next_tick - now);
                continue;
            }

            match outbox.recv_deadline(next_tick) {
                Ok(message) => {
                    // 等待期间会话可能已结束
                    if !is_running.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = tx.send(&message) {
                        error!("Dispatch thread: failed to send {:?}: {}", message, e);
                        metrics.tx_send_failures.fetch_add(1, Ordering::Relaxed);
                        is_running.store(false, Ordering::Release);
                        break;
                    }
                    metrics.tx_outbox_sent.fetch_add(1, Ordering::Relaxed);
                    debug!("Dispatch thread: sent {:?}", message);
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => {
                    outbox_open = false;
                },
            }
            continue;
        }

        let command = source.current();
        sink.set(command);
        if let Err(e) = tx.send(&BridgeMessage::control(command)) {
            error!("Dispatch thread: failed to send control message: {}", e);
            metrics.tx_send_failures.fetch_add(1, Ordering::Relaxed);
            is_running.store(false, Ordering::Release);
            break;
        }
        metrics.tx_control_sent.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Dispatch thread: control L={:.3} R={:.3}",
            command.left(),
            command.right()
        );

        next_tick += period;
        // 落后超过一个周期时重新对齐，不补发
        let now = Instant::now();
        if next_tick < now {
            next_tick = now + period;
        }
    }

    tx.close();
    debug!("Dispatch thread: exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FirstFrameEvent;
    use crate::hooks::ChannelTelemetryHook;
    use crate::sink::ChargeSlot;
    use crate::store::FrameStore;
    use bytes::Bytes;
    use crossbeam_channel::bounded;
    use parking_lot::Mutex;
    use racelink_protocol::{SensorHeader, SensorPacket, TorqueCommand};
    use std::collections::VecDeque;
    use std::thread;

    /// 脚本化的 RX 适配器：消息耗尽后返回 Closed
    struct ScriptedRx {
        script: VecDeque<Result<Incoming, TransportError>>,
    }

    impl RxAdapter for ScriptedRx {
        fn receive(&mut self) -> Result<Incoming, TransportError> {
            self.script
                .pop_front()
                .unwrap_or(Err(TransportError::Closed))
        }
    }

    /// 记录所有发送内容的 TX 适配器，`fail_after` 次后开始失败
    #[derive(Clone)]
    struct RecordingTx {
        sent: Arc<Mutex<Vec<BridgeMessage>>>,
        closed: Arc<AtomicBool>,
        fail_after: Option<usize>,
    }

    impl RecordingTx {
        fn new(fail_after: Option<usize>) -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
                fail_after,
            }
        }
    }

    impl TxAdapter for RecordingTx {
        fn send(&mut self, message: &BridgeMessage) -> Result<(), TransportError> {
            let mut sent = self.sent.lock();
            if let Some(limit) = self.fail_after
                && sent.len() >= limit
            {
                return Err(TransportError::Closed);
            }
            sent.push(message.clone());
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    fn sensor_packet(soc: f64) -> Incoming {
        let header = SensorHeader {
            soc: Some(soc),
            filename: None,
        };
        Incoming::Binary(Bytes::from(
            SensorPacket::encode(&header, &[0u8; 1200]).unwrap(),
        ))
    }

    #[test]
    fn test_pipeline_config_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
        let config = PipelineConfig {
            control_period_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DriverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rx_loop_ingests_and_survives_bad_messages() {
        let store = Arc::new(FrameStore::new());
        let charge = Arc::new(ChargeSlot::new());
        let metrics = Arc::new(BridgeMetrics::new());
        let ingest = FrameIngest::new(
            store.clone(),
            charge.clone(),
            Arc::new(FirstFrameEvent::new()),
            metrics.clone(),
        );

        let mut hooks = HookManager::new();
        let (hook, metadata_rx) = ChannelTelemetryHook::new(4);
        hooks.add_callback(Arc::new(hook));

        let rx = ScriptedRx {
            script: VecDeque::from(vec![
                Ok(Incoming::Binary(Bytes::from_static(&[1, 2]))),
                Err(TransportError::Timeout),
                Ok(sensor_packet(0.8)),
                Ok(Incoming::Text("garbage".to_string())),
                Ok(Incoming::Text(r#"{"data":[{"id":1}]}"#.to_string())),
                Ok(Incoming::Control),
            ]),
        };

        let is_running = Arc::new(AtomicBool::new(true));
        rx_loop(
            rx,
            ingest,
            Arc::new(RwLock::new(hooks)),
            is_running.clone(),
            metrics.clone(),
        );

        // 脚本耗尽 → Closed → 清除运行标志
        assert!(!is_running.load(Ordering::Acquire));
        assert_eq!(store.latest().unwrap().charge(), 0.8);
        assert_eq!(metadata_rx.try_recv().unwrap().data.len(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rx_bad_header, 1);
        assert_eq!(snapshot.rx_frames_ingested, 1);
        assert_eq!(snapshot.rx_text_messages, 2);
        assert_eq!(snapshot.rx_metadata_messages, 1);
        assert_eq!(snapshot.rx_timeouts, 1);
    }

    #[test]
    fn test_rx_loop_fatal_error_clears_flag() {
        let rx = ScriptedRx {
            script: VecDeque::from(vec![Err(TransportError::Handshake(
                "reset".to_string(),
            ))]),
        };
        let metrics = Arc::new(BridgeMetrics::new());
        let ingest = FrameIngest::new(
            Arc::new(FrameStore::new()),
            Arc::new(ChargeSlot::new()),
            Arc::new(FirstFrameEvent::new()),
            metrics.clone(),
        );
        let is_running = Arc::new(AtomicBool::new(true));
        rx_loop(
            rx,
            ingest,
            Arc::new(RwLock::new(HookManager::new())),
            is_running.clone(),
            metrics.clone(),
        );
        assert!(!is_running.load(Ordering::Acquire));
        assert_eq!(metrics.snapshot().transport_errors, 1);
    }

    #[test]
    fn test_dispatch_loop_sends_current_command_each_tick() {
        let tx = RecordingTx::new(None);
        let source = Arc::new(TorqueSink::new());
        source.set(TorqueCommand::new(0.3, 0.3));
        let sink = Arc::new(TorqueSink::new());
        let (outbox_tx, outbox_rx) = bounded(4);
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(BridgeMetrics::new());

        let handle = {
            let tx = tx.clone();
            let source = source.clone() as Arc<dyn CommandSource>;
            let sink = sink.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::spawn(move || {
                dispatch_loop(
                    tx,
                    source,
                    sink,
                    outbox_rx,
                    is_running,
                    metrics,
                    PipelineConfig {
                        control_period_ms: 10,
                        ..Default::default()
                    },
                )
            })
        };

        thread::sleep(Duration::from_millis(35));
        outbox_tx.send(BridgeMessage::race_end()).unwrap();
        thread::sleep(Duration::from_millis(35));
        is_running.store(false, Ordering::Release);
        handle.join().unwrap();

        let sent = tx.sent.lock().clone();
        let controls = sent.iter().filter(|m| m.is_control()).count();
        assert!(controls >= 3, "only {} control messages", controls);
        assert!(sent.contains(&BridgeMessage::race_end()));
        assert!(sent.contains(&BridgeMessage::control(TorqueCommand::new(0.3, 0.3))));
        assert_eq!(sink.get(), TorqueCommand::new(0.3, 0.3));
        assert!(tx.closed.load(Ordering::Acquire));

        // 取消后不再发送
        let count = tx.sent.lock().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(tx.sent.lock().len(), count);
    }

    #[test]
    fn test_dispatch_loop_send_failure_is_fatal() {
        let tx = RecordingTx::new(Some(2));
        let (_outbox_tx, outbox_rx) = bounded(1);
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(BridgeMetrics::new());

        dispatch_loop(
            tx.clone(),
            Arc::new(TorqueSink::new()),
            Arc::new(TorqueSink::new()),
            outbox_rx,
            is_running.clone(),
            metrics.clone(),
            PipelineConfig {
                control_period_ms: 1,
                ..Default::default()
            },
        );

        assert!(!is_running.load(Ordering::Acquire));
        assert_eq!(tx.sent.lock().len(), 2);
        assert_eq!(metrics.snapshot().tx_send_failures, 1);
        assert_eq!(metrics.snapshot().tx_control_sent, 2);
    }
}
