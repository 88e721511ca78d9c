//! 会话性能指标
//!
//! 零开销的原子计数器，用于监控收发链路的健康状态。
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 会话实时指标
///
/// # 使用示例
///
/// ```rust
/// use racelink_driver::BridgeMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = BridgeMetrics::new();
/// metrics.rx_messages_total.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.rx_messages_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// RX 收到的消息总数（二进制 + 文本）
    pub rx_messages_total: AtomicU64,

    /// 成功摄取并发布到 FrameStore 的帧数
    pub rx_frames_ingested: AtomicU64,

    /// 因头部无法解析而丢弃的帧数
    pub rx_bad_header: AtomicU64,

    /// 因负载过小而丢弃的帧数
    pub rx_too_small: AtomicU64,

    /// 收到的文本消息数
    pub rx_text_messages: AtomicU64,

    /// 识别为比赛元数据的文本消息数
    pub rx_metadata_messages: AtomicU64,

    /// RX 超时次数（正常现象，对端无数据时会超时）
    pub rx_timeouts: AtomicU64,

    /// 已发送的控制消息数
    pub tx_control_sent: AtomicU64,

    /// 已发送的出站队列消息数（RaceEnd 等）
    pub tx_outbox_sent: AtomicU64,

    /// 发送失败次数（每次都会终止会话）
    pub tx_send_failures: AtomicU64,

    /// 传输层致命错误次数
    pub transport_errors: AtomicU64,
}

impl BridgeMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_messages_total: self.rx_messages_total.load(Ordering::Relaxed),
            rx_frames_ingested: self.rx_frames_ingested.load(Ordering::Relaxed),
            rx_bad_header: self.rx_bad_header.load(Ordering::Relaxed),
            rx_too_small: self.rx_too_small.load(Ordering::Relaxed),
            rx_text_messages: self.rx_text_messages.load(Ordering::Relaxed),
            rx_metadata_messages: self.rx_metadata_messages.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            tx_control_sent: self.tx_control_sent.load(Ordering::Relaxed),
            tx_outbox_sent: self.tx_outbox_sent.load(Ordering::Relaxed),
            tx_send_failures: self.tx_send_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.rx_messages_total.store(0, Ordering::Relaxed);
        self.rx_frames_ingested.store(0, Ordering::Relaxed);
        self.rx_bad_header.store(0, Ordering::Relaxed);
        self.rx_too_small.store(0, Ordering::Relaxed);
        self.rx_text_messages.store(0, Ordering::Relaxed);
        self.rx_metadata_messages.store(0, Ordering::Relaxed);
        self.rx_timeouts.store(0, Ordering::Relaxed);
        self.tx_control_sent.store(0, Ordering::Relaxed);
        self.tx_outbox_sent.store(0, Ordering::Relaxed);
        self.tx_send_failures.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rx_messages_total: u64,
    pub rx_frames_ingested: u64,
    pub rx_bad_header: u64,
    pub rx_too_small: u64,
    pub rx_text_messages: u64,
    pub rx_metadata_messages: u64,
    pub rx_timeouts: u64,
    pub tx_control_sent: u64,
    pub tx_outbox_sent: u64,
    pub tx_send_failures: u64,
    pub transport_errors: u64,
}

impl MetricsSnapshot {
    /// 丢弃的传感器帧总数
    pub fn frames_dropped(&self) -> u64 {
        self.rx_bad_header + self.rx_too_small
    }
}
