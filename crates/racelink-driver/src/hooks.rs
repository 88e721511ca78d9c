//! 钩子系统（Hook System）
//!
//! 对端上报的比赛元数据在 RX 线程中解析后，通过钩子转交给外部协作方
//! （CSV 导出、日志等）。
//!
//! # 设计原则
//!
//! - **非阻塞**: 回调在 RX 线程上执行，必须立即返回，重活交给 Channel 另一端
//! - **类型安全**: 使用 `dyn TelemetryHook` trait object
//!
//! # 使用示例
//!
//! ```rust
//! use racelink_driver::hooks::{ChannelTelemetryHook, HookManager, TelemetryHook};
//! use racelink_protocol::RaceMetadata;
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (hook, rx) = ChannelTelemetryHook::new(4);
//! hooks.add_callback(Arc::new(hook) as Arc<dyn TelemetryHook>);
//!
//! hooks.trigger_all(&RaceMetadata::default());
//! assert!(rx.try_recv().is_ok());
//! ```

use crossbeam_channel::{Receiver, Sender, bounded};
use racelink_protocol::RaceMetadata;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 比赛元数据回调
pub trait TelemetryHook: Send + Sync {
    /// 收到一条比赛元数据时调用（RX 线程上下文，禁止阻塞）
    fn on_race_metadata(&self, metadata: &RaceMetadata);
}

/// 钩子管理器
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn TelemetryHook>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn TelemetryHook>) {
        self.callbacks.push(callback);
    }

    /// 依次触发所有回调
    pub fn trigger_all(&self, metadata: &RaceMetadata) {
        for callback in self.callbacks.iter() {
            callback.on_race_metadata(metadata);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// 转发到有界 Channel 的元数据钩子
///
/// 队列满时丢弃并计数，不阻塞 RX 线程。
pub struct ChannelTelemetryHook {
    tx: Sender<RaceMetadata>,
    dropped: Arc<AtomicU64>,
}

impl ChannelTelemetryHook {
    /// 创建钩子及其接收端
    pub fn new(capacity: usize) -> (Self, Receiver<RaceMetadata>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 丢弃计数器（可在钩子移交给 HookManager 之前克隆）
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetryHook for ChannelTelemetryHook {
    fn on_race_metadata(&self, metadata: &RaceMetadata) {
        if self.tx.try_send(metadata.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
