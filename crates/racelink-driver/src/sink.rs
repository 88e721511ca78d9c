//! 小值槽位：扭矩命令与荷电状态
//!
//! 与 [`FrameStore`](crate::FrameStore) 相同的"最后写入者获胜"语义，
//! 针对小的定长值做了特化：
//!
//! - `TorqueSink`: `ArcSwap<TorqueCommand>`，读取 Wait-Free
//! - `ChargeSlot`: `f64` 位模式存放在 `AtomicU64` 中

use arc_swap::ArcSwap;
use racelink_protocol::TorqueCommand;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 当前扭矩命令的来源
///
/// ControlDispatcher 每个 tick 调用一次 `current()`。
/// 控制器输出槽位、测试桩等都可以实现此 trait。
pub trait CommandSource: Send + Sync {
    /// 读取当前命令（不得阻塞）
    fn current(&self) -> TorqueCommand;
}

/// 最新扭矩命令槽位
///
/// 首次 `set()` 之前 `get()` 返回 `{0, 0}`。
#[derive(Debug)]
pub struct TorqueSink {
    inner: ArcSwap<TorqueCommand>,
}

impl Default for TorqueSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TorqueSink {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(TorqueCommand::ZERO),
        }
    }

    /// 覆盖当前命令
    pub fn set(&self, command: TorqueCommand) {
        self.inner.store(Arc::new(command));
    }

    /// 读取当前命令
    pub fn get(&self) -> TorqueCommand {
        **self.inner.load()
    }
}

impl CommandSource for TorqueSink {
    fn current(&self) -> TorqueCommand {
        self.get()
    }
}

/// 最新荷电状态槽位
///
/// 首次 `set()` 之前 `get()` 返回 `0.0`。
#[derive(Debug, Default)]
pub struct ChargeSlot {
    bits: AtomicU64,
}

impl ChargeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, charge: f64) {
        self.bits.store(charge.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_torque_sink_defaults_to_zero() {
        let sink = TorqueSink::new();
        assert_eq!(sink.get(), TorqueCommand::ZERO);
    }

    #[test]
    fn test_torque_sink_last_write_wins() {
        let sink = TorqueSink::new();
        sink.set(TorqueCommand::new(0.1, 0.2));
        sink.set(TorqueCommand::new(-0.4, 0.9));
        assert_eq!(sink.get(), TorqueCommand::new(-0.4, 0.9));
        assert_eq!(sink.current(), sink.get());
    }

    #[test]
    fn test_charge_slot() {
        let slot = ChargeSlot::new();
        assert_eq!(slot.get(), 0.0);
        slot.set(0.1875);
        assert_eq!(slot.get(), 0.1875);
    }

    #[test]
    fn test_torque_sink_concurrent_pairs_never_mixed() {
        // 写者只写 (x, -x)，读者不应看到其他组合
        let sink = Arc::new(TorqueSink::new());
        let writer = {
            let sink = sink.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    let x = (i % 100) as f64 / 100.0;
                    sink.set(TorqueCommand::new(x, -x));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let cmd = sink.get();
                        assert_eq!(cmd.left(), -cmd.right());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
