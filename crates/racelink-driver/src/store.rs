//! 最新帧存储（A/B 双缓冲）
//!
//! 一个写者（RX 线程）以对端帧率发布，任意数量的读者（控制线程等）
//! 以自己的节奏读取最新的完整帧：
//!
//! - 两个固定槽位 A/B + 一个"当前槽位"指示字
//! - 发布：把完整帧写入**非活动**槽位，然后原子翻转指示字
//! - 读取：取指示字所指槽位的 `Arc` 引用（Wait-Free）
//!
//! 槽位本身是 `ArcSwapOption`，所以即使读者拿到旧的指示字、写者随后
//! 又覆盖了同一槽位，读者持有的也是完整的旧帧，永远不会看到撕裂数据。

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// 帧编号（发布序号，从 1 开始单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 一帧传感器数据（JPEG + 荷电状态）
///
/// 构造后不可变；由 FrameStore 独占持有，直到被下一帧覆盖。
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    image: Bytes,
    charge: f64,
    name: String,
    received_at: Instant,
}

impl Frame {
    /// 创建新帧（接收时间取当前时刻）
    pub fn new(id: FrameId, image: Bytes, charge: f64, name: impl Into<String>) -> Self {
        Self {
            id,
            image,
            charge,
            name: name.into(),
            received_at: Instant::now(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// JPEG 编码的图像字节
    pub fn image(&self) -> &Bytes {
        &self.image
    }

    /// 荷电状态（名义范围 `[0, 1]`）
    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// 对端给出的文件名，或本地生成的 `frame_<unix_ms>.jpg`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// 距接收已经过的时间
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// A/B 双缓冲最新帧存储
///
/// # 线程模型
///
/// - 单写者：`publish()` 只应由 FrameIngest（RX 线程）调用
/// - 多读者：`latest()` 可在任意线程调用，从不阻塞写者
#[derive(Debug, Default)]
pub struct FrameStore {
    slots: [ArcSwapOption<Frame>; 2],
    active: AtomicUsize,
    published: AtomicU64,
}

impl FrameStore {
    /// 创建空存储（首次发布前 `latest()` 返回 `None`）
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布一帧（不会失败）
    ///
    /// 先写非活动槽位，再翻转指示字；读者要么看到旧帧，要么看到新帧。
    pub fn publish(&self, frame: Frame) {
        let inactive = 1 - (self.active.load(Ordering::Acquire) & 1);
        self.slots[inactive].store(Some(Arc::new(frame)));
        // Release: 槽位写入对看到新指示字的读者可见
        self.active.store(inactive, Ordering::Release);
        self.published.fetch_add(1, Ordering::Release);
    }

    /// 读取最新的完整帧（无锁，仅增加引用计数）
    pub fn latest(&self) -> Option<Arc<Frame>> {
        let active = self.active.load(Ordering::Acquire) & 1;
        self.slots[active].load_full()
    }

    /// 已发布的帧数
    pub fn publish_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// 当前活动槽位（0 = A，1 = B），仅用于诊断
    pub fn active_slot(&self) -> usize {
        self.active.load(Ordering::Acquire) & 1
    }
}
