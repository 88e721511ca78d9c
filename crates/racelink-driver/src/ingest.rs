//! 传感器帧摄取
//!
//! 解码入站二进制消息，校验后发布到 [`FrameStore`]，并记录荷电状态。
//! 所有错误都是单条消息级别的：调用方（RX 线程）记录日志后继续。

use crate::error::IngestError;
use crate::event::FirstFrameEvent;
use crate::metrics::BridgeMetrics;
use crate::sink::ChargeSlot;
use crate::store::{Frame, FrameId, FrameStore};
use bytes::Bytes;
use racelink_protocol::SensorPacket;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, trace};

/// 帧摄取器（FrameStore 的唯一写者）
pub struct FrameIngest {
    store: Arc<FrameStore>,
    charge: Arc<ChargeSlot>,
    first_frame: Arc<FirstFrameEvent>,
    metrics: Arc<BridgeMetrics>,
    next_id: AtomicU64,
}

impl FrameIngest {
    pub fn new(
        store: Arc<FrameStore>,
        charge: Arc<ChargeSlot>,
        first_frame: Arc<FirstFrameEvent>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            store,
            charge,
            first_frame,
            metrics,
            next_id: AtomicU64::new(1),
        }
    }

    /// 摄取一条原始二进制消息
    ///
    /// # 错误
    /// - `BadHeader`: 长度前缀或 JSON 头无法解析（不修改任何存储）
    /// - `TooSmall`: JPEG 负载小于阈值（不修改任何存储）
    pub fn ingest(&self, raw: Bytes) -> Result<FrameId, IngestError> {
        let packet = match SensorPacket::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                let err = IngestError::from(e);
                match &err {
                    IngestError::BadHeader(_) => {
                        self.metrics.rx_bad_header.fetch_add(1, Ordering::Relaxed)
                    },
                    IngestError::TooSmall { .. } => {
                        self.metrics.rx_too_small.fetch_add(1, Ordering::Relaxed)
                    },
                };
                return Err(err);
            },
        };

        // 头部缺少 soc 时沿用上一次的值
        let charge = match packet.header.soc {
            Some(soc) => {
                self.charge.set(soc);
                soc
            },
            None => self.charge.get(),
        };

        let name = packet.header.filename.unwrap_or_else(default_frame_name);
        let id = FrameId(self.next_id.fetch_add(1, Ordering::Relaxed));
        trace!(
            "Ingest frame {} ({}, {} bytes, soc={:.3})",
            id,
            name,
            packet.jpeg.len(),
            charge
        );

        self.store.publish(Frame::new(id, packet.jpeg, charge, name));
        self.metrics.rx_frames_ingested.fetch_add(1, Ordering::Relaxed);

        if self.first_frame.set() {
            info!("First sensor frame received: {}", id);
        }

        Ok(id)
    }
}

/// 对端未给出文件名时的本地名称：`frame_<unix_ms>.jpg`
fn default_frame_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("frame_{}.jpg", millis)
}
