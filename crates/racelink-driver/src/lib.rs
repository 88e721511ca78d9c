//! # Racelink Driver
//!
//! 仿真车辆桥接的会话层：
//! - 最新状态存储（`FrameStore` A/B 双缓冲、`TorqueSink`、`ChargeSlot`，读取无锁）
//! - 传感器帧摄取（`FrameIngest`）
//! - IO 线程（RX 线程 + 固定周期控制分发线程）
//! - 会话生命周期（握手、首帧事件、RaceEnd、关闭）
//! - 传输层（WebSocket / 进程内 Channel）
//! - 钩子系统：比赛元数据转交外部协作方
//!
//! # 数据流
//!
//! ```text
//! wire → FrameIngest → FrameStore → Controller → TorqueSink → dispatch_loop → wire
//! ```
//!
//! # 使用示例
//!
//! ```rust
//! use racelink_driver::{PipelineConfig, Session, TorqueSink, channel_transport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let (transport, peer) = channel_transport(8);
//! let output = Arc::new(TorqueSink::new());
//! let session = Session::start(transport, output.clone(), PipelineConfig::default()).unwrap();
//!
//! // 对端首先收到握手
//! let first = peer.recv_timeout(Duration::from_secs(1)).unwrap();
//! assert_eq!(first, racelink_protocol::BridgeMessage::handshake());
//!
//! session.shutdown();
//! ```

mod error;
pub mod event;
pub mod hooks;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
mod session;
pub mod sink;
pub mod store;
pub mod transport;

pub use error::{DriverError, IngestError};
pub use event::FirstFrameEvent;
pub use hooks::{ChannelTelemetryHook, HookManager, TelemetryHook};
pub use ingest::FrameIngest;
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use pipeline::{PipelineConfig, dispatch_loop, rx_loop};
pub use session::{BridgeContext, Session, SessionServer};
pub use sink::{ChargeSlot, CommandSource, TorqueSink};
pub use store::{Frame, FrameId, FrameStore};
pub use transport::{
    Incoming, PeerEndpoint, RxAdapter, SplittableTransport, TransportError, TxAdapter,
    channel_transport,
};
