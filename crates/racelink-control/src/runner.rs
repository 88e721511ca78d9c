//! Loop Runner - 控制循环
//!
//! 在独立线程上按固定周期运行控制器：
//!
//! 1. 读取 `FrameStore::latest()` 与 `ChargeSlot::get()`
//! 2. 调用 `Controller::tick()`
//! 3. 把钳位后的结果写入输出槽位（控制分发线程从中读取）
//!
//! # 失败处理
//!
//! - 需要图像但尚无帧：输出零扭矩
//! - 单次失败（解码 / 模型）：保留上一次输出，`warn!` 后继续
//! - 其他错误：输出零扭矩并结束循环
//!
//! # 定时
//!
//! 使用 `spin_sleep` 按绝对时间表休眠；落后超过一个周期时重新对齐，不补跑。

use crate::controller::{ControlInput, Controller};
use crate::error::ControlError;
use racelink_driver::{BridgeContext, TorqueSink};
use racelink_protocol::TorqueCommand;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 控制循环配置
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 控制周期（毫秒）
    pub period_ms: u64,

    /// 最大迭代次数（None 表示一直运行到会话结束）
    pub max_iterations: Option<usize>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            period_ms: 50,
            max_iterations: None,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.period_ms == 0 {
            return Err(ControlError::InvalidConfig(
                "period_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// 控制循环统计
#[derive(Debug, Default)]
pub struct LoopStats {
    pub iterations: AtomicU64,
    /// 尚无帧可用的轮询次数
    pub empty_polls: AtomicU64,
    /// 单次失败（解码 / 模型）次数
    pub transient_errors: AtomicU64,
}

impl LoopStats {
    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStatsSnapshot {
    pub iterations: u64,
    pub empty_polls: u64,
    pub transient_errors: u64,
}

/// 执行一次轮询
///
/// 返回本次写入 `output` 的命令。
pub fn step_once(
    controller: &mut dyn Controller,
    ctx: &BridgeContext,
    output: &TorqueSink,
    stats: &LoopStats,
) -> Result<TorqueCommand, ControlError> {
    stats.iterations.fetch_add(1, Ordering::Relaxed);

    let frame = ctx.frames.latest();
    if frame.is_none() && controller.needs_frame() {
        stats.empty_polls.fetch_add(1, Ordering::Relaxed);
        output.set(TorqueCommand::ZERO);
        return Ok(TorqueCommand::ZERO);
    }

    let input = ControlInput {
        frame,
        charge: ctx.charge.get(),
    };

    match controller.tick(&input) {
        Ok(command) => {
            output.set(command);
            trace!(
                "Control loop: {} L={:.3} R={:.3}",
                controller.name(),
                command.left(),
                command.right()
            );
            Ok(command)
        },
        Err(e) if e.is_transient() => {
            stats.transient_errors.fetch_add(1, Ordering::Relaxed);
            let previous = output.get();
            warn!(
                "Control loop: {} skipped a tick, keeping previous output: {}",
                controller.name(),
                e
            );
            Ok(previous)
        },
        Err(e) => {
            output.set(TorqueCommand::ZERO);
            Err(e)
        },
    }
}

/// 运行控制循环（阻塞）
///
/// 以下任一条件满足时返回：
/// - `is_running` 被清除（会话结束）
/// - 达到 `max_iterations`
/// - 控制器返回非单次性错误
pub fn run_control_loop(
    controller: &mut dyn Controller,
    ctx: &BridgeContext,
    output: &TorqueSink,
    is_running: &AtomicBool,
    config: &LoopConfig,
    stats: &LoopStats,
) -> Result<(), ControlError> {
    run_while(
        controller,
        ctx,
        output,
        &|| is_running.load(Ordering::Acquire),
        config,
        stats,
    )
}

fn run_while(
    controller: &mut dyn Controller,
    ctx: &BridgeContext,
    output: &TorqueSink,
    keep_running: &dyn Fn() -> bool,
    config: &LoopConfig,
    stats: &LoopStats,
) -> Result<(), ControlError> {
    config.validate()?;

    let period = config.period();
    let mut next_tick = Instant::now();
    let mut iteration = 0usize;

    loop {
        if !keep_running() {
            trace!("Control loop: running flag is false, exiting");
            return Ok(());
        }

        if let Some(max_iter) = config.max_iterations
            && iteration >= max_iter
        {
            return Ok(());
        }

        let now = Instant::now();
        if now < next_tick {
            // 分段休眠，及时响应停止
            spin_sleep::sleep((next_tick - now).min(MAX_SLEEP_SLICE));
            continue;
        }

        step_once(controller, ctx, output, stats)?;
        iteration += 1;

        next_tick += period;
        let now = Instant::now();
        if next_tick < now {
            next_tick = now + period;
        }
    }
}

const MAX_SLEEP_SLICE: Duration = Duration::from_millis(10);

/// 后台控制循环句柄
///
/// `Drop` 时停止循环并等待线程退出。
pub struct ControlLoop {
    stop: Arc<AtomicBool>,
    stats: Arc<LoopStats>,
    handle: Option<JoinHandle<Result<(), ControlError>>>,
}

impl ControlLoop {
    /// 在名为 `racelink-control` 的线程上启动控制循环
    ///
    /// # 参数
    /// - `controller`: 控制器（移入线程）
    /// - `ctx`: 会话共享状态（帧、荷电状态）
    /// - `output`: 控制器输出槽位
    /// - `is_running`: 会话运行标志
    /// - `config`: 循环配置
    pub fn spawn(
        mut controller: Box<dyn Controller>,
        ctx: Arc<BridgeContext>,
        output: Arc<TorqueSink>,
        is_running: Arc<AtomicBool>,
        config: LoopConfig,
    ) -> Result<Self, ControlError> {
        config.validate()?;

        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(LoopStats::default());

        let handle = {
            let stop = stop.clone();
            let stats = stats.clone();
            std::thread::Builder::new()
                .name("racelink-control".into())
                .spawn(move || {
                    info!(
                        "Control loop started: {} every {} ms",
                        controller.name(),
                        config.period_ms
                    );
                    let keep_running = || {
                        is_running.load(Ordering::Acquire) && !stop.load(Ordering::Acquire)
                    };
                    let result = run_while(
                        controller.as_mut(),
                        &ctx,
                        &output,
                        &keep_running,
                        &config,
                        &stats,
                    );
                    match &result {
                        Ok(()) => debug!("Control loop: exited"),
                        Err(e) => error!("Control loop: stopped on error: {}", e),
                    }
                    result
                })?
        };

        Ok(Self {
            stop,
            stats,
            handle: Some(handle),
        })
    }

    pub fn stats(&self) -> LoopStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|handle| handle.is_finished())
    }

    /// 停止循环（不等待）
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// 等待循环自然结束（会话结束或达到 `max_iterations`）
    pub fn join(mut self) -> Result<LoopStatsSnapshot, ControlError> {
        let result = match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ControlError::LoopPanicked)?,
            None => Ok(()),
        };
        result.map(|()| self.stats.snapshot())
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Control loop thread panicked");
        }
    }
}
