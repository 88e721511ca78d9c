//! run 命令
//!
//! 监听模拟器连接，建立会话并以所选模式驱动车辆，直到 Ctrl-C 或对端断开。

use anyhow::{Context, Result, bail};
use clap::Args;
use crossbeam_channel::{Receiver, never, select};
use racelink_control::{
    ControlLoop, Controller, KeyState, ManualController, RuleBasedController, TableController,
};
use racelink_driver::{
    ChannelTelemetryHook, CommandSource, DriverError, Session, SessionServer, TorqueSink,
};
use racelink_protocol::RaceMetadata;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, Mode, Overrides};
use crate::console::{ConsoleCommand, spawn_console};

const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);
const METADATA_QUEUE: usize = 16;

/// 会话运行参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件路径（不存在时使用默认值）
    #[arg(short, long, default_value = "racelink.toml")]
    pub config: PathBuf,

    /// 监听地址（覆盖配置）
    #[arg(long)]
    pub host: Option<String>,

    /// 监听端口（覆盖配置）
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 控制模式（覆盖配置）
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// 扭矩表 CSV（table 模式）
    #[arg(long)]
    pub table_csv: Option<PathBuf>,
}

impl RunCommand {
    pub fn execute(self) -> Result<()> {
        let mut config = BridgeConfig::load(&self.config)?;
        config.apply(Overrides {
            host: self.host,
            port: self.port,
            mode: self.mode,
            table_csv: self.table_csv,
        });
        let mode = config.mode();
        info!("Mode: {}", mode);

        let keys = Arc::new(KeyState::new());
        let controller = build_controller(mode, &config, &keys)?;

        let keep_running = Arc::new(AtomicBool::new(true));
        {
            let keep_running = keep_running.clone();
            ctrlc::set_handler(move || {
                keep_running.store(false, Ordering::Release);
            })
            .context("Failed to set Ctrl-C handler")?;
        }

        let server = SessionServer::bind(config.bind_addr(), config.pipeline())
            .with_context(|| format!("Failed to listen on {}", config.bind_addr()))?;
        info!("Waiting for simulator on {}", server.local_addr()?);

        let output = Arc::new(TorqueSink::new());
        let session = match server.accept(output.clone() as Arc<dyn CommandSource>, &keep_running)
        {
            Ok(session) => session,
            Err(DriverError::Cancelled) => {
                info!("Interrupted before a simulator connected");
                return Ok(());
            },
            Err(e) => return Err(e).context("Failed to accept simulator connection"),
        };

        let (hook, metadata) = ChannelTelemetryHook::new(METADATA_QUEUE);
        session.add_telemetry_hook(Arc::new(hook));

        let console = match spawn_console(mode == Mode::Keyboard) {
            Ok(console) => console,
            Err(e) => {
                warn!("Console input unavailable: {}", e);
                never()
            },
        };

        if mode.waits_for_frame()
            && config.wait_first_frame
            && !wait_first_frame(&session, &keep_running)
        {
            info!("Session ended before the first frame");
            return Ok(());
        }

        let control = ControlLoop::spawn(
            controller,
            session.context().clone(),
            output,
            session.running_flag(),
            config.control_loop(),
        )?;

        supervise(&session, &keep_running, &keys, console, metadata);

        session.shutdown();
        match control.join() {
            Ok(stats) => info!(
                "Control loop finished: {} ticks, {} without frame, {} skipped",
                stats.iterations, stats.empty_polls, stats.transient_errors
            ),
            Err(e) => warn!("Control loop failed: {}", e),
        }

        let metrics = session.metrics().snapshot();
        info!(
            "Session summary: {} frames ingested, {} dropped, {} control messages sent",
            metrics.rx_frames_ingested,
            metrics.frames_dropped(),
            metrics.tx_control_sent
        );
        Ok(())
    }
}

fn build_controller(
    mode: Mode,
    config: &BridgeConfig,
    keys: &Arc<KeyState>,
) -> Result<Box<dyn Controller>> {
    let controller: Box<dyn Controller> = match mode {
        Mode::Keyboard => Box::new(ManualController::new(keys.clone())),
        Mode::Table => Box::new(
            TableController::from_path(&config.table_csv).with_context(|| {
                format!("Failed to load torque table {}", config.table_csv.display())
            })?,
        ),
        Mode::RuleBased => Box::new(RuleBasedController::default()),
        Mode::Ai => bail!("ai mode needs a learned-model backend, and none is built into racelink-cli"),
    };
    Ok(controller)
}

/// 等待首帧；会话结束或 Ctrl-C 时返回 `false`
fn wait_first_frame(session: &Session, keep_running: &AtomicBool) -> bool {
    info!("Waiting for the first frame");
    loop {
        if session.first_frame().wait_timeout(SUPERVISE_INTERVAL) {
            return true;
        }
        if !session.is_running() || !keep_running.load(Ordering::Acquire) {
            return false;
        }
    }
}

/// 主线程监督循环：处理控制台命令与元数据，直到会话结束或 Ctrl-C
fn supervise(
    session: &Session,
    keep_running: &AtomicBool,
    keys: &KeyState,
    mut console: Receiver<ConsoleCommand>,
    mut metadata: Receiver<RaceMetadata>,
) {
    let mut race_end_sent = false;

    loop {
        let mut console_closed = false;
        let mut metadata_closed = false;

        if !keep_running.load(Ordering::Acquire) {
            info!("Interrupted, shutting down");
            break;
        }
        if !session.is_running() {
            info!("Simulator disconnected");
            break;
        }

        select! {
            recv(console) -> command => match command {
                Ok(ConsoleCommand::RaceEnd) if race_end_sent => {
                    info!("RaceEnd already sent");
                },
                Ok(ConsoleCommand::RaceEnd) => match session.send_race_end() {
                    Ok(()) => race_end_sent = true,
                    Err(e) => warn!("Failed to queue RaceEnd: {}", e),
                },
                Ok(ConsoleCommand::HoldKeys(held)) => {
                    debug!("Held keys: {:?}", held);
                    keys.set_held(held);
                },
                Err(_) => console_closed = true,
            },
            recv(metadata) -> message => match message {
                Ok(message) => log_metadata(&message),
                Err(_) => metadata_closed = true,
            },
            default(SUPERVISE_INTERVAL) => {},
        }

        // 断开的通道会让 select 立即返回，换成永不就绪的通道
        if console_closed {
            console = never();
        }
        if metadata_closed {
            metadata = never();
        }
    }
}

fn log_metadata(metadata: &RaceMetadata) {
    info!("Race metadata: {} records", metadata.data.len());
    if let Some(last) = metadata.data.last() {
        debug!("Last record: {:?}", last);
    }
}
