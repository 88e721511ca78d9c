//! # racelink CLI
//!
//! 模拟器桥接命令行工具。
//!
//! ```bash
//! # 监听模拟器连接，规则模式驱动
//! racelink-cli run --mode rule_based
//!
//! # 键盘模式：控制台输入按住的按键（w/z 左轮，i/m 右轮），q 结束比赛
//! racelink-cli run --mode keyboard --port 12346
//!
//! # 离线循线
//! racelink-cli trace --image frame_000123.jpg --soc 0.8
//! racelink-cli trace --batch ./frames
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod console;

use commands::{RunCommand, TraceCommand};

const DEFAULT_DIRECTIVES: &str = "racelink_cli=info,racelink_driver=info,racelink_control=info";
const VERBOSE_DIRECTIVES: &str = "racelink_cli=debug,racelink_driver=debug,racelink_control=debug";

/// racelink - 模拟器遥测与控制桥接
#[derive(Parser, Debug)]
#[command(name = "racelink-cli")]
#[command(about = "Telemetry and control bridge for the racing simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// 输出调试日志（RUST_LOG 优先）
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 接受模拟器连接并运行控制
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 离线运行循线器
    Trace {
        #[command(flatten)]
        args: TraceCommand,
    },
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        VERBOSE_DIRECTIVES
    } else {
        DEFAULT_DIRECTIVES
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Trace { args } => args.execute(),
    }
}
