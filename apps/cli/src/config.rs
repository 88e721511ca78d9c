//! 桥接配置
//!
//! TOML 文件，所有字段都有默认值：
//!
//! ```toml
//! host = "localhost"
//! port = 12346
//! mode = "rule_based"      # keyboard | table | rule_based | ai
//! # mode_num = 3           # 兼容旧配置：1 keyboard, 2 table, 3 rule_based, 4 ai
//! control_period_ms = 50
//! receive_timeout_ms = 5
//! table_csv = "table_input.csv"
//! wait_first_frame = true
//! ```
//!
//! 文件不存在时使用默认值；文件存在但无法解析时报错。

use anyhow::{Context, Result};
use clap::ValueEnum;
use racelink_control::LoopConfig;
use racelink_driver::PipelineConfig;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Keyboard,
    Table,
    #[value(name = "rule_based")]
    RuleBased,
    Ai,
}

impl Mode {
    /// 旧配置的数字编号；未知编号回退到 keyboard
    pub fn from_num(num: i64) -> Mode {
        match num {
            1 => Mode::Keyboard,
            2 => Mode::Table,
            3 => Mode::RuleBased,
            4 => Mode::Ai,
            other => {
                warn!("Unknown mode_num {}, falling back to keyboard", other);
                Mode::Keyboard
            },
        }
    }

    /// 是否需要等待首帧后再启动控制循环
    pub fn waits_for_frame(self) -> bool {
        !matches!(self, Mode::Keyboard)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Keyboard => write!(f, "keyboard"),
            Mode::Table => write!(f, "table"),
            Mode::RuleBased => write!(f, "rule_based"),
            Mode::Ai => write!(f, "ai"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    #[serde(alias = "HOST")]
    pub host: String,
    #[serde(alias = "PORT")]
    pub port: u16,
    pub mode: Option<Mode>,
    #[serde(alias = "MODE_NUM")]
    pub mode_num: Option<i64>,
    pub control_period_ms: u64,
    pub receive_timeout_ms: u64,
    pub table_csv: PathBuf,
    pub wait_first_frame: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 12346,
            mode: None,
            mode_num: None,
            control_period_ms: 50,
            receive_timeout_ms: 5,
            table_csv: PathBuf::from("table_input.csv"),
            wait_first_frame: true,
        }
    }
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<Mode>,
    pub table_csv: Option<PathBuf>,
}

impl BridgeConfig {
    /// 从文件加载；文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 应用命令行覆盖项
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(mode) = overrides.mode {
            self.mode = Some(mode);
        }
        if let Some(table_csv) = overrides.table_csv {
            self.table_csv = table_csv;
        }
    }

    /// 生效的模式：`mode` 优先，其次 `mode_num`，默认 keyboard
    pub fn mode(&self) -> Mode {
        match (self.mode, self.mode_num) {
            (Some(mode), _) => mode,
            (None, Some(num)) => Mode::from_num(num),
            (None, None) => Mode::default(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            control_period_ms: self.control_period_ms,
            receive_timeout_ms: self.receive_timeout_ms,
            ..Default::default()
        }
    }

    pub fn control_loop(&self) -> LoopConfig {
        LoopConfig {
            period_ms: self.control_period_ms,
            max_iterations: None,
        }
    }
}
