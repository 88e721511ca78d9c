//! 扭矩表回放控制器
//!
//! 从 CSV 读取预先录制的扭矩序列，每个 tick 输出一行：
//!
//! ```text
//! Left_Torque,Right_Torque
//! 0.3,0.3
//! 0.4,0.2
//! ```
//!
//! 最后一行之后持续输出零扭矩，`finished()` 返回 `true`。

use crate::controller::{ControlInput, Controller};
use crate::error::ControlError;
use racelink_protocol::TorqueCommand;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(rename = "Left_Torque")]
    left: f64,
    #[serde(rename = "Right_Torque")]
    right: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TableController {
    rows: Vec<TorqueCommand>,
    cursor: usize,
}

impl TableController {
    pub fn new(rows: Vec<TorqueCommand>) -> Self {
        Self { rows, cursor: 0 }
    }

    /// 从 CSV 文件加载
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let controller = Self::from_reader(file)?;
        info!(
            "Loaded torque table {} ({} rows)",
            path.display(),
            controller.len()
        );
        Ok(controller)
    }

    /// 从任意 CSV 数据源加载（需要表头）
    pub fn from_reader(reader: impl Read) -> Result<Self, ControlError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let rows = csv
            .deserialize::<TableRow>()
            .map(|row| row.map(|row| TorqueCommand::new(row.left, row.right)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 已回放的行数
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn finished(&self) -> bool {
        self.cursor >= self.rows.len()
    }
}

impl Controller for TableController {
    fn name(&self) -> &str {
        "table"
    }

    fn needs_frame(&self) -> bool {
        false
    }

    fn tick(&mut self, _input: &ControlInput) -> Result<TorqueCommand, ControlError> {
        match self.rows.get(self.cursor) {
            Some(command) => {
                self.cursor += 1;
                if self.finished() {
                    debug!("Torque table exhausted after {} rows", self.cursor);
                }
                Ok(*command)
            },
            None => Ok(TorqueCommand::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_in_order_then_zero() {
        let csv = "Left_Torque,Right_Torque\n0.3,0.3\n0.5, -0.25\n";
        let mut table = TableController::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.finished());

        let input = ControlInput::default();
        assert_eq!(table.tick(&input).unwrap(), TorqueCommand::new(0.3, 0.3));
        assert_eq!(table.tick(&input).unwrap(), TorqueCommand::new(0.5, -0.25));
        assert!(table.finished());
        assert_eq!(table.tick(&input).unwrap(), TorqueCommand::ZERO);
        assert_eq!(table.position(), 2);
    }

    #[test]
    fn test_values_are_clamped() {
        let csv = "Left_Torque,Right_Torque\n3.0,-7.5\n";
        let mut table = TableController::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(
            table.tick(&ControlInput::default()).unwrap(),
            TorqueCommand::new(1.0, -1.0)
        );
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let csv = "Time,Left_Torque,Right_Torque\n0,0.1,0.2\n";
        let table = TableController::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_bad_row_is_error() {
        let csv = "Left_Torque,Right_Torque\nfast,slow\n";
        assert!(matches!(
            TableController::from_reader(csv.as_bytes()),
            Err(ControlError::Table(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            TableController::from_path("/nonexistent/table_input.csv"),
            Err(ControlError::Io(_))
        ));
    }
}
