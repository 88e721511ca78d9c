//! 对端上报的比赛元数据
//!
//! 比赛结束时对端发送一条文本 JSON，其中 `data` 数组是逐 tick 的遥测记录。
//! 桥接核心只负责识别并转交给元数据协作方（CSV 导出等不在此处实现）。

use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// 单条遥测记录
///
/// 所有字段都是可选的：对端不同版本上报的列并不完全一致。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRecord {
    pub id: Option<u64>,
    pub time_ms: Option<f64>,
    pub frame_id: Option<u64>,
    pub filename: Option<String>,
    pub soc: Option<f64>,
    pub wheel_left: Option<f64>,
    pub wheel_right: Option<f64>,
    pub status: Option<serde_json::Value>,
    pub pos_x: Option<f64>,
    pub pos_y: Option<f64>,
    pub pos_z: Option<f64>,
    pub yaw: Option<f64>,
    pub error_code: Option<serde_json::Value>,
}

/// 比赛元数据（`{"data": [...]}`）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceMetadata {
    pub data: Vec<TelemetryRecord>,
}

/// 入站文本消息分类
#[derive(Debug, Clone, PartialEq)]
pub enum InboundText {
    /// 含 `data` 数组的比赛元数据
    RaceMetadata(RaceMetadata),
    /// 其他合法 JSON（记录日志后忽略）
    Other(serde_json::Value),
}

/// 对入站文本消息分类
///
/// # 错误
/// - `Json`: 不是合法 JSON
/// - `InvalidMessage`: 有 `data` 数组但记录格式不对
pub fn classify_text(text: &str) -> Result<InboundText, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    let has_data = value
        .get("data")
        .map(|data| data.is_array())
        .unwrap_or(false);
    if !has_data {
        return Ok(InboundText::Other(value));
    }

    let metadata: RaceMetadata = serde_json::from_value(value)
        .map_err(|e| ProtocolError::InvalidMessage(format!("race metadata: {}", e)))?;
    Ok(InboundText::RaceMetadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_race_metadata() {
        let text = r#"{"data":[
            {"id":1,"time_ms":50.0,"frame_id":1,"filename":"frame_000001.jpg","soc":0.99,
             "wheel_left":0.3,"wheel_right":0.3,"status":"running",
             "pos_x":1.0,"pos_y":0.0,"pos_z":2.5,"yaw":90.0,"error_code":0},
            {"id":2}
        ]}"#;
        match classify_text(text).unwrap() {
            InboundText::RaceMetadata(meta) => {
                assert_eq!(meta.data.len(), 2);
                assert_eq!(meta.data[0].filename.as_deref(), Some("frame_000001.jpg"));
                assert_eq!(meta.data[0].soc, Some(0.99));
                assert_eq!(meta.data[1].id, Some(2));
                assert_eq!(meta.data[1].soc, None);
            },
            other => panic!("Expected RaceMetadata, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_other_json() {
        let result = classify_text(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(result, InboundText::Other(_)));
    }

    #[test]
    fn test_classify_data_not_array_is_other() {
        let result = classify_text(r#"{"data":"nope"}"#).unwrap();
        assert!(matches!(result, InboundText::Other(_)));
    }

    #[test]
    fn test_classify_invalid_json() {
        assert!(matches!(
            classify_text("not json at all"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_classify_bad_records() {
        let result = classify_text(r#"{"data":[{"id":"abc"}]}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }
}
