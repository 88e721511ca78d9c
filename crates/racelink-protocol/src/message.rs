//! 文本 JSON 消息
//!
//! 桥接端发往对端的所有文本消息都带 `type` 字段：
//!
//! - 握手：`{"type":"connection","status":"success"}`
//! - 控制：`{"type":"control","leftTorque":L,"rightTorque":R}`（每 50ms 一次）
//! - 比赛结束：`{"type":"connection","message":"RaceEnd"}`

use crate::{ProtocolError, TorqueCommand};
use serde::{Deserialize, Serialize};

/// 握手成功状态值
pub const STATUS_SUCCESS: &str = "success";
/// 比赛结束消息值
pub const MESSAGE_RACE_END: &str = "RaceEnd";

/// 桥接端文本消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeMessage {
    /// 扭矩控制
    Control {
        #[serde(rename = "leftTorque")]
        left_torque: f64,
        #[serde(rename = "rightTorque")]
        right_torque: f64,
    },
    /// 连接相关通知（握手 / 比赛结束）
    Connection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl BridgeMessage {
    /// 连接建立后的握手消息
    pub fn handshake() -> Self {
        BridgeMessage::Connection {
            status: Some(STATUS_SUCCESS.to_string()),
            message: None,
        }
    }

    /// 比赛结束消息
    pub fn race_end() -> Self {
        BridgeMessage::Connection {
            status: None,
            message: Some(MESSAGE_RACE_END.to_string()),
        }
    }

    /// 控制消息（命令已钳位）
    pub fn control(command: TorqueCommand) -> Self {
        BridgeMessage::Control {
            left_torque: command.left(),
            right_torque: command.right(),
        }
    }

    /// 是否为控制消息
    pub fn is_control(&self) -> bool {
        matches!(self, BridgeMessage::Control { .. })
    }

    /// 序列化为 JSON 文本
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 从 JSON 文本解析
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_json() {
        let json = BridgeMessage::handshake().to_json().unwrap();
        assert_eq!(json, r#"{"type":"connection","status":"success"}"#);
    }

    #[test]
    fn test_race_end_json() {
        let json = BridgeMessage::race_end().to_json().unwrap();
        assert_eq!(json, r#"{"type":"connection","message":"RaceEnd"}"#);
    }

    #[test]
    fn test_control_json() {
        let json = BridgeMessage::control(TorqueCommand::new(0.3, -0.5))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"control","leftTorque":0.3,"rightTorque":-0.5}"#);
    }

    #[test]
    fn test_control_message_is_clamped() {
        let msg = BridgeMessage::control(TorqueCommand::new(4.0, -4.0));
        assert_eq!(
            msg,
            BridgeMessage::Control {
                left_torque: 1.0,
                right_torque: -1.0
            }
        );
    }

    #[test]
    fn test_parse_control() {
        let msg =
            BridgeMessage::from_json(r#"{"type":"control","leftTorque":0.1,"rightTorque":0.2}"#)
                .unwrap();
        assert!(msg.is_control());
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        assert!(BridgeMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }
}
