//! 传感器二进制包
//!
//! 对端（仿真引擎）每帧发送一个二进制 WebSocket 消息：
//!
//! ```text
//! +----------------+---------------------------+------------------+
//! | u32 LE: N      | N 字节 UTF-8 JSON 头       | 剩余字节: JPEG    |
//! +----------------+---------------------------+------------------+
//! ```
//!
//! JSON 头：`{"soc": <float>, "filename": <string, 可选>}`

use crate::{ProtocolError, bytes_to_u32_le, u32_to_bytes_le};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 长度前缀字节数
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// JPEG 负载最小字节数
///
/// 小于此值的负载视为截断帧，直接丢弃。
pub const MIN_JPEG_BYTES: usize = 1000;

/// 传感器包 JSON 头
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorHeader {
    /// 电池荷电状态（State of Charge），名义范围 `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soc: Option<f64>,
    /// 对端给出的帧文件名（如 `frame_000001.jpg`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// 解码后的传感器包
#[derive(Debug, Clone, PartialEq)]
pub struct SensorPacket {
    pub header: SensorHeader,
    /// JPEG 负载（与原始消息共享内存，零拷贝切片）
    pub jpeg: Bytes,
    /// 头部占用字节数（长度前缀 + JSON）
    pub header_len: usize,
}

impl SensorPacket {
    /// 解码一条原始二进制消息
    ///
    /// # 错误
    /// - `InvalidLength`: 消息不足 4 字节，或长度前缀超出消息长度
    /// - `BadHeader`: JSON 头不是合法 UTF-8 / JSON 对象
    /// - `TooSmall`: JPEG 负载小于 [`MIN_JPEG_BYTES`]
    pub fn decode(raw: Bytes) -> Result<Self, ProtocolError> {
        if raw.len() < LENGTH_PREFIX_BYTES {
            return Err(ProtocolError::InvalidLength {
                expected: LENGTH_PREFIX_BYTES,
                actual: raw.len(),
            });
        }

        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        prefix.copy_from_slice(&raw[..LENGTH_PREFIX_BYTES]);
        let json_len = bytes_to_u32_le(prefix) as usize;

        let header_len = LENGTH_PREFIX_BYTES.saturating_add(json_len);
        if header_len > raw.len() {
            return Err(ProtocolError::InvalidLength {
                expected: header_len,
                actual: raw.len(),
            });
        }

        let header_text = std::str::from_utf8(&raw[LENGTH_PREFIX_BYTES..header_len])
            .map_err(|e| ProtocolError::BadHeader(e.to_string()))?;
        let header: SensorHeader = serde_json::from_str(header_text)
            .map_err(|e| ProtocolError::BadHeader(e.to_string()))?;

        let jpeg = raw.slice(header_len..);
        if jpeg.len() < MIN_JPEG_BYTES {
            return Err(ProtocolError::TooSmall {
                min: MIN_JPEG_BYTES,
                actual: jpeg.len(),
            });
        }

        Ok(Self {
            header,
            jpeg,
            header_len,
        })
    }

    /// 编码为线上格式
    ///
    /// 供进程内对端和测试使用；桥接端本身只解码。
    pub fn encode(header: &SensorHeader, jpeg: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let json = serde_json::to_vec(header)?;
        let json_len = u32::try_from(json.len()).map_err(|_| ProtocolError::InvalidLength {
            expected: u32::MAX as usize,
            actual: json.len(),
        })?;

        let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + json.len() + jpeg.len());
        out.extend_from_slice(&u32_to_bytes_le(json_len));
        out.extend_from_slice(&json);
        out.extend_from_slice(jpeg);
        Ok(out)
    }
}
