//! 前端通信协议
//!
//! 每行一个 JSON 对象。命令以 `type` 区分，事件以 `event` 区分，
//! 输出字节以 base64 编码传输。
//!
//! 按键有两种形式：`keystroke` 的 `data` 为 UTF-8 文本，参与输入行编辑；
//! `keystroke_bytes` 的 `data` 为 base64 编码的任意字节，用于文本无法表示的输入。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use aixterm_core::PredictionResponse;

/// 前端发来的命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// 启动终端，省略 ID 时自动生成
    Spawn {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        cols: Option<u16>,
        #[serde(default)]
        rows: Option<u16>,
    },
    /// 用户按键，UTF-8 文本
    Keystroke { id: String, data: String },
    /// 用户按键，base64 编码的原始字节
    KeystrokeBytes { id: String, data: String },
    Resize { id: String, cols: u16, rows: u16 },
    Kill { id: String },
    /// 显式预测请求，未知类型按 generic 处理
    Predict {
        request_id: String,
        kind: String,
        prompt: String,
        #[serde(default)]
        context: Option<String>,
    },
    /// 切换活动终端
    Focus { id: String },
    /// 取消当前建议
    Dismiss { id: String },
    Shutdown,
}

/// 解码 `keystroke_bytes` 携带的字节
pub fn decode_input(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// 发往前端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum BridgeEvent {
    #[serde(rename = "terminal:spawned")]
    Spawned { id: String },

    #[serde(rename = "terminal:spawn_failed")]
    SpawnFailed { id: String, error: String },

    /// `data` 为 base64 编码的原始输出
    #[serde(rename = "terminal:output")]
    Output { id: String, data: String },

    #[serde(rename = "terminal:exit")]
    Exit { id: String },

    /// `suggestion` 为空串表示清除
    #[serde(rename = "terminal:suggestion")]
    Suggestion {
        id: String,
        input: String,
        suggestion: String,
    },

    #[serde(rename = "ai:prediction")]
    PredictionResult {
        request_id: String,
        #[serde(flatten)]
        response: PredictionResponse,
    },
}

impl BridgeEvent {
    pub fn output(id: &str, data: &[u8]) -> Self {
        Self::Output {
            id: id.to_string(),
            data: STANDARD.encode(data),
        }
    }

    /// 解码 `Output` 事件携带的字节
    pub fn output_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Output { data, .. } => STANDARD.decode(data).ok(),
            _ => None,
        }
    }
}
