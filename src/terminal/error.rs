//! 终端模块错误类型
//!
//! 定义终端核心能力相关的错误类型。
//!
//! ## 功能
//! - 会话创建与重复 ID 错误
//! - PTY 读写错误
//! - 序列化支持（以错误信息字符串输出）

use thiserror::Error;

/// 终端错误类型
///
/// 对已退出或未知会话的写入、调整大小、终止都不是错误，会被静默忽略，
/// 因此这里没有对应的变体。
#[derive(Debug, Error)]
pub enum TerminalError {
    /// 会话 ID 已被占用
    #[error("会话已存在: {0}")]
    SessionAlreadyExists(String),

    /// PTY 创建失败
    #[error("PTY 创建失败: {0}")]
    PtyCreationFailed(String),

    /// 写入失败
    #[error("写入失败: {0}")]
    WriteFailed(String),

    /// 调整大小失败
    #[error("调整大小失败: {0}")]
    ResizeFailed(String),
}

impl From<TerminalError> for String {
    fn from(err: TerminalError) -> Self {
        err.to_string()
    }
}

impl serde::Serialize for TerminalError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
