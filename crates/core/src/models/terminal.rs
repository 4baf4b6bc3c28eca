//! 终端会话数据模型

use serde::{Deserialize, Serialize};

/// 默认终端列数
pub const DEFAULT_COLS: u16 = 80;
/// 默认终端行数
pub const DEFAULT_ROWS: u16 = 30;

/// 终端大小
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermSize {
    /// 列数
    pub cols: u16,
    /// 行数
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// 返回至少为 1x1 的尺寸，PTY 不接受 0 行或 0 列
    pub fn clamped(self) -> Self {
        Self {
            cols: self.cols.max(1),
            rows: self.rows.max(1),
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

/// 会话状态
///
/// `Spawning → Running → Exited`，`Exited` 为终态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 正在启动
    #[default]
    Spawning,
    /// 运行中
    Running,
    /// 已退出
    Exited,
}

impl SessionStatus {
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionStatus::Exited)
    }
}

/// 会话退出信息
///
/// 退出码尽力获取，无法解析时为 `None`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExit {
    pub exit_code: Option<u32>,
    pub success: bool,
}
