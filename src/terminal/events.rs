//! 终端事件定义
//!
//! 两级发布/订阅：
//! - `SessionEvent`: PtySession → SessionRegistry，携带会话实例号
//! - `RegistryEvent`: SessionRegistry → 订阅者，退出细节被归一化为 `Closed`

use aixterm_core::SessionExit;

/// 单个会话发布的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 原始输出块
    Data {
        session_id: String,
        instance: u64,
        data: Vec<u8>,
    },
    /// 进程已退出，每个会话实例只发送一次，且在最后一个 Data 之后
    Exited {
        session_id: String,
        instance: u64,
        exit: SessionExit,
    },
}

/// 注册表重新发布的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Data { session_id: String, data: Vec<u8> },
    /// 会话已从注册表移除
    Closed { session_id: String },
}

impl RegistryEvent {
    pub fn session_id(&self) -> &str {
        match self {
            RegistryEvent::Data { session_id, .. } => session_id,
            RegistryEvent::Closed { session_id } => session_id,
        }
    }
}
