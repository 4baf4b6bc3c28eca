//! 终端核心模块
//!
//! 提供 PTY 会话和会话注册表，通过事件通道向上层发布输出和退出。
//!
//! ## 模块结构
//! - `error` - 错误类型定义
//! - `events` - 会话事件与注册表事件
//! - `pty_session` - PTY 会话封装
//! - `session_registry` - 会话注册表
//! - `output_tail` - 输出尾部缓存（预测上下文）
//!
//! ## 使用示例
//! ```ignore
//! use aixterm_lib::terminal::{SessionRegistry, SpawnOptions};
//!
//! let (registry, mut events) = SessionRegistry::new(SpawnOptions::from_config(&config.terminal));
//! registry.spawn("panel-1")?;
//! registry.write("panel-1", b"ls -la\r");
//! ```

pub mod error;
pub mod events;
pub mod output_tail;
pub mod pty_session;
pub mod session_registry;


// 重新导出常用类型
pub use error::TerminalError;
pub use events::{RegistryEvent, SessionEvent};
pub use output_tail::OutputTail;
pub use pty_session::{PtySession, SpawnOptions};
pub use session_registry::SessionRegistry;
