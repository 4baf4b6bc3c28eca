//! 前端桥接模块
//!
//! ## 模块结构
//! - `protocol` - 命令与事件的线上格式
//! - `service` - 命令路由与事件汇聚
//! - `stdio` - JSON 行传输

pub mod protocol;
pub mod service;
pub mod stdio;

pub use protocol::{BridgeCommand, BridgeEvent};
pub use service::{ServiceChannels, TerminalService};
