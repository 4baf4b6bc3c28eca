//! 命令建议模块
//!
//! ## 模块结构
//! - `input_line` - 输入行状态与本地回显模型
//! - `static_match` - 常用命令前缀匹配
//! - `engine` - 防抖、远程预测与过期结果丢弃

pub mod engine;
pub mod input_line;
pub mod static_match;

pub use engine::{
    ContextSource, KeyOutcome, SuggestionEngine, SuggestionSettings, SuggestionUpdate,
};
pub use input_line::{InputLineState, KeyInput};
pub use static_match::StaticMatcher;
