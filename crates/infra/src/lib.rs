//! 基础设施模块
//!
//! 包含独立的基础设施组件，不依赖业务逻辑：
//! - predictor: 预测服务抽象与错误类型
//! - prompt: 各预测类型的提示词构建
//! - lm_studio: OpenAI 兼容的 Chat Completions 客户端

pub mod lm_studio;
pub mod predictor;
pub mod prompt;

// 重新导出常用类型
pub use lm_studio::{LmStudioPredictor, PredictorConfig};
pub use predictor::{PredictionError, Predictor};
pub use prompt::build_messages;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
