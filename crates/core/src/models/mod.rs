//! 数据模型

pub mod openai;
pub mod prediction;
pub mod terminal;

pub use openai::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
pub use prediction::{PredictionKind, PredictionResponse};
pub use terminal::{SessionExit, SessionStatus, TermSize, DEFAULT_COLS, DEFAULT_ROWS};
