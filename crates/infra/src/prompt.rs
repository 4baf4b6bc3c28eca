//! 提示词构建
//!
//! 按预测类型生成 system / user 两条消息。

use aixterm_core::{ChatMessage, PredictionKind};

const COMMAND_GENERATION_SYSTEM: &str = "You are an expert Linux terminal assistant. \
Your goal is to provide the exact command the user is asking for. \
Output ONLY the command, no explanation, no markdown. \
If there are multiple steps, combine them with &&. \
Use the provided terminal context (history) to understand current directory, recent errors, or active files.";

const AUTOCOMPLETE_SYSTEM: &str = "You are a terminal autocomplete engine. \
Predict the rest of the command based on the prefix and history. \
Output ONLY the remaining part of the command (the suffix). \
No full command, no quotes, no explanation. If you can't predict, output nothing.";

const EXPLANATION_SYSTEM: &str =
    "You are a helpful Linux expert. Explain the following command or terminal output clearly and concisely.";

const GENERIC_SYSTEM: &str = "You are a helpful AI assistant integrated into a terminal.";

/// 构建 Chat Completions 消息列表
pub fn build_messages(kind: PredictionKind, prompt: &str, context: &str) -> Vec<ChatMessage> {
    let (system, user) = match kind {
        PredictionKind::CommandGeneration => {
            let context = if context.is_empty() {
                "No context available."
            } else {
                context
            };
            (
                COMMAND_GENERATION_SYSTEM,
                format!(
                    "Terminal Context (recent history):\n{}\n\nUser request: {}",
                    context, prompt
                ),
            )
        }
        PredictionKind::Autocomplete => (
            AUTOCOMPLETE_SYSTEM,
            format!(
                "Terminal Context:\n{}\n\nCurrent command prefix: \"{}\"",
                context, prompt
            ),
        ),
        PredictionKind::Explanation => (
            EXPLANATION_SYSTEM,
            format!("Context: {}\n\nExplain this: {}", context, prompt),
        ),
        PredictionKind::Generic => (GENERIC_SYSTEM, prompt.to_string()),
    };

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
