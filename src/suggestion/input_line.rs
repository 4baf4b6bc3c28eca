//! 输入行状态
//!
//! 基于本地回显模型重建当前输入行。模型只识别单字符按键：
//! 可打印字符追加、DEL 删除、回车提交、单独的 ESC 取消、Tab 接受建议。
//! 多字节块（粘贴、方向键等转义序列）不改变模型。

/// 单次按键在回显模型中的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Append(char),
    Backspace,
    Submit,
    Dismiss,
    Accept,
    /// 模型无法解释的输入，只透传给终端
    Other,
}

impl KeyInput {
    /// 解析一次按键数据
    pub fn classify(data: &str) -> Self {
        let mut chars = data.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Self::Other;
        };
        match c {
            '\r' => Self::Submit,
            '\x7f' => Self::Backspace,
            '\x1b' => Self::Dismiss,
            '\t' => Self::Accept,
            c if !c.is_control() => Self::Append(c),
            _ => Self::Other,
        }
    }
}

/// 每个终端一份的输入行状态
///
/// 非空的 `suggestion` 总是以 `current_input` 为前缀且严格更长。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLineState {
    current_input: String,
    suggestion: String,
    generation: u64,
}

impl InputLineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_input(&self) -> &str {
        &self.current_input
    }

    pub fn suggestion(&self) -> &str {
        &self.suggestion
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_suggestion(&self) -> bool {
        !self.suggestion.is_empty()
    }

    /// 建议中尚未输入的部分，即界面上显示的灰色文本
    pub fn suffix(&self) -> &str {
        self.suggestion
            .strip_prefix(self.current_input.as_str())
            .unwrap_or_default()
    }

    /// 输入长度（按字符计）
    pub fn input_len(&self) -> usize {
        self.current_input.chars().count()
    }

    pub fn push_char(&mut self, c: char) {
        self.current_input.push(c);
        self.edited();
    }

    pub fn pop_char(&mut self) {
        self.current_input.pop();
        self.edited();
    }

    /// 提交或取消：清空输入和建议
    pub fn reset(&mut self) {
        self.current_input.clear();
        self.suggestion.clear();
        self.generation += 1;
    }

    /// 设置建议，不满足前缀约束时清空
    pub fn set_suggestion(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        if suggestion.len() > self.current_input.len()
            && suggestion.starts_with(self.current_input.as_str())
        {
            self.suggestion = suggestion;
        } else {
            self.suggestion.clear();
        }
    }

    pub fn clear_suggestion(&mut self) {
        self.suggestion.clear();
    }

    /// 接受建议
    ///
    /// # 返回
    /// 需要写入终端的后缀；没有建议时返回 `None`
    pub fn accept(&mut self) -> Option<String> {
        if self.suggestion.is_empty() {
            return None;
        }
        let suffix = self.suffix().to_string();
        self.current_input = std::mem::take(&mut self.suggestion);
        self.generation += 1;
        Some(suffix)
    }

    pub fn is_consistent(&self) -> bool {
        self.suggestion.is_empty()
            || (self.suggestion.len() > self.current_input.len()
                && self.suggestion.starts_with(self.current_input.as_str()))
    }

    fn edited(&mut self) {
        self.generation += 1;
        // 用户沿着建议继续输入时保留建议
        let keep = self.suggestion.len() > self.current_input.len()
            && self.suggestion.starts_with(self.current_input.as_str());
        if !keep {
            self.suggestion.clear();
        }
    }
}
