//! 应用配置
//!
//! 从 `~/.aixterm/config.yaml`（或环境变量 `AIXTERM_CONFIG` 指定的路径）加载，
//! 文件不存在时使用默认值，每个字段都有默认值。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use aixterm_core::data::default_commands;
use aixterm_core::{LogConfig, TermSize, DEFAULT_COLS, DEFAULT_ROWS};
use aixterm_infra::PredictorConfig;

/// 配置文件路径环境变量
pub const CONFIG_ENV: &str = "AIXTERM_CONFIG";

/// 默认终端类型
pub const DEFAULT_TERM: &str = "xterm-256color";

/// 配置错误类型
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub terminal: TerminalConfig,
    pub suggestion: SuggestionConfig,
    pub predictor: PredictorConfig,
    pub logging: LogConfig,
}

/// 终端会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell 路径，缺省为 $SHELL（Windows 为 %COMSPEC%）
    pub shell: Option<String>,
    /// Shell 参数
    pub args: Vec<String>,
    /// 工作目录，缺省为用户主目录
    pub cwd: Option<PathBuf>,
    /// TERM 环境变量
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            args: Vec::new(),
            cwd: None,
            term: DEFAULT_TERM.to_string(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl TerminalConfig {
    pub fn resolved_shell(&self) -> String {
        if let Some(shell) = &self.shell {
            return shell.clone();
        }
        let var = if cfg!(windows) { "COMSPEC" } else { "SHELL" };
        std::env::var(var).unwrap_or_else(|_| "/bin/bash".to_string())
    }

    pub fn resolved_cwd(&self) -> Option<PathBuf> {
        self.cwd.clone().or_else(dirs::home_dir)
    }

    pub fn size(&self) -> TermSize {
        TermSize::new(self.cols, self.rows)
    }
}

/// 补全引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// 触发补全的最小输入长度（字符数）
    pub min_input_len: usize,
    /// 远程预测防抖时间（毫秒）
    pub debounce_ms: u64,
    /// 作为上下文发送的最近输出行数
    pub context_lines: usize,
    /// 静态命令语料，按顺序匹配
    pub commands: Vec<String>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            min_input_len: 2,
            debounce_ms: 400,
            context_lines: 50,
            commands: default_commands(),
        }
    }
}

impl AppConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aixterm")
            .join("config.yaml")
    }

    /// 从指定路径加载，文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("[配置] 配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}
