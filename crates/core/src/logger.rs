//! 日志管理模块
//!
//! 安装全局 `tracing` 订阅器：始终输出到 stderr（stdout 留给桥接协议），
//! 可选追加写入 `~/.aixterm/logs/aixterm.log`，按大小轮转并按天数清理旧文件。

use chrono::{Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// 日志文件名
pub const LOG_FILE_NAME: &str = "aixterm.log";

/// 日志错误类型
#[derive(Debug, Error)]
pub enum LoggerError {
    /// 无效的日志级别
    #[error("无效的日志级别: {0}")]
    InvalidLevel(String),

    /// 日志文件 IO 错误
    #[error("日志文件错误: {0}")]
    Io(#[from] std::io::Error),

    /// 全局订阅器已安装
    #[error("日志系统已初始化")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 日志级别: trace | debug | info | warn | error
    pub level: String,
    /// 是否写入日志文件
    pub file_logging: bool,
    /// 单个日志文件最大字节数，超过后轮转
    pub max_file_size: u64,
    /// 轮转文件保留天数
    pub retention_days: u32,
    /// 日志目录，缺省为 ~/.aixterm/logs
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            max_file_size: 10 * 1024 * 1024,
            retention_days: 7,
            log_dir: None,
        }
    }
}

impl LogConfig {
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }
}

/// 默认日志目录: ~/.aixterm/logs
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aixterm")
        .join("logs")
}

/// 初始化全局日志
///
/// 只能调用一次，重复调用返回 `LoggerError::AlreadyInitialized`。
pub fn init_logging(config: &LogConfig) -> Result<(), LoggerError> {
    let level: tracing::Level = config
        .level
        .parse()
        .map_err(|_| LoggerError::InvalidLevel(config.level.clone()))?;

    let writer = if config.file_logging {
        let log_dir = config.resolved_log_dir();
        fs::create_dir_all(&log_dir)?;
        let path = log_dir.join(LOG_FILE_NAME);
        rotate_log_file_if_needed(&path, config.max_file_size);
        prune_old_logs(&path, config.retention_days);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)))
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

/// 超过大小上限时将日志文件重命名为带时间戳的轮转文件
///
/// 返回是否发生了轮转。
pub fn rotate_log_file_if_needed(path: &Path, max_file_size: u64) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };

    if metadata.len() <= max_file_size {
        return false;
    }

    let suffix = Local::now().format("%Y%m%d-%H%M%S");
    let rotated = path.with_file_name(format!(
        "{}.{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        suffix
    ));

    fs::rename(path, &rotated).is_ok()
}

/// 删除超过保留天数的轮转文件
pub fn prune_old_logs(path: &Path, retention_days: u32) {
    let Some(dir) = path.parent() else {
        return;
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let cutoff = Utc::now() - Duration::days(retention_days as i64);
    let prefix = format!(
        "{}.",
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !file_name.starts_with(&prefix) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let modified = chrono::DateTime::<Utc>::from(modified);
        if modified < cutoff {
            let _ = fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.file_logging);
        assert_eq!(config.retention_days, 7);
        assert!(config.resolved_log_dir().ends_with(".aixterm/logs"));
    }

    #[test]
    fn test_rotate_small_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(&path, b"short").unwrap();

        assert!(!rotate_log_file_if_needed(&path, 1024));
        assert!(path.exists());
    }

    #[test]
    fn test_rotate_large_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[b'x'; 64]).unwrap();
        drop(file);

        assert!(rotate_log_file_if_needed(&path, 16));
        assert!(!path.exists());

        let rotated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(rotated.len(), 1);
        assert!(rotated[0].starts_with("aixterm.log."));
    }

    #[test]
    fn test_rotate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!rotate_log_file_if_needed(&dir.path().join("none.log"), 0));
    }

    #[test]
    fn test_prune_keeps_recent_and_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(dir.path().join("aixterm.log.20260101-000000"), b"old").unwrap();
        fs::write(dir.path().join("other.txt"), b"keep").unwrap();

        // 刚创建的文件不会超过保留期
        prune_old_logs(&path, 7);
        assert!(dir.path().join("aixterm.log.20260101-000000").exists());
        assert!(dir.path().join("other.txt").exists());
    }

    #[test]
    fn test_init_logging_invalid_level() {
        let config = LogConfig {
            level: "loud".to_string(),
            file_logging: false,
            ..Default::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggerError::InvalidLevel(_))
        ));
    }
}
