//! aixterm 终端核心
//!
//! 多会话伪终端管理，配合静态语料与本地模型的内联命令建议。
//! 前端通过 stdin/stdout 上的 JSON 行协议与本进程通信。

pub mod bridge;
pub mod config;
pub mod suggestion;
pub mod terminal;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use aixterm_infra::LmStudioPredictor;

use bridge::{stdio, TerminalService};
use config::AppConfig;

/// 命令与事件通道容量
const CHANNEL_CAPACITY: usize = 256;

/// 关闭后等待事件写出的时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// 在 stdin/stdout 上运行终端服务，直到输入结束或收到关闭命令
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let predictor = Arc::new(LmStudioPredictor::new(config.predictor.clone())?);

    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let (service, channels) = TerminalService::new(&config, predictor, event_tx);

    let writer = tokio::spawn(stdio::write_events(tokio::io::stdout(), event_rx));
    let reader = tokio::spawn(stdio::read_commands(tokio::io::stdin(), command_tx));

    service.run(channels, command_rx).await;
    reader.abort();

    // 进行中的预测任务仍持有事件发送端
    match tokio::time::timeout(SHUTDOWN_GRACE, writer).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => tracing::warn!("[启动] 输出任务异常结束: {}", e),
        Err(_) => tracing::warn!("[启动] 等待输出结束超时"),
    }

    tracing::info!("[启动] 已退出");
    Ok(())
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
