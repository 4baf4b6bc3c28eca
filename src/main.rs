use std::time::Duration;

use anyhow::Context;

use aixterm_core::init_logging;
use aixterm_lib::config::AppConfig;

/// stdin 的阻塞读取无法取消，退出时不等待它
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    let path = AppConfig::default_path();
    let config = AppConfig::load(&path)
        .with_context(|| format!("加载配置失败: {}", path.display()))?;

    init_logging(&config.logging).context("初始化日志失败")?;

    tracing::info!(
        "[启动] aixterm v{}, 配置文件: {}",
        aixterm_lib::version(),
        path.display()
    );

    let runtime = tokio::runtime::Runtime::new().context("创建运行时失败")?;
    let result = runtime.block_on(aixterm_lib::run(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}
