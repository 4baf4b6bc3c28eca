//! PTY 会话封装
//!
//! 封装一个伪终端子进程，提供原始字节的读写和生命周期管理。
//!
//! ## 功能
//! - 创建 PTY 并启动 Shell 子进程
//! - 在独立线程中读取输出，通过有界通道发布 `SessionEvent`
//! - 输入经队列交给独立写入线程，调用方从不阻塞在 PTY 上
//! - 调整大小、终止进程（SIGHUP，超时后强制终止）
//! - 进程回收后发布唯一一次 `Exited` 事件，且位于所有 `Data` 之后
//!
//! 会话进入 `Exited`（或已被终止）后，所有操作都被静默吸收。

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use aixterm_core::{SessionExit, SessionStatus, TermSize};

use super::error::TerminalError;
use super::events::SessionEvent;
use crate::config::{TerminalConfig, DEFAULT_TERM};

/// 读取缓冲区大小
const READ_BUFFER_SIZE: usize = 4096;

/// Linux 上从站关闭后 master 读取返回 EIO，属于正常结束
const EIO: i32 = 5;

/// 进程状态轮询间隔
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 请求终止后等待进程自行退出的时间，超时则强制终止
const KILL_GRACE: Duration = Duration::from_millis(500);

/// 进程退出后等待残余输出读完的上限
///
/// 子进程的后台进程可能继续持有从站，不能无限等待 EOF。
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 启动参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub shell: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub term: String,
    pub size: TermSize,
    pub env: Vec<(String, String)>,
}

impl SpawnOptions {
    /// 运行指定程序，其余参数取默认值
    pub fn command(shell: impl Into<String>, args: &[&str]) -> Self {
        Self {
            shell: shell.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            term: DEFAULT_TERM.to_string(),
            size: TermSize::default(),
            env: Vec::new(),
        }
    }

    pub fn from_config(config: &TerminalConfig) -> Self {
        Self {
            shell: config.resolved_shell(),
            args: config.args.clone(),
            cwd: config.resolved_cwd(),
            term: config.term.clone(),
            size: config.size(),
            env: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: TermSize) -> Self {
        self.size = size;
        self
    }

    fn build_command(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.shell);
        cmd.args(&self.args);

        if let Some(cwd) = self.cwd.as_ref().filter(|dir| dir.is_dir()) {
            cmd.cwd(cwd);
        }

        cmd.env("TERM", &self.term);
        cmd.env("COLORTERM", "truecolor");
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }
}

/// PTY 会话
pub struct PtySession {
    id: String,
    /// 注册表分配的实例号，用于区分复用同一 ID 的先后会话
    instance: u64,
    status: Arc<RwLock<SessionStatus>>,
    killed: Arc<AtomicBool>,
    size: Mutex<TermSize>,
    /// 输入队列，由写入线程排空；子进程不读取输入时调用方也不会阻塞
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl PtySession {
    /// 启动新会话
    ///
    /// # 参数
    /// - `id`: 会话 ID
    /// - `instance`: 会话实例号
    /// - `options`: 启动参数
    /// - `events`: 事件发布通道，唯一订阅者为注册表
    ///
    /// # 返回
    /// - `Ok(PtySession)`: 进程已启动，读写线程已运行
    /// - `Err(TerminalError::PtyCreationFailed)`: Shell 不存在、无权限或资源耗尽
    pub fn spawn(
        id: &str,
        instance: u64,
        options: &SpawnOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, TerminalError> {
        let size = options.size.clamped();
        tracing::info!(
            "[PTY] 启动会话: id={}, shell={}, size={}x{}",
            id,
            options.shell,
            size.cols,
            size.rows
        );

        let pair = native_pty_system()
            .openpty(to_pty_size(size))
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let mut child = pair
            .slave
            .spawn_command(options.build_command())
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;
        // 父进程不持有从站，子进程退出后读取端才能收到 EOF
        drop(pair.slave);

        let pipes = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match pipes {
            Ok(pipes) => pipes,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TerminalError::PtyCreationFailed(e.to_string()));
            }
        };
        let killer = child.clone_killer();

        let status = Arc::new(RwLock::new(SessionStatus::Spawning));
        let killed = Arc::new(AtomicBool::new(false));
        let output_open = Arc::new(Mutex::new(true));
        let reader_done = Arc::new(AtomicBool::new(false));
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        // 等待线程拥有子进程，无论其余线程是否启动成功都负责回收
        spawn_exit_waiter(ExitWaiter {
            session_id: id.to_string(),
            instance,
            child,
            status: status.clone(),
            killed: killed.clone(),
            output_open: output_open.clone(),
            reader_done: reader_done.clone(),
            events: events.clone(),
        })?;

        let session = Self {
            id: id.to_string(),
            instance,
            status: status.clone(),
            killed: killed.clone(),
            size: Mutex::new(size),
            input_tx,
            master: Mutex::new(pair.master),
            killer: Mutex::new(killer),
        };

        // 启动失败时 session 被丢弃，Drop 会终止进程
        spawn_input_writer(id.to_string(), writer, input_rx, killed.clone())?;
        spawn_output_reader(
            id.to_string(),
            instance,
            reader,
            output_open,
            reader_done,
            killed,
            events,
        )?;

        {
            let mut status = status.write();
            if *status == SessionStatus::Spawning {
                *status = SessionStatus::Running;
            }
        }

        tracing::info!("[PTY] 会话已启动: id={}, instance={}", id, instance);
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    pub fn size(&self) -> TermSize {
        *self.size.lock()
    }

    /// 已退出或已请求终止
    pub fn is_closed(&self) -> bool {
        self.killed.load(Ordering::SeqCst) || !self.status().is_live()
    }

    /// 写入原始字节，不做任何转义
    ///
    /// 只入队不等待；字节按调用顺序由写入线程送入 PTY。
    pub fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        if self.is_closed() || data.is_empty() {
            return Ok(());
        }
        self.input_tx
            .send(data.to_vec())
            .map_err(|_| TerminalError::WriteFailed("写入线程已结束".to_string()))
    }

    /// 调整 PTY 大小
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        if self.is_closed() {
            return Ok(());
        }
        let size = TermSize::new(cols, rows).clamped();
        self.master
            .lock()
            .resize(to_pty_size(size))
            .map_err(|e| TerminalError::ResizeFailed(e.to_string()))?;
        *self.size.lock() = size;

        tracing::debug!(
            "[PTY] 调整大小: id={}, size={}x{}",
            self.id,
            size.cols,
            size.rows
        );
        Ok(())
    }

    /// 请求终止进程
    ///
    /// 幂等，不等待退出。先发送 SIGHUP，进程在 `KILL_GRACE` 内未退出时
    /// 由等待线程强制终止；退出通过 `Exited` 事件异步观察。
    pub fn kill(&self) {
        if !self.status().is_live() || self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("[PTY] 终止进程: id={}", self.id);
        if let Err(e) = self.killer.lock().kill() {
            tracing::debug!("[PTY] 终止进程失败（可能已退出）: id={}, error={}", self.id, e);
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.kill();
        tracing::debug!("[PTY] 会话已销毁: id={}", self.id);
    }
}

fn to_pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// 启动输入写入线程
///
/// 按入队顺序写入，直到队列关闭或 PTY 不可写。
fn spawn_input_writer(
    session_id: String,
    mut writer: Box<dyn Write + Send>,
    mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    killed: Arc<AtomicBool>,
) -> Result<(), TerminalError> {
    std::thread::Builder::new()
        .name(format!("pty-writer-{}", session_id))
        .spawn(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    if !killed.load(Ordering::SeqCst) {
                        tracing::warn!("[PTY] 写入失败: id={}, error={}", session_id, e);
                    }
                    break;
                }
            }
            tracing::debug!("[PTY] 写入线程结束: id={}", session_id);
        })
        .map(|_| ())
        .map_err(|e| TerminalError::PtyCreationFailed(format!("启动写入线程失败: {}", e)))
}

/// 启动输出读取线程
///
/// 按产生顺序发布 `Data`，直到 EOF 或输出闸门关闭。
fn spawn_output_reader(
    session_id: String,
    instance: u64,
    mut reader: Box<dyn Read + Send>,
    output_open: Arc<Mutex<bool>>,
    reader_done: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    events: mpsc::Sender<SessionEvent>,
) -> Result<(), TerminalError> {
    std::thread::Builder::new()
        .name(format!("pty-reader-{}", session_id))
        .spawn(move || {
            let mut buffer = [0u8; READ_BUFFER_SIZE];

            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        // 持有闸门锁发送，`Exited` 之后不会再出现 `Data`
                        let open = output_open.lock();
                        if !*open {
                            break;
                        }
                        let event = SessionEvent::Data {
                            session_id: session_id.clone(),
                            instance,
                            data: buffer[..n].to_vec(),
                        };
                        if events.blocking_send(event).is_err() {
                            // 订阅者已不存在，交给等待线程终止进程
                            tracing::debug!("[PTY] 事件通道已关闭: id={}", session_id);
                            killed.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        if e.raw_os_error() != Some(EIO) && !killed.load(Ordering::SeqCst) {
                            tracing::error!("[PTY] 读取错误: id={}, error={}", session_id, e);
                        }
                        break;
                    }
                }
            }

            reader_done.store(true, Ordering::SeqCst);
        })
        .map(|_| ())
        .map_err(|e| TerminalError::PtyCreationFailed(format!("启动读取线程失败: {}", e)))
}

/// 等待线程的全部状态
struct ExitWaiter {
    session_id: String,
    instance: u64,
    child: Box<dyn Child + Send + Sync>,
    status: Arc<RwLock<SessionStatus>>,
    killed: Arc<AtomicBool>,
    output_open: Arc<Mutex<bool>>,
    reader_done: Arc<AtomicBool>,
    events: mpsc::Sender<SessionEvent>,
}

/// 启动进程等待线程
///
/// 轮询子进程状态；请求终止后超过 `KILL_GRACE` 仍存活则强制终止。
/// 进程回收后等待读取线程排空残余输出，关闭输出闸门，再发布唯一的 `Exited`。
fn spawn_exit_waiter(waiter: ExitWaiter) -> Result<(), TerminalError> {
    let name = format!("pty-waiter-{}", waiter.session_id);
    std::thread::Builder::new()
        .name(name)
        .spawn(move || waiter.run())
        .map(|_| ())
        .map_err(|e| TerminalError::PtyCreationFailed(format!("启动等待线程失败: {}", e)))
}

impl ExitWaiter {
    fn run(mut self) {
        let exit = self.reap();

        let deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        while !self.reader_done.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
        *self.output_open.lock() = false;

        *self.status.write() = SessionStatus::Exited;
        tracing::info!(
            "[PTY] 进程已退出: id={}, exit_code={:?}",
            self.session_id,
            exit.exit_code
        );

        let _ = self.events.blocking_send(SessionEvent::Exited {
            session_id: self.session_id,
            instance: self.instance,
            exit,
        });
    }

    fn reap(&mut self) -> SessionExit {
        let mut kill_requested_at: Option<Instant> = None;
        let mut escalated = false;

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    return SessionExit {
                        exit_code: Some(status.exit_code()),
                        success: status.success(),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("[PTY] 获取退出码失败: id={}, error={}", self.session_id, e);
                    return SessionExit::default();
                }
            }

            if self.killed.load(Ordering::SeqCst) && !escalated {
                let since = *kill_requested_at.get_or_insert_with(Instant::now);
                if since.elapsed() >= KILL_GRACE {
                    tracing::warn!("[PTY] 进程未响应 SIGHUP，强制终止: id={}", self.session_id);
                    escalated = true;
                    // 自有子进程的 kill 先发 SIGHUP，短暂等待后发送 SIGKILL
                    if let Err(e) = self.child.kill() {
                        tracing::debug!(
                            "[PTY] 强制终止失败（可能已退出）: id={}, error={}",
                            self.session_id,
                            e
                        );
                    }
                }
            }

            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}
