//! 会话注册表
//!
//! 所有存活会话的唯一事实来源。
//!
//! ## 功能
//! - 按会话 ID 启动、写入、调整大小、终止
//! - 将会话事件归一化后转发给唯一订阅者
//! - 进程退出时移除条目，且移除先于 `Closed` 事件
//! - 每个会话 ID 的每段生命周期只发送一次 `Closed`
//! - 关闭时终止所有会话
//!
//! 会话映射使用分片并发表，只在插入占位和替换条目时短暂持锁，
//! 进程创建发生在锁外，不同会话之间互不阻塞。未知 ID 上的操作被静默忽略。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use aixterm_core::{SessionStatus, TermSize};

use super::error::TerminalError;
use super::events::{RegistryEvent, SessionEvent};
use super::pty_session::{PtySession, SpawnOptions};

/// 会话事件通道容量
pub const SESSION_EVENT_CAPACITY: usize = 256;

/// 注册表条目
enum SessionSlot {
    /// 已占用 ID，进程仍在创建
    Starting(u64),
    Ready(Arc<PtySession>),
}

impl SessionSlot {
    fn instance(&self) -> u64 {
        match self {
            SessionSlot::Starting(instance) => *instance,
            SessionSlot::Ready(session) => session.instance(),
        }
    }

    fn session(&self) -> Option<&Arc<PtySession>> {
        match self {
            SessionSlot::Starting(_) => None,
            SessionSlot::Ready(session) => Some(session),
        }
    }
}

type SessionMap = DashMap<String, SessionSlot>;

/// 实例跟踪
///
/// 记录每个 ID 最新的实例和尚未回收的实例。只有 ID 的最新实例退出时
/// 才发送 `Closed`，被同 ID 新会话取代的旧实例静默结束。
#[derive(Default)]
struct InstanceTracker {
    latest: DashMap<String, u64>,
    unreaped: DashMap<u64, String>,
}

impl InstanceTracker {
    /// 返回被取代的上一个实例
    fn started(&self, session_id: &str, instance: u64) -> Option<u64> {
        self.unreaped.insert(instance, session_id.to_string());
        self.latest.insert(session_id.to_string(), instance)
    }

    /// 进程未能创建，恢复上一个仍未回收的实例
    fn abandoned(&self, session_id: &str, instance: u64, previous: Option<u64>) {
        self.unreaped.remove(&instance);
        match previous.filter(|p| self.unreaped.contains_key(p)) {
            Some(previous) => {
                if let Some(mut latest) = self.latest.get_mut(session_id) {
                    if *latest == instance {
                        *latest = previous;
                    }
                }
            }
            None => {
                self.latest.remove_if(session_id, |_, latest| *latest == instance);
            }
        }
    }

    fn is_latest(&self, session_id: &str, instance: u64) -> bool {
        self.latest
            .get(session_id)
            .map_or(false, |latest| *latest == instance)
    }

    /// 回收实例，返回它是否为该 ID 的最新实例
    fn reaped(&self, session_id: &str, instance: u64) -> bool {
        self.unreaped.remove(&instance);
        self.latest
            .remove_if(session_id, |_, latest| *latest == instance)
            .is_some()
    }

    fn pending(&self) -> usize {
        self.unreaped.len()
    }
}

/// 会话注册表
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    tracker: Arc<InstanceTracker>,
    defaults: SpawnOptions,
    session_tx: mpsc::Sender<SessionEvent>,
    next_instance: AtomicU64,
}

impl SessionRegistry {
    /// 创建注册表并启动事件转发任务
    ///
    /// 必须在 tokio 运行时内调用。
    ///
    /// # 参数
    /// - `defaults`: `spawn` 使用的默认启动参数
    ///
    /// # 返回
    /// 注册表及其事件接收端
    pub fn new(defaults: SpawnOptions) -> (Self, mpsc::Receiver<RegistryEvent>) {
        let (session_tx, session_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let sessions: Arc<SessionMap> = Arc::new(DashMap::new());
        let tracker = Arc::new(InstanceTracker::default());

        tokio::spawn(forward_events(
            sessions.clone(),
            tracker.clone(),
            session_rx,
            event_tx,
        ));

        tracing::info!("[会话注册表] 已初始化, shell={}", defaults.shell);

        let registry = Self {
            sessions,
            tracker,
            defaults,
            session_tx,
            next_instance: AtomicU64::new(1),
        };
        (registry, event_rx)
    }

    pub fn defaults(&self) -> &SpawnOptions {
        &self.defaults
    }

    /// 使用默认参数启动会话
    ///
    /// 已存在的 ID 返回 `SessionAlreadyExists`，原会话不受影响。
    pub fn spawn(&self, session_id: &str) -> Result<(), TerminalError> {
        self.spawn_with(session_id, &self.defaults)
    }

    /// 使用默认参数和指定大小启动会话
    pub fn spawn_with_size(&self, session_id: &str, size: TermSize) -> Result<(), TerminalError> {
        let options = self.defaults.clone().with_size(size);
        self.spawn_with(session_id, &options)
    }

    /// 启动会话并生成 ID
    pub fn spawn_generated(&self, size: TermSize) -> Result<String, TerminalError> {
        let session_id = Uuid::new_v4().to_string();
        self.spawn_with_size(&session_id, size)?;
        Ok(session_id)
    }

    /// 使用指定参数启动会话
    ///
    /// 先以占位条目占用 ID，再在锁外创建进程，最后替换为就绪条目。
    /// 创建期间被终止的会话在创建完成后立即终止。
    pub fn spawn_with(&self, session_id: &str, options: &SpawnOptions) -> Result<(), TerminalError> {
        let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
        let previous = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!("[会话注册表] 会话 ID 已存在: {}", session_id);
                return Err(TerminalError::SessionAlreadyExists(session_id.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(SessionSlot::Starting(instance));
                self.tracker.started(session_id, instance)
            }
        };

        let spawned = PtySession::spawn(session_id, instance, options, self.session_tx.clone());
        let session = match spawned {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.sessions
                    .remove_if(session_id, |_, slot| slot.instance() == instance);
                self.tracker.abandoned(session_id, instance, previous);
                return Err(e);
            }
        };

        let installed = self.sessions.get_mut(session_id).map_or(false, |mut slot| {
            if slot.instance() == instance {
                *slot = SessionSlot::Ready(session.clone());
                true
            } else {
                false
            }
        });
        if !installed {
            tracing::info!("[会话注册表] 会话 {} 在启动期间被终止", session_id);
            session.kill();
        }
        Ok(())
    }

    fn get(&self, session_id: &str) -> Option<Arc<PtySession>> {
        // 克隆后立即释放分片锁
        self.sessions
            .get(session_id)
            .and_then(|slot| slot.session().cloned())
    }

    /// 写入原始字节，未知或仍在启动的 ID 静默忽略
    pub fn write(&self, session_id: &str, data: &[u8]) {
        let Some(session) = self.get(session_id) else {
            tracing::trace!("[会话注册表] 忽略写入未知会话: {}", session_id);
            return;
        };
        if let Err(e) = session.write(data) {
            tracing::warn!("[会话注册表] 写入会话 {} 失败: {}", session_id, e);
        }
    }

    /// 调整大小，未知 ID 静默忽略
    pub fn resize(&self, session_id: &str, cols: u16, rows: u16) {
        let Some(session) = self.get(session_id) else {
            return;
        };
        if let Err(e) = session.resize(cols, rows) {
            tracing::warn!("[会话注册表] 调整会话 {} 大小失败: {}", session_id, e);
        }
    }

    /// 终止会话并立即移除，幂等
    ///
    /// `Closed` 事件在进程真正退出后由转发任务发送。
    pub fn kill(&self, session_id: &str) {
        if let Some((_, slot)) = self.sessions.remove(session_id) {
            tracing::info!("[会话注册表] 终止会话: {}", session_id);
            if let Some(session) = slot.session() {
                session.kill();
            }
        }
    }

    /// 终止所有会话并清空注册表
    pub fn shutdown(&self) {
        let ids = self.live_ids();
        if !ids.is_empty() {
            tracing::info!("[会话注册表] 关闭 {} 个会话", ids.len());
        }
        for session_id in ids {
            self.kill(&session_id);
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.sessions.get(session_id).map(|slot| match slot.value() {
            SessionSlot::Starting(_) => SessionStatus::Spawning,
            SessionSlot::Ready(session) => session.status(),
        })
    }

    /// 已启动但尚未回收的进程数，包括已从注册表移除的会话
    pub fn pending_exits(&self) -> usize {
        self.tracker.pending()
    }

    pub fn size(&self, session_id: &str) -> Option<TermSize> {
        self.get(session_id).map(|s| s.size())
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 事件转发任务
///
/// 按接收顺序转发；退出事件先移除同一实例的条目，
/// 仅当它是该 ID 的最新实例时才发送 `Closed`。被取代实例的输出也被丢弃。
async fn forward_events(
    sessions: Arc<SessionMap>,
    tracker: Arc<InstanceTracker>,
    mut session_rx: mpsc::Receiver<SessionEvent>,
    event_tx: mpsc::Sender<RegistryEvent>,
) {
    while let Some(event) = session_rx.recv().await {
        let event = match event {
            SessionEvent::Data {
                session_id,
                instance,
                data,
            } => {
                if !tracker.is_latest(&session_id, instance) {
                    continue;
                }
                RegistryEvent::Data { session_id, data }
            }
            SessionEvent::Exited {
                session_id,
                instance,
                exit,
            } => {
                let removed = sessions
                    .remove_if(&session_id, |_, slot| slot.instance() == instance)
                    .is_some();
                let latest = tracker.reaped(&session_id, instance);
                tracing::info!(
                    "[会话注册表] 会话 {} 已退出, instance={}, exit_code={:?}, removed={}",
                    session_id,
                    instance,
                    exit.exit_code,
                    removed
                );
                if !latest {
                    tracing::debug!("[会话注册表] 旧实例退出，不发送关闭事件: {}", session_id);
                    continue;
                }
                RegistryEvent::Closed { session_id }
            }
        };

        if event_tx.send(event).await.is_err() {
            tracing::trace!("[会话注册表] 订阅者已断开，丢弃事件");
        }
    }

    tracing::debug!("[会话注册表] 事件转发任务结束");
}
