//! 终端服务
//!
//! 连接前端命令、会话注册表和建议引擎的中枢：
//! - 命令路由到注册表和引擎
//! - 会话输出写入输出尾部缓存并转发给前端
//! - 建议变化转发给前端
//! - 显式预测请求在独立任务中执行

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use aixterm_core::{PredictionKind, PredictionResponse, TermSize};
use aixterm_infra::Predictor;

use super::protocol::{decode_input, BridgeCommand, BridgeEvent};
use crate::config::AppConfig;
use crate::suggestion::{
    ContextSource, KeyOutcome, StaticMatcher, SuggestionEngine, SuggestionSettings,
    SuggestionUpdate,
};
use crate::terminal::{OutputTail, RegistryEvent, SessionRegistry, SpawnOptions};

/// 关闭时等待所有进程回收的上限
///
/// 覆盖强制终止的宽限期和残余输出的排空时间。
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 服务内部事件来源
pub struct ServiceChannels {
    registry_rx: mpsc::Receiver<RegistryEvent>,
    suggestion_rx: mpsc::UnboundedReceiver<SuggestionUpdate>,
}

pub struct TerminalService {
    registry: SessionRegistry,
    engine: SuggestionEngine,
    tail: Arc<OutputTail>,
    predictor: Arc<dyn Predictor>,
    context_lines: usize,
    events: mpsc::Sender<BridgeEvent>,
}

impl TerminalService {
    /// 按配置创建服务，必须在 tokio 运行时内调用
    pub fn new(
        config: &AppConfig,
        predictor: Arc<dyn Predictor>,
        events: mpsc::Sender<BridgeEvent>,
    ) -> (Self, ServiceChannels) {
        Self::with_parts(
            SpawnOptions::from_config(&config.terminal),
            SuggestionSettings::from_config(&config.suggestion),
            StaticMatcher::new(config.suggestion.commands.clone()),
            predictor,
            events,
        )
    }

    pub fn with_parts(
        spawn_defaults: SpawnOptions,
        settings: SuggestionSettings,
        matcher: StaticMatcher,
        predictor: Arc<dyn Predictor>,
        events: mpsc::Sender<BridgeEvent>,
    ) -> (Self, ServiceChannels) {
        let tail = Arc::new(OutputTail::default());
        let (registry, registry_rx) = SessionRegistry::new(spawn_defaults);
        let context_lines = settings.context_lines;
        let (engine, suggestion_rx) =
            SuggestionEngine::new(settings, matcher, predictor.clone(), tail.clone());

        let service = Self {
            registry,
            engine,
            tail,
            predictor,
            context_lines,
            events,
        };
        let channels = ServiceChannels {
            registry_rx,
            suggestion_rx,
        };
        (service, channels)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// 主循环，直到收到 `Shutdown` 或命令通道关闭
    pub async fn run(self, channels: ServiceChannels, mut commands: mpsc::Receiver<BridgeCommand>) {
        let ServiceChannels {
            mut registry_rx,
            mut suggestion_rx,
        } = channels;

        tracing::info!("[终端服务] 开始处理命令");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::info!("[终端服务] 命令通道已关闭");
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = registry_rx.recv() => self.handle_registry_event(event).await,
                Some(update) = suggestion_rx.recv() => {
                    self.emit(BridgeEvent::Suggestion {
                        id: update.session_id,
                        input: update.input,
                        suggestion: update.suggestion,
                    })
                    .await;
                }
            }
        }

        self.registry.shutdown();
        self.drain_exits(&mut registry_rx).await;
        tracing::info!("[终端服务] 已停止");
    }

    /// 等待所有已终止的进程被回收，期间照常转发其输出和退出事件
    async fn drain_exits(&self, registry_rx: &mut mpsc::Receiver<RegistryEvent>) {
        let drain = async {
            while self.registry.pending_exits() > 0 {
                match registry_rx.recv().await {
                    Some(event) => self.handle_registry_event(event).await,
                    None => break,
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!(
                "[终端服务] 等待进程退出超时，剩余 {} 个",
                self.registry.pending_exits()
            );
        }
    }

    /// 处理单条命令
    ///
    /// # 返回
    /// 收到 `Shutdown` 时返回 `false`
    pub async fn handle_command(&self, command: BridgeCommand) -> bool {
        match command {
            BridgeCommand::Spawn { id, cols, rows } => self.spawn(id, cols, rows).await,
            BridgeCommand::Keystroke { id, data } => self.keystroke(&id, &data),
            BridgeCommand::KeystrokeBytes { id, data } => match decode_input(&data) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => self.keystroke(&id, &text),
                    Err(e) => {
                        // 非文本输入无法跟踪，输入行状态作废
                        self.engine.dismiss(&id);
                        self.registry.write(&id, e.as_bytes());
                    }
                },
                Err(e) => tracing::warn!("[终端服务] 无法解码按键字节: id={}, error={}", id, e),
            },
            BridgeCommand::Resize { id, cols, rows } => self.registry.resize(&id, cols, rows),
            BridgeCommand::Kill { id } => self.registry.kill(&id),
            BridgeCommand::Predict {
                request_id,
                kind,
                prompt,
                context,
            } => self.predict(request_id, &kind, prompt, context),
            BridgeCommand::Focus { id } => {
                if !self.engine.focus(&id) {
                    tracing::debug!("[终端服务] 忽略未知终端的焦点切换: {}", id);
                }
            }
            BridgeCommand::Dismiss { id } => self.engine.dismiss(&id),
            BridgeCommand::Shutdown => {
                tracing::info!("[终端服务] 收到关闭命令");
                return false;
            }
        }
        true
    }

    fn keystroke(&self, id: &str, data: &str) {
        match self.engine.handle_input(id, data) {
            KeyOutcome::PassThrough => self.registry.write(id, data.as_bytes()),
            KeyOutcome::Accepted { suffix } => self.registry.write(id, suffix.as_bytes()),
        }
    }

    async fn spawn(&self, id: Option<String>, cols: Option<u16>, rows: Option<u16>) {
        let defaults = self.registry.defaults().size;
        let size = TermSize::new(cols.unwrap_or(defaults.cols), rows.unwrap_or(defaults.rows));

        let requested = id.clone().unwrap_or_default();
        let result = match id {
            Some(id) => self.registry.spawn_with_size(&id, size).map(|_| id),
            None => self.registry.spawn_generated(size),
        };

        match result {
            Ok(id) => {
                self.engine.open_line(&id);
                self.engine.focus(&id);
                self.emit(BridgeEvent::Spawned { id }).await;
            }
            Err(e) => {
                tracing::error!("[终端服务] 启动终端失败: {}", e);
                self.emit(BridgeEvent::SpawnFailed {
                    id: requested,
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    fn predict(&self, request_id: String, kind: &str, prompt: String, context: Option<String>) {
        let kind = PredictionKind::parse_lossy(kind);
        let context = context.unwrap_or_else(|| {
            self.engine
                .active_line()
                .map(|id| self.tail.context(&id, self.context_lines))
                .unwrap_or_default()
        });
        let predictor = self.predictor.clone();
        let events = self.events.clone();

        tracing::debug!("[终端服务] 预测请求: request_id={}, kind={}", request_id, kind);

        tokio::spawn(async move {
            let result = predictor.predict(kind, &prompt, &context).await;
            if let Err(e) = &result {
                tracing::warn!("[终端服务] 预测失败: request_id={}, error={}", request_id, e);
            }
            let event = BridgeEvent::PredictionResult {
                request_id,
                response: PredictionResponse::from(result),
            };
            if events.send(event).await.is_err() {
                tracing::trace!("[终端服务] 前端已断开，丢弃预测结果");
            }
        });
    }

    async fn handle_registry_event(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::Data { session_id, data } => {
                self.tail.record(&session_id, &data);
                self.emit(BridgeEvent::output(&session_id, &data)).await;
            }
            RegistryEvent::Closed { session_id } => {
                self.engine.close_line(&session_id);
                self.tail.remove(&session_id);
                self.emit(BridgeEvent::Exit { id: session_id }).await;
            }
        }
    }

    async fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).await.is_err() {
            tracing::trace!("[终端服务] 前端已断开，丢弃事件");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use aixterm_infra::PredictionError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::task::JoinHandle;

    const WAIT: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct RecordingPredictor {
        calls: Mutex<Vec<(PredictionKind, String, String)>>,
    }

    #[async_trait]
    impl Predictor for RecordingPredictor {
        async fn predict(
            &self,
            kind: PredictionKind,
            prompt: &str,
            context: &str,
        ) -> Result<String, PredictionError> {
            self.calls
                .lock()
                .push((kind, prompt.to_string(), context.to_string()));
            if prompt == "fail" {
                return Err(PredictionError::Api {
                    status: 500,
                    body: "model not loaded".to_string(),
                });
            }
            Ok(format!("answer for {}", prompt))
        }
    }

    struct Harness {
        commands: mpsc::Sender<BridgeCommand>,
        events: mpsc::Receiver<BridgeEvent>,
        predictor: Arc<RecordingPredictor>,
        handle: JoinHandle<()>,
    }

    impl Harness {
        fn start(spawn_defaults: SpawnOptions) -> Self {
            let predictor = Arc::new(RecordingPredictor::default());
            let (event_tx, events) = mpsc::channel(64);
            let (commands, command_rx) = mpsc::channel(64);
            let (service, channels) = TerminalService::with_parts(
                spawn_defaults,
                SuggestionSettings::default(),
                StaticMatcher::new(vec!["git commit -m \"".to_string()]),
                predictor.clone(),
                event_tx,
            );
            let handle = tokio::spawn(service.run(channels, command_rx));
            Self {
                commands,
                events,
                predictor,
                handle,
            }
        }

        async fn send(&self, command: BridgeCommand) {
            self.commands.send(command).await.unwrap();
        }

        async fn keystroke(&self, id: &str, data: &str) {
            self.send(BridgeCommand::Keystroke {
                id: id.to_string(),
                data: data.to_string(),
            })
            .await;
        }

        async fn next(&mut self) -> BridgeEvent {
            tokio::time::timeout(WAIT, self.events.recv())
                .await
                .expect("等待事件超时")
                .expect("事件通道已关闭")
        }

        /// 跳过其他事件，直到 `pred` 命中
        async fn wait_for(&mut self, pred: impl Fn(&BridgeEvent) -> bool) -> BridgeEvent {
            loop {
                let event = self.next().await;
                if pred(&event) {
                    return event;
                }
            }
        }

        /// 累积终端输出直到包含 `needle`
        async fn wait_for_output(&mut self, id: &str, needle: &str) -> String {
            let mut output = Vec::new();
            loop {
                let event = self.next().await;
                if let BridgeEvent::Output { id: event_id, .. } = &event {
                    if event_id == id {
                        output.extend(event.output_bytes().unwrap());
                        let text = String::from_utf8_lossy(&output).to_string();
                        if text.contains(needle) {
                            return text;
                        }
                    }
                }
            }
        }
    }

    fn echo_shell() -> SpawnOptions {
        SpawnOptions::command("/bin/sh", &["-c", "stty raw -echo; printf READY; exec cat"])
    }

    fn spawn_cmd(id: &str) -> BridgeCommand {
        BridgeCommand::Spawn {
            id: Some(id.to_string()),
            cols: None,
            rows: None,
        }
    }

    #[tokio::test]
    async fn test_spawn_keystroke_kill_flow() {
        let mut harness = Harness::start(echo_shell());

        harness.send(spawn_cmd("t1")).await;
        assert_eq!(
            harness.next().await,
            BridgeEvent::Spawned {
                id: "t1".to_string()
            }
        );
        harness.wait_for_output("t1", "READY").await;

        harness.keystroke("t1", "hello").await;
        harness.wait_for_output("t1", "hello").await;

        harness
            .send(BridgeCommand::Kill {
                id: "t1".to_string(),
            })
            .await;
        let exit = harness
            .wait_for(|e| matches!(e, BridgeEvent::Exit { .. }))
            .await;
        assert_eq!(
            exit,
            BridgeEvent::Exit {
                id: "t1".to_string()
            }
        );

        harness.send(BridgeCommand::Shutdown).await;
        tokio::time::timeout(WAIT, harness.handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_reported() {
        let mut harness = Harness::start(SpawnOptions::command("/nonexistent/aixterm-shell", &[]));

        harness.send(spawn_cmd("bad")).await;
        match harness.next().await {
            BridgeEvent::SpawnFailed { id, error } => {
                assert_eq!(id, "bad");
                assert!(error.starts_with("PTY 创建失败"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_without_id_generates_one() {
        let mut harness = Harness::start(echo_shell());
        harness
            .send(BridgeCommand::Spawn {
                id: None,
                cols: Some(100),
                rows: Some(25),
            })
            .await;
        match harness.next().await {
            BridgeEvent::Spawned { id } => assert!(!id.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accepted_suggestion_is_typed_into_session() {
        let mut harness = Harness::start(echo_shell());
        harness.send(spawn_cmd("t1")).await;
        harness.wait_for_output("t1", "READY").await;

        harness.keystroke("t1", "g").await;
        harness.keystroke("t1", "i").await;
        let suggestion = harness
            .wait_for(|e| matches!(e, BridgeEvent::Suggestion { .. }))
            .await;
        assert_eq!(
            suggestion,
            BridgeEvent::Suggestion {
                id: "t1".to_string(),
                input: "gi".to_string(),
                suggestion: "git commit -m \"".to_string(),
            }
        );

        harness.keystroke("t1", "\t").await;
        let echoed = harness.wait_for_output("t1", "\"").await;
        // 只写入后缀，不写入 Tab 本身
        assert!(echoed.ends_with("t commit -m \""), "{:?}", echoed);
        assert!(!echoed.contains('\t'));
    }

    #[tokio::test]
    async fn test_explicit_predict_success_and_failure() {
        let mut harness = Harness::start(echo_shell());

        harness
            .send(BridgeCommand::Predict {
                request_id: "r1".to_string(),
                kind: "summarize".to_string(),
                prompt: "list files".to_string(),
                context: Some("ctx".to_string()),
            })
            .await;
        let result = harness.next().await;
        assert_eq!(
            result,
            BridgeEvent::PredictionResult {
                request_id: "r1".to_string(),
                response: PredictionResponse::ok("answer for list files"),
            }
        );
        assert_eq!(
            harness.predictor.calls.lock()[0],
            (
                PredictionKind::Generic,
                "list files".to_string(),
                "ctx".to_string()
            )
        );

        harness
            .send(BridgeCommand::Predict {
                request_id: "r2".to_string(),
                kind: "explanation".to_string(),
                prompt: "fail".to_string(),
                context: None,
            })
            .await;
        match harness.next().await {
            BridgeEvent::PredictionResult {
                request_id,
                response,
            } => {
                assert_eq!(request_id, "r2");
                assert!(!response.success);
                assert_eq!(
                    response.error.as_deref(),
                    Some("预测服务错误 500: model not loaded")
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    /// 通过 shell 内建命令检查进程是否仍然存在
    fn process_alive(pid: &str) -> bool {
        std::process::Command::new("/bin/sh")
            .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
            .status()
            .map_or(false, |s| s.success())
    }

    #[tokio::test]
    async fn test_keystroke_bytes_reach_session_unchanged() {
        let mut harness = Harness::start(echo_shell());
        harness.send(spawn_cmd("t1")).await;
        harness.wait_for_output("t1", "READY").await;

        // 0xff 不是合法 UTF-8，只能以字节形式发送
        harness
            .send(BridgeCommand::KeystrokeBytes {
                id: "t1".to_string(),
                data: "/1o=".to_string(),
            })
            .await;
        let mut output = Vec::new();
        while !output.ends_with(b"\xffZ") {
            if let event @ BridgeEvent::Output { .. } = harness.next().await {
                output.extend(event.output_bytes().unwrap());
            }
        }

        // 合法 UTF-8 的字节输入与文本按键一样参与行编辑
        for data in ["Zw==", "aQ=="] {
            harness
                .send(BridgeCommand::KeystrokeBytes {
                    id: "t1".to_string(),
                    data: data.to_string(),
                })
                .await;
        }
        let suggestion = harness
            .wait_for(|e| matches!(e, BridgeEvent::Suggestion { .. }))
            .await;
        assert!(
            matches!(&suggestion, BridgeEvent::Suggestion { input, .. } if input == "gi"),
            "{:?}",
            suggestion
        );
    }

    #[tokio::test]
    async fn test_respawned_id_survives_old_instance_exit() {
        let mut harness = Harness::start(echo_shell());
        harness.send(spawn_cmd("t1")).await;
        harness.wait_for_output("t1", "READY").await;

        harness
            .send(BridgeCommand::Kill {
                id: "t1".to_string(),
            })
            .await;
        harness.send(spawn_cmd("t1")).await;

        // 旧实例的退出只可能出现在新会话启动之前
        loop {
            match harness.next().await {
                BridgeEvent::Spawned { id } if id == "t1" => break,
                BridgeEvent::Exit { id } if id == "t1" => {}
                _ => {}
            }
        }
        harness.wait_for_output("t1", "READY").await;

        let quiet = Duration::from_millis(800);
        let deadline = tokio::time::Instant::now() + quiet;
        while let Ok(Some(event)) =
            tokio::time::timeout_at(deadline, harness.events.recv()).await
        {
            assert!(
                !matches!(event, BridgeEvent::Exit { .. }),
                "新会话不应收到退出事件"
            );
        }

        harness.keystroke("t1", "again").await;
        harness.wait_for_output("t1", "again").await;
    }

    #[tokio::test]
    async fn test_shutdown_reaps_sessions_ignoring_hangup() {
        let mut harness = Harness::start(SpawnOptions::command(
            "/bin/sh",
            &["-c", "trap '' HUP; echo PID=$$; while :; do sleep 1; done"],
        ));
        harness.send(spawn_cmd("stubborn")).await;
        let text = harness.wait_for_output("stubborn", "\n").await;
        let pid = text
            .split("PID=")
            .nth(1)
            .map(|rest| rest.trim().to_string())
            .unwrap();
        assert!(process_alive(&pid));

        harness.send(BridgeCommand::Shutdown).await;
        harness
            .wait_for(|e| matches!(e, BridgeEvent::Exit { id } if id == "stubborn"))
            .await;
        tokio::time::timeout(WAIT, harness.handle).await.unwrap().unwrap();
        assert!(!process_alive(&pid), "进程 {} 未被回收", pid);
    }

    #[tokio::test]
    async fn test_closed_command_channel_stops_service() {
        let harness = Harness::start(echo_shell());
        drop(harness.commands);
        tokio::time::timeout(WAIT, harness.handle).await.unwrap().unwrap();
    }
}
