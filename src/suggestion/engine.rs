//! 建议引擎
//!
//! 为每个终端维护一条输入行，按键驱动：
//! 1. 输入短于最小长度时清空建议
//! 2. 静态语料命中时同步给出建议
//! 3. 否则在停止输入一段时间后发起一次远程预测
//!
//! 远程预测与后续编辑并发进行，返回时若代数已变化则丢弃结果。
//! 同一时刻只有一条活动输入行，非活动行的按键不进入回显模型。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use aixterm_core::PredictionKind;
use aixterm_infra::Predictor;

use super::input_line::{InputLineState, KeyInput};
use super::static_match::StaticMatcher;
use crate::config::SuggestionConfig;
use crate::terminal::OutputTail;

/// 预测上下文来源
pub trait ContextSource: Send + Sync {
    /// 会话最近 `lines` 行输出
    fn context(&self, session_id: &str, lines: usize) -> String;
}

impl ContextSource for OutputTail {
    fn context(&self, session_id: &str, lines: usize) -> String {
        self.recent_lines(session_id, lines)
    }
}

/// 引擎参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionSettings {
    pub min_input_len: usize,
    pub debounce: Duration,
    pub context_lines: usize,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self::from_config(&SuggestionConfig::default())
    }
}

impl SuggestionSettings {
    pub fn from_config(config: &SuggestionConfig) -> Self {
        Self {
            min_input_len: config.min_input_len,
            debounce: Duration::from_millis(config.debounce_ms),
            context_lines: config.context_lines,
        }
    }
}

/// 显示中的建议发生变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionUpdate {
    pub session_id: String,
    pub input: String,
    /// 完整建议命令，空串表示清除
    pub suggestion: String,
}

/// 按键处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// 原样写入终端
    PassThrough,
    /// 建议被接受，写入后缀代替原按键
    Accepted { suffix: String },
}

struct LineSlot {
    /// 打开时分配，区分关闭后重新打开的同名行
    epoch: u64,
    state: InputLineState,
    debounce: Option<CancellationToken>,
}

impl LineSlot {
    fn cancel_debounce(&mut self) {
        if let Some(token) = self.debounce.take() {
            token.cancel();
        }
    }
}

#[derive(Default)]
struct Lines {
    slots: HashMap<String, LineSlot>,
    active: Option<String>,
}

struct EngineInner {
    lines: Mutex<Lines>,
    matcher: StaticMatcher,
    predictor: Arc<dyn Predictor>,
    context: Arc<dyn ContextSource>,
    settings: SuggestionSettings,
    updates: mpsc::UnboundedSender<SuggestionUpdate>,
    next_epoch: AtomicU64,
}

/// 建议引擎
#[derive(Clone)]
pub struct SuggestionEngine {
    inner: Arc<EngineInner>,
}

impl SuggestionEngine {
    /// 创建引擎
    ///
    /// # 返回
    /// 引擎及建议变化的接收端
    pub fn new(
        settings: SuggestionSettings,
        matcher: StaticMatcher,
        predictor: Arc<dyn Predictor>,
        context: Arc<dyn ContextSource>,
    ) -> (Self, mpsc::UnboundedReceiver<SuggestionUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        tracing::info!(
            "[建议引擎] 已初始化, commands={}, debounce={:?}",
            matcher.len(),
            settings.debounce
        );
        let inner = EngineInner {
            lines: Mutex::new(Lines::default()),
            matcher,
            predictor,
            context,
            settings,
            updates,
            next_epoch: AtomicU64::new(1),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            updates_rx,
        )
    }

    /// 为终端创建输入行，已存在时不变
    pub fn open_line(&self, session_id: &str) {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lines
            .lock()
            .slots
            .entry(session_id.to_string())
            .or_insert_with(|| LineSlot {
                epoch,
                state: InputLineState::new(),
                debounce: None,
            });
    }

    /// 销毁终端的输入行
    pub fn close_line(&self, session_id: &str) {
        let mut lines = self.inner.lines.lock();
        if let Some(mut slot) = lines.slots.remove(session_id) {
            slot.cancel_debounce();
        }
        if lines.active.as_deref() == Some(session_id) {
            lines.active = None;
        }
    }

    /// 切换活动输入行，之前的活动行被取消
    ///
    /// # 返回
    /// 目标行不存在时返回 `false`
    pub fn focus(&self, session_id: &str) -> bool {
        let mut lines = self.inner.lines.lock();
        if !lines.slots.contains_key(session_id) {
            return false;
        }
        let previous = lines.active.replace(session_id.to_string());
        if let Some(previous) = previous.filter(|p| p != session_id) {
            if let Some(slot) = lines.slots.get_mut(&previous) {
                self.inner.dismiss_slot(&previous, slot);
            }
        }
        true
    }

    pub fn active_line(&self) -> Option<String> {
        self.inner.lines.lock().active.clone()
    }

    /// 取消建议并清空输入
    pub fn dismiss(&self, session_id: &str) {
        let mut lines = self.inner.lines.lock();
        if let Some(slot) = lines.slots.get_mut(session_id) {
            self.inner.dismiss_slot(session_id, slot);
        }
    }

    /// 输入行快照
    pub fn line_state(&self, session_id: &str) -> Option<InputLineState> {
        self.inner
            .lines
            .lock()
            .slots
            .get(session_id)
            .map(|slot| slot.state.clone())
    }

    /// 处理一次按键
    ///
    /// 调用方根据返回值决定写入终端的内容。
    pub fn handle_input(&self, session_id: &str, data: &str) -> KeyOutcome {
        let mut guard = self.inner.lines.lock();
        let lines = &mut *guard;
        if lines.active.as_deref() != Some(session_id) {
            return KeyOutcome::PassThrough;
        }
        let Some(slot) = lines.slots.get_mut(session_id) else {
            return KeyOutcome::PassThrough;
        };

        let shown = slot.state.suffix().to_string();
        let outcome = match KeyInput::classify(data) {
            KeyInput::Accept => {
                slot.cancel_debounce();
                match slot.state.accept() {
                    Some(suffix) => {
                        tracing::debug!("[建议引擎] 接受建议: id={}", session_id);
                        KeyOutcome::Accepted { suffix }
                    }
                    None => KeyOutcome::PassThrough,
                }
            }
            KeyInput::Submit | KeyInput::Dismiss => {
                slot.cancel_debounce();
                slot.state.reset();
                KeyOutcome::PassThrough
            }
            KeyInput::Append(c) => {
                slot.state.push_char(c);
                self.after_edit(session_id, slot);
                KeyOutcome::PassThrough
            }
            KeyInput::Backspace => {
                slot.state.pop_char();
                self.after_edit(session_id, slot);
                KeyOutcome::PassThrough
            }
            KeyInput::Other => KeyOutcome::PassThrough,
        };

        self.inner.publish_if_changed(session_id, &shown, &slot.state);
        outcome
    }

    fn after_edit(&self, session_id: &str, slot: &mut LineSlot) {
        slot.cancel_debounce();

        if slot.state.input_len() < self.inner.settings.min_input_len {
            slot.state.clear_suggestion();
            return;
        }

        if let Some(command) = self.inner.matcher.find(slot.state.current_input()) {
            slot.state.set_suggestion(command);
            return;
        }

        self.schedule_prediction(session_id, slot);
    }

    /// 重建防抖定时器
    fn schedule_prediction(&self, session_id: &str, slot: &mut LineSlot) {
        let token = CancellationToken::new();
        slot.debounce = Some(token.clone());

        let inner = self.inner.clone();
        let session_id = session_id.to_string();
        let epoch = slot.epoch;
        let generation = slot.state.generation();
        let delay = self.inner.settings.debounce;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    inner.predict(session_id, epoch, generation).await;
                }
            }
        });
    }
}

impl EngineInner {
    fn dismiss_slot(&self, session_id: &str, slot: &mut LineSlot) {
        let shown = slot.state.suffix().to_string();
        slot.cancel_debounce();
        slot.state.reset();
        self.publish_if_changed(session_id, &shown, &slot.state);
    }

    fn publish_if_changed(&self, session_id: &str, shown: &str, state: &InputLineState) {
        if state.suffix() == shown {
            return;
        }
        let update = SuggestionUpdate {
            session_id: session_id.to_string(),
            input: state.current_input().to_string(),
            suggestion: state.suggestion().to_string(),
        };
        if self.updates.send(update).is_err() {
            tracing::trace!("[建议引擎] 订阅者已断开");
        }
    }

    /// 定时器触发后的远程预测
    async fn predict(&self, session_id: String, epoch: u64, generation: u64) {
        let input = {
            let mut lines = self.lines.lock();
            let Some(slot) = lines.slots.get_mut(&session_id) else {
                return;
            };
            // 取消与定时器同时完成时，以代数为准
            if slot.epoch != epoch || slot.state.generation() != generation {
                return;
            }
            slot.debounce = None;
            slot.state.current_input().to_string()
        };

        let context = self.context.context(&session_id, self.settings.context_lines);
        tracing::debug!(
            "[建议引擎] 发起预测: id={}, generation={}, input={:?}",
            session_id,
            generation,
            input
        );
        let result = self
            .predictor
            .predict(PredictionKind::Autocomplete, &input, &context)
            .await;

        let mut lines = self.lines.lock();
        let Some(slot) = lines.slots.get_mut(&session_id) else {
            return;
        };
        if slot.epoch != epoch || slot.state.generation() != generation {
            tracing::debug!("[建议引擎] 丢弃过期预测: id={}, input={:?}", session_id, input);
            return;
        }

        let shown = slot.state.suffix().to_string();
        match result {
            Ok(text) => {
                let suffix = completion_suffix(&input, &text);
                if suffix.is_empty() {
                    slot.state.clear_suggestion();
                } else {
                    slot.state.set_suggestion(format!("{}{}", input, suffix));
                }
            }
            Err(e) => {
                tracing::warn!("[建议引擎] 预测失败: id={}, error={}", session_id, e);
                slot.state.clear_suggestion();
            }
        }
        self.publish_if_changed(&session_id, &shown, &slot.state);
    }
}

/// 从预测响应中提取补全后缀
///
/// 只取第一行并去掉尾部空白；响应重复了整条命令时去掉已输入部分。
pub fn completion_suffix<'a>(input: &str, response: &'a str) -> &'a str {
    let line = response.lines().next().unwrap_or_default().trim_end();
    line.strip_prefix(input).unwrap_or(line)
}
