//! 整页翻译编排
//!
//! 一次翻译过程：`Idle → Collecting → Dispatching → Applying → (DownloadPending | Done) → Idle`。
//! 写 DOM 期间打开变更闸门，让自动翻译的观察者推迟而不是丢弃重入的触发。

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::join_all;
use markup5ever_rcdom::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::parsers::html::dom::is_attached;
use crate::parsers::html::LiveDocument;
use crate::translation::config::OverlayConfig;
use crate::translation::core::capability::{Availability, LanguagePair};
use crate::translation::core::gateway::{GatewayEvent, Translation, TranslationGateway};
use crate::translation::error::{helpers, TranslationResult};
use crate::translation::overlay::markers::introduces_content;
use crate::translation::overlay::{IndicatorMessage, OverlayEngine, OverlayState, StatusIndicator};
use crate::translation::pipeline::selector::{Fragment, FragmentMode, FragmentSelector};

/// 单次翻译过程的选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// 显示状态提示
    pub show_indicator: bool,
    /// 有待下载的模型时不启动轮询
    pub skip_polling: bool,
}

impl PassOptions {
    /// 用户触发
    pub fn interactive() -> Self {
        Self {
            show_indicator: true,
            skip_polling: false,
        }
    }

    /// 页面变化触发的低优先级补翻
    pub fn background() -> Self {
        Self {
            show_indicator: false,
            skip_polling: true,
        }
    }

    /// 模型就绪后的重跑
    pub fn follow_up() -> Self {
        Self {
            show_indicator: true,
            skip_polling: true,
        }
    }
}

impl Default for PassOptions {
    fn default() -> Self {
        Self::interactive()
    }
}

/// 过程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Collecting,
    Dispatching,
    Applying,
    DownloadPending,
    Done,
}

/// 过程结果统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub selected: usize,
    pub applied: usize,
    /// 行内目标上被丢弃的占位文本
    pub skipped_placeholders: usize,
    pub failed: usize,
    pub download_pending: bool,
    /// 等待模型下载的语言对
    pub pending_pairs: BTreeSet<LanguagePair>,
    /// 过程中观察到页面自身的变更，已安排补翻
    pub deferred: bool,
    pub outcome: PassPhase,
}

impl Default for PassReport {
    fn default() -> Self {
        Self {
            selected: 0,
            applied: 0,
            skipped_placeholders: 0,
            failed: 0,
            download_pending: false,
            pending_pairs: BTreeSet::new(),
            deferred: false,
            outcome: PassPhase::Idle,
        }
    }
}

/// 变更闸门
///
/// `suppressed` 恰好在编排过程写 DOM 期间为真；期间观察到的变更只记为 `deferred`
#[derive(Debug, Default)]
pub struct MutationGate {
    suppressed: Cell<bool>,
    deferred: Cell<bool>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开闸门，守卫释放时恢复到打开前的状态
    pub fn suppress(&self) -> SuppressGuard<'_> {
        let previous = self.suppressed.replace(true);
        SuppressGuard { gate: self, previous }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.get()
    }

    pub fn defer(&self) {
        self.deferred.set(true);
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred.get()
    }

    /// 取出并清除推迟标记
    pub fn take_deferred(&self) -> bool {
        self.deferred.replace(false)
    }
}

pub struct SuppressGuard<'a> {
    gate: &'a MutationGate,
    previous: bool,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.gate.suppressed.set(self.previous);
    }
}

/// 轮询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    Unavailable(LanguagePair),
    TimedOut,
}

/// 模型可用性轮询
#[derive(Debug, Clone)]
pub struct AvailabilityPoll {
    pairs: Vec<LanguagePair>,
    interval: Duration,
    max_attempts: usize,
}

impl AvailabilityPoll {
    pub fn new(pairs: impl IntoIterator<Item = LanguagePair>, config: &OverlayConfig) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
            interval: config.poll_interval(),
            max_attempts: config.poll_max_attempts,
        }
    }

    pub async fn run(&self, gateway: &TranslationGateway) -> PollOutcome {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            let states = join_all(self.pairs.iter().map(|pair| gateway.check_availability(pair))).await;
            if let Some((pair, _)) = self
                .pairs
                .iter()
                .zip(states.iter())
                .find(|(_, state)| **state == Availability::Unavailable)
            {
                return PollOutcome::Unavailable(pair.clone());
            }
            if states.iter().all(|state| *state == Availability::Available) {
                tracing::info!("第 {} 次轮询：模型全部就绪", attempt);
                return PollOutcome::Ready;
            }
            tracing::debug!("第 {}/{} 次轮询：模型仍在下载", attempt, self.max_attempts);
        }
        PollOutcome::TimedOut
    }
}

/// 任务被丢弃时中止
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

type PassScheduler = Rc<dyn Fn(PassOptions)>;

/// 翻译编排器
pub struct TranslationOrchestrator {
    document: Rc<LiveDocument>,
    gateway: Rc<TranslationGateway>,
    engine: OverlayEngine,
    selector: FragmentSelector,
    indicator: Rc<StatusIndicator>,
    gate: Rc<MutationGate>,
    config: OverlayConfig,
    phase: Cell<PassPhase>,
    poll: RefCell<Option<AbortOnDrop>>,
    downloads: RefCell<Option<AbortOnDrop>>,
    /// 译文仍是下载占位的语言对
    awaiting_download: RefCell<BTreeSet<LanguagePair>>,
    last_target: RefCell<String>,
    scheduler: RefCell<Option<PassScheduler>>,
}

impl TranslationOrchestrator {
    pub fn new(
        document: Rc<LiveDocument>,
        gateway: Rc<TranslationGateway>,
        config: OverlayConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            engine: OverlayEngine::new(document.clone()),
            selector: FragmentSelector::new(&config),
            indicator: Rc::new(StatusIndicator::new(
                document.clone(),
                config.error_banner_duration(),
            )),
            gate: Rc::new(MutationGate::new()),
            phase: Cell::new(PassPhase::Idle),
            poll: RefCell::new(None),
            downloads: RefCell::new(None),
            awaiting_download: RefCell::new(BTreeSet::new()),
            last_target: RefCell::new(config.default_read_lang.clone()),
            scheduler: RefCell::new(None),
            document,
            gateway,
            config,
        })
    }

    pub fn document(&self) -> &Rc<LiveDocument> {
        &self.document
    }

    pub fn gateway(&self) -> &Rc<TranslationGateway> {
        &self.gateway
    }

    pub fn engine(&self) -> &OverlayEngine {
        &self.engine
    }

    pub fn indicator(&self) -> &StatusIndicator {
        &self.indicator
    }

    pub fn gate(&self) -> &Rc<MutationGate> {
        &self.gate
    }

    pub fn phase(&self) -> PassPhase {
        self.phase.get()
    }

    pub fn is_polling(&self) -> bool {
        self.poll
            .borrow()
            .as_ref()
            .is_some_and(|task| !task.0.is_finished())
    }

    /// 设置补翻 / 重跑的调度方式（通常是全局任务队列）
    pub fn set_scheduler(&self, scheduler: impl Fn(PassOptions) + 'static) {
        *self.scheduler.borrow_mut() = Some(Rc::new(scheduler));
    }

    /// 翻译整页
    pub async fn run_pass(
        self: &Rc<Self>,
        target_lang: &str,
        options: PassOptions,
    ) -> TranslationResult<PassReport> {
        let result = self.execute_pass(target_lang, options).await;
        self.phase.set(PassPhase::Idle);

        match result {
            Ok(mut report) => {
                if self.gate.take_deferred() {
                    tracing::debug!("过程中有页面变更被推迟，安排补翻");
                    report.deferred = true;
                    self.schedule(target_lang, PassOptions::background());
                }
                Ok(report)
            }
            Err(e) => {
                helpers::log_error(&e);
                self.indicator.flash_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn execute_pass(
        self: &Rc<Self>,
        target_lang: &str,
        options: PassOptions,
    ) -> TranslationResult<PassReport> {
        let _suppressed = self.gate.suppress();
        let mut report = PassReport::default();
        self.listen_for_downloads(target_lang);

        if options.show_indicator {
            self.indicator.show(IndicatorMessage::Translating);
        }

        self.phase.set(PassPhase::Collecting);
        self.engine.prune_backups();
        let root = self
            .document
            .body()
            .ok_or_else(|| helpers::dom_error("页面没有 body"))?;
        let fragments = self.selector.select(&self.document, &root);
        report.selected = fragments.len();

        self.phase.set(PassPhase::Dispatching);
        let translations = join_all(
            fragments
                .iter()
                .map(|fragment| self.gateway.translate_detailed(&fragment.original_text, target_lang)),
        )
        .await;

        self.phase.set(PassPhase::Applying);
        self.absorb_foreign_records();
        for (fragment, translation) in fragments.iter().zip(translations) {
            let Some(translation) = translation else {
                continue;
            };
            self.apply_translation(fragment, &translation, &mut report);
        }
        self.discard_own_records();
        self.awaiting_download
            .borrow_mut()
            .extend(report.pending_pairs.iter().cloned());

        if report.download_pending {
            self.phase.set(PassPhase::DownloadPending);
            report.outcome = PassPhase::DownloadPending;
            if options.show_indicator {
                self.indicator.show(IndicatorMessage::Downloading { percent: None });
                if !options.skip_polling {
                    self.start_poll(report.pending_pairs.iter().cloned().collect(), target_lang);
                }
            }
        } else {
            self.phase.set(PassPhase::Done);
            report.outcome = PassPhase::Done;
            if options.show_indicator {
                self.indicator.hide();
            }
        }
        self.discard_own_records();

        tracing::info!(
            "翻译过程完成: 选中 {}，写入 {}，跳过 {}，失败 {}，待下载 {}",
            report.selected,
            report.applied,
            report.skipped_placeholders,
            report.failed,
            report.download_pending
        );
        Ok(report)
    }

    fn apply_translation(&self, fragment: &Fragment, translation: &Translation, report: &mut PassReport) {
        if translation.is_download_pending() {
            report.download_pending = true;
            report.pending_pairs.insert(translation.pair());
            return;
        }
        // 行内导航文本不写入占位文本
        if fragment.mode == FragmentMode::Inline && !translation.is_real() {
            report.skipped_placeholders += 1;
            return;
        }
        if !is_attached(&fragment.element) {
            tracing::debug!("片段已被页面移除，跳过");
            return;
        }
        match self.engine.apply(fragment, &translation.text) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!("写入译文失败: {}", e);
                report.failed += 1;
            }
        }
    }

    /// 按当前目标语言重新翻译所有已翻译元素
    pub async fn update_existing(self: &Rc<Self>, target_lang: &str) -> TranslationResult<PassReport> {
        let _suppressed = self.gate.suppress();
        let mut report = PassReport::default();
        self.listen_for_downloads(target_lang);

        let elements: Vec<(Handle, OverlayState)> = self
            .engine
            .translated_elements(self.document.document())
            .into_iter()
            .filter(|(_, state)| state.backup().is_some_and(|b| !b.trim().is_empty()))
            .collect();
        report.selected = elements.len();

        let translations = join_all(elements.iter().map(|(_, state)| {
            let backup = state.backup().unwrap_or_default().trim();
            self.gateway.translate_detailed(backup, target_lang)
        }))
        .await;

        self.absorb_foreign_records();
        for ((element, state), translation) in elements.iter().zip(translations) {
            let Some(translation) = translation else {
                continue;
            };
            if translation.is_download_pending() {
                report.download_pending = true;
                report.pending_pairs.insert(translation.pair());
                continue;
            }
            let result = match state {
                OverlayState::BlockTranslated { .. } => self.engine.update_block(element, &translation.text),
                OverlayState::InlineTranslated { .. } if translation.is_real() => {
                    self.engine.update_inline(element, &translation.text)
                }
                _ => {
                    report.skipped_placeholders += 1;
                    continue;
                }
            };
            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    tracing::warn!("更新译文失败: {}", e);
                    report.failed += 1;
                }
            }
        }
        self.discard_own_records();
        self.awaiting_download
            .borrow_mut()
            .extend(report.pending_pairs.iter().cloned());

        report.outcome = if report.download_pending {
            PassPhase::DownloadPending
        } else {
            PassPhase::Done
        };
        tracing::info!("已更新 {} 处译文 → {}", report.applied, target_lang);

        drop(_suppressed);
        if self.gate.take_deferred() {
            report.deferred = true;
            self.schedule(target_lang, PassOptions::background());
        }
        Ok(report)
    }

    /// 还原整页，同时停止轮询并收起提示
    pub fn revert(&self) -> crate::translation::overlay::RevertReport {
        let _suppressed = self.gate.suppress();
        self.cancel_poll();
        self.awaiting_download.borrow_mut().clear();
        self.absorb_foreign_records();
        let report = self.engine.revert_all(self.document.document());
        self.indicator.hide();
        self.discard_own_records();
        report
    }

    /// 导航后清理瞬时界面状态
    pub fn reset_ui(&self) {
        self.cancel_poll();
        self.awaiting_download.borrow_mut().clear();
        let _suppressed = self.gate.suppress();
        self.indicator.hide();
        self.discard_own_records();
    }

    pub fn cancel_poll(&self) {
        if self.poll.borrow_mut().take().is_some() {
            tracing::debug!("停止模型可用性轮询");
        }
    }

    fn start_poll(self: &Rc<Self>, pairs: Vec<LanguagePair>, target_lang: &str) {
        self.cancel_poll();
        if pairs.is_empty() {
            return;
        }

        tracing::info!("开始轮询模型可用性: {} 个语言对", pairs.len());
        let poll = AvailabilityPoll::new(pairs, &self.config);
        let this: Weak<Self> = Rc::downgrade(self);
        let target = target_lang.to_string();

        let task = tokio::task::spawn_local(async move {
            let outcome = match this.upgrade() {
                Some(orchestrator) => {
                    let gateway = orchestrator.gateway.clone();
                    drop(orchestrator);
                    poll.run(&gateway).await
                }
                None => return,
            };

            let Some(orchestrator) = this.upgrade() else {
                return;
            };
            match outcome {
                PollOutcome::Ready => {
                    orchestrator.schedule(&target, PassOptions::follow_up());
                }
                PollOutcome::Unavailable(pair) => {
                    tracing::warn!("轮询期间语言对变为不可用: {}", pair);
                    orchestrator.indicator.flash(IndicatorMessage::Unavailable);
                }
                PollOutcome::TimedOut => {
                    tracing::warn!("模型下载轮询超时");
                    orchestrator.indicator.flash(IndicatorMessage::DownloadTimeout);
                }
            }
        });
        *self.poll.borrow_mut() = Some(AbortOnDrop(task));
    }

    /// 持续接收网关的下载事件：进度写到提示上，模型就绪后补翻
    fn listen_for_downloads(self: &Rc<Self>, target_lang: &str) {
        *self.last_target.borrow_mut() = target_lang.to_string();
        if self.downloads.borrow().is_some() {
            return;
        }

        let mut events = self.gateway.subscribe();
        let this = Rc::downgrade(self);
        let task = tokio::task::spawn_local(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::trace!("下载事件积压，跳过 {} 条", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(orchestrator) = this.upgrade() else {
                    break;
                };
                orchestrator.on_gateway_event(event);
            }
        });
        *self.downloads.borrow_mut() = Some(AbortOnDrop(task));
    }

    fn on_gateway_event(self: &Rc<Self>, event: GatewayEvent) {
        match event {
            GatewayEvent::DownloadProgress { percent, .. } => {
                if matches!(self.indicator.message(), Some(IndicatorMessage::Downloading { .. })) {
                    self.indicator.show(IndicatorMessage::Downloading { percent: Some(percent) });
                }
            }
            GatewayEvent::DownloadReady { pair, late_translation } => {
                if !self.awaiting_download.borrow_mut().remove(&pair) {
                    return;
                }
                if self.is_polling() {
                    tracing::debug!("模型就绪，由轮询安排补翻: {}", pair);
                    return;
                }
                if let Some(late) = &late_translation {
                    tracing::debug!("下载后补做的译文已缓存: {}", late.original);
                }
                tracing::info!("模型就绪，补翻待下载的片段: {}", pair);
                let target = self.last_target.borrow().clone();
                self.schedule(&target, PassOptions::background());
            }
            GatewayEvent::DownloadFailed { pair, error } => {
                if self.awaiting_download.borrow_mut().remove(&pair) {
                    tracing::warn!("模型下载失败 {}: {}", pair, error);
                }
            }
        }
    }

    fn schedule(self: &Rc<Self>, target_lang: &str, options: PassOptions) {
        let scheduler = self.scheduler.borrow().clone();
        match scheduler {
            Some(scheduler) => scheduler(options),
            None => {
                let this = self.clone();
                let target = target_lang.to_string();
                tokio::task::spawn_local(async move {
                    if let Err(e) = this.run_pass(&target, options).await {
                        tracing::warn!("补翻失败: {}", e);
                    }
                });
            }
        }
    }

    /// 写入前取走积压的变更记录，页面自身的变更记为推迟
    fn absorb_foreign_records(&self) {
        if self.document.take_records().iter().any(introduces_content) {
            self.gate.defer();
        }
    }

    /// 写入后丢弃记录：两次取走之间没有挂起点，记录全部来自本过程
    fn discard_own_records(&self) {
        let own = self.document.take_records();
        if !own.is_empty() {
            tracing::trace!("丢弃自身变更记录 {} 条", own.len());
        }
    }
}
