//! 自动翻译控制器
//!
//! `OverlayController` 持有一个页面会话的全部可变状态：开关、目标语言、任务队列、
//! 变更观察者与防抖计时器。生命周期是 `attach(document)` / `detach()`。
//!
//! 观察者收到的变更按下面的顺序处理：
//! 1. 编排过程正在写 DOM 时，只把页面自身的新内容记为推迟
//! 2. 全部来自注入节点的变更直接忽略
//! 3. 其余变更在防抖后排入一次低优先级补翻

pub mod messages;
pub mod queue;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::Handle;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::parsers::html::LiveDocument;
use crate::translation::config::constants::{
    KEY_TARGET_READ_LANG, KEY_TOGGLE_STATE, KEY_TOGGLE_STATE_BY_TAB,
};
use crate::translation::config::OverlayConfig;
use crate::translation::core::gateway::TranslationGateway;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::orchestrator::{PassOptions, PassReport, TranslationOrchestrator};
use crate::translation::overlay::markers::introduces_content;
use crate::translation::overlay::{PageTranslationStatus, RevertReport};
use crate::translation::smart_input::{KeyPress, SmartInput};
use crate::translation::storage::settings::{
    resolve_tab_enabled, target_read_lang, SettingChange, SettingsStore, ShellChannel,
};

pub use messages::{NavigationEvent, ShellMessage, ShellResponse};
pub use queue::TaskQueue;

/// 任务句柄，丢弃时中止
struct TaskSlot(RefCell<Option<JoinHandle<()>>>);

impl TaskSlot {
    fn new() -> Self {
        Self(RefCell::new(None))
    }

    fn replace(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.0.borrow_mut().replace(handle) {
            old.abort();
        }
    }

    fn cancel(&self) -> bool {
        match self.0.borrow_mut().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                was_running
            }
            None => false,
        }
    }

    fn is_running(&self) -> bool {
        self.0
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 一次 attach 的会话
struct Session {
    document: Rc<LiveDocument>,
    orchestrator: Rc<TranslationOrchestrator>,
    smart_input: SmartInput,
    queue: TaskQueue,
    observer: TaskSlot,
    debounce: TaskSlot,
    settle: TaskSlot,
    settings_listener: TaskSlot,
}

/// 页面覆盖层控制器
pub struct OverlayController {
    config: OverlayConfig,
    gateway: Rc<TranslationGateway>,
    settings: Rc<dyn SettingsStore>,
    shell: Option<Rc<dyn ShellChannel>>,
    tab_id: Option<String>,
    enabled: Cell<bool>,
    target_lang: RefCell<String>,
    session: RefCell<Option<Rc<Session>>>,
}

impl OverlayController {
    pub fn new(
        config: OverlayConfig,
        gateway: Rc<TranslationGateway>,
        settings: Rc<dyn SettingsStore>,
    ) -> Rc<Self> {
        Self::build(config, gateway, settings, None, None)
    }

    /// 带外壳通道与标签页 ID 构造
    pub fn with_shell(
        config: OverlayConfig,
        gateway: Rc<TranslationGateway>,
        settings: Rc<dyn SettingsStore>,
        shell: Rc<dyn ShellChannel>,
        tab_id: Option<String>,
    ) -> Rc<Self> {
        Self::build(config, gateway, settings, Some(shell), tab_id)
    }

    fn build(
        config: OverlayConfig,
        gateway: Rc<TranslationGateway>,
        settings: Rc<dyn SettingsStore>,
        shell: Option<Rc<dyn ShellChannel>>,
        tab_id: Option<String>,
    ) -> Rc<Self> {
        Rc::new(Self {
            target_lang: RefCell::new(config.default_read_lang.clone()),
            config,
            gateway,
            settings,
            shell,
            tab_id,
            enabled: Cell::new(false),
            session: RefCell::new(None),
        })
    }

    /// 接管文档：同步设置，已开启自动翻译时安装观察者并排入首次翻译
    pub async fn attach(self: &Rc<Self>, document: Rc<LiveDocument>) -> TranslationResult<()> {
        if self.is_attached() {
            self.detach();
        }

        let orchestrator =
            TranslationOrchestrator::new(document.clone(), self.gateway.clone(), self.config.clone());
        let weak = Rc::downgrade(self);
        orchestrator.set_scheduler(move |options| {
            if let Some(controller) = weak.upgrade() {
                drop(controller.enqueue_pass(options));
            }
        });

        let smart_input = SmartInput::new(
            document.clone(),
            self.gateway.clone(),
            self.settings.clone(),
            orchestrator.gate().clone(),
            &self.config.default_write_lang,
        );

        let session = Rc::new(Session {
            document,
            orchestrator,
            smart_input,
            queue: TaskQueue::start(),
            observer: TaskSlot::new(),
            debounce: TaskSlot::new(),
            settle: TaskSlot::new(),
            settings_listener: TaskSlot::new(),
        });
        session
            .settings_listener
            .replace(self.spawn_settings_listener());
        *self.session.borrow_mut() = Some(session);
        tracing::info!("控制器已接管页面");

        self.sync_settings().await;
        if self.is_enabled() {
            self.install_observer()?;
            drop(self.enqueue_pass(PassOptions::interactive()));
        }
        Ok(())
    }

    /// 释放页面：停止观察、清空队列与计时器，不还原已写入的译文
    pub fn detach(&self) {
        let Some(session) = self.session.borrow_mut().take() else {
            return;
        };
        session.document.disconnect();
        session.observer.cancel();
        session.debounce.cancel();
        session.settle.cancel();
        session.settings_listener.cancel();
        session.orchestrator.cancel_poll();
        session.queue.close();
        tracing::info!("控制器已释放页面");
    }

    pub fn is_attached(&self) -> bool {
        self.session.borrow().is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn target_lang(&self) -> String {
        self.target_lang.borrow().clone()
    }

    pub fn document(&self) -> Option<Rc<LiveDocument>> {
        self.session.borrow().as_ref().map(|s| s.document.clone())
    }

    pub fn orchestrator(&self) -> Option<Rc<TranslationOrchestrator>> {
        self.session.borrow().as_ref().map(|s| s.orchestrator.clone())
    }

    /// 是否有等待中的防抖补翻
    pub fn has_scheduled_pass(&self) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|s| s.debounce.is_running())
    }

    /// 队列中的任务数
    pub fn pending_tasks(&self) -> usize {
        self.session.borrow().as_ref().map_or(0, |s| s.queue.pending())
    }

    fn current_session(&self) -> TranslationResult<Rc<Session>> {
        self.session
            .borrow()
            .clone()
            .ok_or_else(|| TranslationError::InternalError("控制器尚未接管页面".to_string()))
    }

    // ------------------------------------------------------------------
    // 排队操作
    // ------------------------------------------------------------------

    /// 翻译整页
    pub fn translate_page(self: &Rc<Self>) -> impl Future<Output = TranslationResult<PassReport>> {
        self.enqueue_pass(PassOptions::interactive())
    }

    /// 还原整页
    pub fn revert_page(&self) -> impl Future<Output = TranslationResult<RevertReport>> {
        self.enqueue_with_orchestrator("revertPage", |orchestrator| async move {
            Ok(orchestrator.revert())
        })
    }

    /// 按当前目标语言更新已有译文
    pub fn update_existing_translations(
        self: &Rc<Self>,
    ) -> impl Future<Output = TranslationResult<PassReport>> {
        let weak = Rc::downgrade(self);
        self.enqueue_with_orchestrator("updateExistingTranslations", move |orchestrator| async move {
            let target = current_target(&weak)?;
            orchestrator.update_existing(&target).await
        })
    }

    fn enqueue_pass(
        self: &Rc<Self>,
        options: PassOptions,
    ) -> impl Future<Output = TranslationResult<PassReport>> {
        let weak = Rc::downgrade(self);
        let label = if options.show_indicator {
            "translatePage"
        } else {
            "backgroundPass"
        };
        self.enqueue_with_orchestrator(label, move |orchestrator| async move {
            // 目标语言在执行时读取，排队期间的设置变更也会生效
            let target = current_target(&weak)?;
            orchestrator.run_pass(&target, options).await
        })
    }

    /// 同步入队；返回的 future 只等待结果
    fn enqueue_with_orchestrator<F, Fut, T>(
        &self,
        label: &'static str,
        task: F,
    ) -> impl Future<Output = TranslationResult<T>>
    where
        F: FnOnce(Rc<TranslationOrchestrator>) -> Fut + 'static,
        Fut: Future<Output = TranslationResult<T>> + 'static,
        T: 'static,
    {
        let queued = self.current_session().map(|session| {
            let orchestrator = session.orchestrator.clone();
            session.queue.enqueue(label, task(orchestrator))
        });
        async move { queued?.await? }
    }

    /// 页面翻译状态，直接读取不排队
    pub fn page_status(&self) -> TranslationResult<PageTranslationStatus> {
        let session = self.current_session()?;
        let status = session
            .orchestrator
            .engine()
            .page_status(session.document.document());
        Ok(status)
    }

    /// 处理外壳消息
    pub async fn handle_message(self: &Rc<Self>, message: ShellMessage) -> ShellResponse {
        tracing::debug!("收到外壳消息: {:?}", message);
        match message {
            ShellMessage::TranslatePage => self.translate_page().await.into(),
            ShellMessage::RevertPage => self.revert_page().await.into(),
            ShellMessage::UpdateExistingTranslations => {
                self.update_existing_translations().await.into()
            }
            ShellMessage::GetPageTranslationStatus => match self.page_status() {
                Ok(status) => ShellResponse::with_status(status),
                Err(e) => ShellResponse::failed(&e),
            },
        }
    }

    // ------------------------------------------------------------------
    // 设置
    // ------------------------------------------------------------------

    /// 从外壳 / 存储重新读取开关与目标语言
    pub async fn sync_settings(self: &Rc<Self>) {
        let target = target_read_lang(self.settings.as_ref(), &self.config.default_read_lang).await;
        *self.target_lang.borrow_mut() = target;

        let enabled = resolve_tab_enabled(
            self.shell.as_deref(),
            self.settings.as_ref(),
            self.tab_id.as_deref(),
        )
        .await;
        self.enabled.set(enabled);
        tracing::debug!(
            "设置已同步: enabled={}, target={}",
            enabled,
            self.target_lang.borrow()
        );
    }

    /// 存储变更通知
    pub async fn on_setting_changed(self: &Rc<Self>, change: &SettingChange) {
        match change.key.as_str() {
            KEY_TARGET_READ_LANG => {
                let next = match &change.new {
                    Some(Value::String(lang)) if !lang.trim().is_empty() => lang.clone(),
                    _ => self.config.default_read_lang.clone(),
                };
                if *self.target_lang.borrow() == next {
                    return;
                }
                tracing::info!("目标语言变更: {} → {}", self.target_lang.borrow(), next);
                *self.target_lang.borrow_mut() = next;
                if self.is_attached() {
                    drop(self.update_existing_translations());
                }
            }
            KEY_TOGGLE_STATE | KEY_TOGGLE_STATE_BY_TAB => {
                let enabled = resolve_tab_enabled(
                    None,
                    self.settings.as_ref(),
                    self.tab_id.as_deref(),
                )
                .await;
                if let Err(e) = self.set_enabled(enabled) {
                    tracing::warn!("切换自动翻译失败: {}", e);
                }
            }
            _ => {}
        }
    }

    /// 开关自动翻译；开启时立即排入一次翻译
    pub fn set_enabled(self: &Rc<Self>, enabled: bool) -> TranslationResult<()> {
        if self.enabled.replace(enabled) == enabled {
            return Ok(());
        }
        tracing::info!("自动翻译{}", if enabled { "已开启" } else { "已关闭" });

        let Ok(session) = self.current_session() else {
            return Ok(());
        };
        if enabled {
            self.install_observer()?;
            drop(self.enqueue_pass(PassOptions::interactive()));
        } else {
            session.observer.cancel();
            session.debounce.cancel();
            session.document.disconnect();
        }
        Ok(())
    }

    fn spawn_settings_listener(self: &Rc<Self>) -> JoinHandle<()> {
        let mut changes = self.settings.subscribe();
        let weak = Rc::downgrade(self);
        tokio::task::spawn_local(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(controller) = weak.upgrade() else {
                            break;
                        };
                        controller.on_setting_changed(&change).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("设置通知积压，跳过 {} 条，重新同步", skipped);
                        let Some(controller) = weak.upgrade() else {
                            break;
                        };
                        controller.sync_settings().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // 变更观察
    // ------------------------------------------------------------------

    /// 安装观察者；body 尚不存在时按间隔重试
    fn install_observer(self: &Rc<Self>) -> TranslationResult<()> {
        let session = self.current_session()?;
        if session.observer.is_running() {
            return Ok(());
        }

        let weak = Rc::downgrade(self);
        let document = session.document.clone();
        let retry = self.config.observer_retry_interval();
        session.observer.replace(tokio::task::spawn_local(async move {
            while document.body().is_none() {
                tracing::trace!("body 尚不存在，稍后重试安装观察者");
                tokio::time::sleep(retry).await;
            }
            document.observe();
            tracing::debug!("变更观察者已安装");

            loop {
                document.changed().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.on_mutations();
            }
        }));
        Ok(())
    }

    fn on_mutations(self: &Rc<Self>) {
        let Ok(session) = self.current_session() else {
            return;
        };
        let records = session.document.take_records();
        if records.is_empty() {
            return;
        }

        let foreign = records.iter().filter(|r| introduces_content(r)).count();
        let gate = session.orchestrator.gate();
        if gate.is_suppressed() {
            if foreign > 0 {
                tracing::trace!("编排过程进行中，推迟 {} 条页面变更", foreign);
                gate.defer();
            }
            return;
        }

        if foreign == 0 {
            tracing::trace!("忽略 {} 条自身变更", records.len());
            return;
        }
        if !self.is_enabled() {
            return;
        }

        tracing::debug!("页面新增内容 {} 处，安排补翻", foreign);
        self.schedule_debounced_pass(&session);
    }

    fn schedule_debounced_pass(self: &Rc<Self>, session: &Session) {
        let weak = Rc::downgrade(self);
        let delay = self.config.mutation_debounce();
        session.debounce.replace(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = weak.upgrade() {
                drop(controller.enqueue_pass(PassOptions::background()));
            }
        }));
    }

    // ------------------------------------------------------------------
    // 导航
    // ------------------------------------------------------------------

    /// 页面导航：还原译文、清理界面、重新同步设置，开启时等页面稳定后重新翻译
    pub async fn on_navigation(self: &Rc<Self>, event: NavigationEvent) {
        let Ok(session) = self.current_session() else {
            return;
        };
        tracing::info!("页面导航: {:?}", event);

        session.debounce.cancel();
        session.settle.cancel();
        drop(self.revert_page());
        session.orchestrator.reset_ui();

        self.sync_settings().await;
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.install_observer() {
            tracing::warn!("导航后安装观察者失败: {}", e);
        }

        let weak = Rc::downgrade(self);
        let delay = self.config.navigation_settle_delay();
        session.settle.replace(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = weak.upgrade() {
                drop(controller.enqueue_pass(PassOptions::interactive()));
            }
        }));
    }

    // ------------------------------------------------------------------
    // 输入框翻译
    // ------------------------------------------------------------------

    pub fn focus_in(&self, element: &Handle) {
        if let Ok(session) = self.current_session() {
            session.smart_input.focus_in(element);
        }
    }

    /// 按键；返回 true 表示拦截了默认行为
    pub async fn key_down(&self, key: &KeyPress) -> TranslationResult<bool> {
        let session = self.current_session()?;
        session.smart_input.key_down(key).await
    }
}

impl Drop for OverlayController {
    fn drop(&mut self) {
        self.detach();
    }
}

fn current_target(controller: &Weak<OverlayController>) -> TranslationResult<String> {
    controller
        .upgrade()
        .map(|c| c.target_lang())
        .ok_or_else(|| TranslationError::InternalError("控制器已释放".to_string()))
}
