//! 翻译网关
//!
//! 包装外部翻译能力：可用性查询、实例创建、下载进度、超时与占位文本。
//! 对调用方永不返回错误，所有失败都归约为嵌有原文的占位文本。
//!
//! 下载在后台 `spawn_local` 任务中进行，必须在 `LocalSet` 内使用。

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;

use super::capability::{
    Availability, CapabilityError, LanguagePair, TranslatorCapability, TranslatorHandle,
};
use super::download::{DownloadEvent, ModelDownload};
use super::placeholder::Placeholder;
use crate::translation::storage::cache::TranslationCache;
use crate::translation::config::OverlayConfig;
use crate::translation::pipeline::classifier::LanguageClassifier;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 单次翻译结果
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    /// 为 None 时 `text` 是真实译文
    pub placeholder: Option<Placeholder>,
}

impl Translation {
    fn real(text: String, pair: &LanguagePair) -> Self {
        Self {
            text,
            source_lang: pair.source.clone(),
            target_lang: pair.target.clone(),
            placeholder: None,
        }
    }

    fn placeholder(kind: Placeholder, original: &str, source: &str, target: &str) -> Self {
        Self {
            text: kind.render(target, original),
            source_lang: source.to_string(),
            target_lang: target.to_string(),
            placeholder: Some(kind),
        }
    }

    pub fn pair(&self) -> LanguagePair {
        LanguagePair::new(&self.source_lang, &self.target_lang)
    }

    pub fn is_real(&self) -> bool {
        self.placeholder.is_none()
    }

    pub fn is_download_pending(&self) -> bool {
        self.placeholder == Some(Placeholder::Downloading)
    }
}

/// 下载完成后补做的翻译
#[derive(Debug, Clone, PartialEq)]
pub struct LateTranslation {
    pub original: String,
    pub translated: String,
}

/// 网关旁路事件
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    DownloadProgress {
        pair: LanguagePair,
        percent: u8,
    },
    DownloadReady {
        pair: LanguagePair,
        late_translation: Option<LateTranslation>,
    },
    DownloadFailed {
        pair: LanguagePair,
        error: String,
    },
}

type HandleMap = Rc<RefCell<HashMap<LanguagePair, Rc<dyn TranslatorHandle>>>>;

/// 翻译网关
pub struct TranslationGateway {
    capability: Option<Rc<dyn TranslatorCapability>>,
    classifier: LanguageClassifier,
    timeout: Duration,
    recheck_delay: Duration,
    handles: HandleMap,
    cache: Rc<TranslationCache>,
    downloads: Rc<RefCell<HashSet<LanguagePair>>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl TranslationGateway {
    pub fn new(
        capability: Option<Rc<dyn TranslatorCapability>>,
        classifier: LanguageClassifier,
        config: &OverlayConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            capability,
            classifier: classifier.with_char_limit(config.detector_char_limit),
            timeout: config.translate_timeout(),
            recheck_delay: config.download_recheck_delay(),
            handles: Rc::new(RefCell::new(HashMap::new())),
            cache: Rc::new(TranslationCache::new(config.translation_cache_size)),
            downloads: Rc::new(RefCell::new(HashSet::new())),
            events,
        }
    }

    /// 订阅下载进度 / 完成 / 失败事件
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn classifier(&self) -> &LanguageClassifier {
        &self.classifier
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn has_capability(&self) -> bool {
        self.capability.is_some()
    }

    /// 语言对是否有下载在进行
    pub fn is_downloading(&self, pair: &LanguagePair) -> bool {
        self.downloads.borrow().contains(pair)
    }

    /// 翻译文本；空文本或无需翻译（源语言即目标语言）时返回 None
    pub async fn translate(&self, text: &str, target_lang: &str) -> Option<String> {
        self.translate_detailed(text, target_lang)
            .await
            .map(|translation| translation.text)
    }

    /// 带来源语言与占位类别的翻译
    pub async fn translate_detailed(&self, text: &str, target_lang: &str) -> Option<Translation> {
        if text.trim().is_empty() {
            return None;
        }

        let Some(capability) = self.capability.clone() else {
            tracing::debug!("环境中没有翻译能力");
            return Some(Translation::placeholder(
                Placeholder::CapabilityAbsent,
                text,
                "",
                target_lang,
            ));
        };

        let source = self.classifier.detect(text).await;
        let pair = LanguagePair::new(source, target_lang);
        if pair.is_identity() {
            tracing::trace!("源语言与目标语言相同，跳过: {}", pair);
            return None;
        }

        if let Some(cached) = self.cache.get(&pair, text) {
            return Some(Translation::real(cached, &pair));
        }

        let cached_handle = self.handles.borrow().get(&pair).cloned();
        if let Some(handle) = cached_handle {
            return Some(self.run_translation(handle, &pair, text).await);
        }

        let availability = match capability.availability(&pair).await {
            Ok(availability) => availability,
            Err(CapabilityError::NotSupported) => {
                return Some(Translation::placeholder(
                    Placeholder::CapabilityAbsent,
                    text,
                    &pair.source,
                    &pair.target,
                ));
            }
            Err(e) => {
                tracing::warn!("查询可用性失败 {}: {}", pair, e);
                return Some(self.failed(&pair, text));
            }
        };

        match availability {
            Availability::Available => Some(self.create_and_translate(capability, &pair, text).await),
            Availability::Downloadable => {
                self.start_download(capability, pair.clone(), Some(text.to_string()));
                Some(Translation::placeholder(
                    Placeholder::Downloading,
                    text,
                    &pair.source,
                    &pair.target,
                ))
            }
            Availability::Unavailable => {
                tracing::warn!("语言对不可用: {}", pair);
                Some(Translation::placeholder(
                    Placeholder::Unavailable,
                    text,
                    &pair.source,
                    &pair.target,
                ))
            }
        }
    }

    /// 供轮询使用的可用性查询，错误视为不可用
    pub async fn check_availability(&self, pair: &LanguagePair) -> Availability {
        let Some(capability) = &self.capability else {
            return Availability::Unavailable;
        };
        if self.handles.borrow().contains_key(pair) {
            return Availability::Available;
        }
        match capability.availability(pair).await {
            Ok(availability) => availability,
            Err(e) => {
                tracing::warn!("轮询可用性失败 {}: {}", pair, e);
                Availability::Unavailable
            }
        }
    }

    async fn create_and_translate(
        &self,
        capability: Rc<dyn TranslatorCapability>,
        pair: &LanguagePair,
        text: &str,
    ) -> Translation {
        let created = tokio::time::timeout(self.timeout, capability.create(pair, None)).await;
        let handle = match created {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                tracing::warn!("创建翻译器失败 {}: {}", pair, e);
                return self.failed(pair, text);
            }
            Err(_) => {
                tracing::warn!("创建翻译器超时 {}", pair);
                return self.failed(pair, text);
            }
        };

        self.handles.borrow_mut().insert(pair.clone(), handle.clone());
        self.run_translation(handle, pair, text).await
    }

    async fn run_translation(
        &self,
        handle: Rc<dyn TranslatorHandle>,
        pair: &LanguagePair,
        text: &str,
    ) -> Translation {
        match translate_with_timeout(handle.as_ref(), text, self.timeout).await {
            Some(translated) => {
                self.cache.put(pair, text, &translated);
                Translation::real(translated, pair)
            }
            None => self.failed(pair, text),
        }
    }

    fn failed(&self, pair: &LanguagePair, text: &str) -> Translation {
        Translation::placeholder(Placeholder::Failed, text, &pair.source, &pair.target)
    }

    /// 启动后台下载；同一语言对同时只有一个下载
    fn start_download(
        &self,
        capability: Rc<dyn TranslatorCapability>,
        pair: LanguagePair,
        pending_text: Option<String>,
    ) {
        if !self.downloads.borrow_mut().insert(pair.clone()) {
            tracing::debug!("下载已在进行: {}", pair);
            return;
        }

        let watcher = DownloadWatcher {
            capability,
            pair,
            pending_text,
            timeout: self.timeout,
            recheck_delay: self.recheck_delay,
            handles: self.handles.clone(),
            cache: self.cache.clone(),
            downloads: self.downloads.clone(),
            events: self.events.clone(),
        };
        tokio::task::spawn_local(watcher.run());
    }
}

async fn translate_with_timeout(
    handle: &dyn TranslatorHandle,
    text: &str,
    limit: Duration,
) -> Option<String> {
    match tokio::time::timeout(limit, handle.translate(text)).await {
        Ok(Ok(translated)) => Some(translated),
        Ok(Err(e)) => {
            tracing::warn!("翻译调用失败: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("翻译超时 ({}ms)", limit.as_millis());
            None
        }
    }
}

/// 后台下载监视任务
struct DownloadWatcher {
    capability: Rc<dyn TranslatorCapability>,
    pair: LanguagePair,
    pending_text: Option<String>,
    timeout: Duration,
    recheck_delay: Duration,
    handles: HandleMap,
    cache: Rc<TranslationCache>,
    downloads: Rc<RefCell<HashSet<LanguagePair>>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl DownloadWatcher {
    async fn run(self) {
        let mut download = ModelDownload::start(self.capability.clone(), self.pair.clone());

        while let Some(event) = download.next().await {
            match event {
                DownloadEvent::Progress(percent) => {
                    tracing::debug!("模型下载进度 {}: {}%", self.pair, percent);
                    self.emit(GatewayEvent::DownloadProgress {
                        pair: self.pair.clone(),
                        percent,
                    });
                }
                DownloadEvent::Ready(handle) => self.on_ready(handle).await,
                DownloadEvent::Failed(CapabilityError::RequiresUserActivation(reason)) => {
                    tracing::info!("下载需要用户操作，稍后复查 {}: {}", self.pair, reason);
                    self.recheck().await;
                }
                DownloadEvent::Failed(e) => {
                    tracing::warn!("模型下载失败 {}: {}", self.pair, e);
                    self.emit(GatewayEvent::DownloadFailed {
                        pair: self.pair.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.downloads.borrow_mut().remove(&self.pair);
    }

    async fn on_ready(&self, handle: Rc<dyn TranslatorHandle>) {
        tracing::info!("翻译模型已就绪: {}", self.pair);
        self.handles
            .borrow_mut()
            .insert(self.pair.clone(), handle.clone());

        let mut late_translation = None;
        if let Some(original) = &self.pending_text {
            if let Some(translated) =
                translate_with_timeout(handle.as_ref(), original, self.timeout).await
            {
                self.cache.put(&self.pair, original, &translated);
                late_translation = Some(LateTranslation {
                    original: original.clone(),
                    translated,
                });
            }
        }

        self.emit(GatewayEvent::DownloadReady {
            pair: self.pair.clone(),
            late_translation,
        });
    }

    /// 报错后下载仍可能在进行，复查一次可用性
    async fn recheck(&self) {
        tokio::time::sleep(self.recheck_delay).await;
        match self.capability.availability(&self.pair).await {
            Ok(Availability::Available) => self.emit(GatewayEvent::DownloadReady {
                pair: self.pair.clone(),
                late_translation: None,
            }),
            Ok(Availability::Downloadable) => {
                tracing::info!("模型仍在下载，交由轮询继续跟踪: {}", self.pair);
            }
            Ok(Availability::Unavailable) => self.emit(GatewayEvent::DownloadFailed {
                pair: self.pair.clone(),
                error: "language pair unavailable".to_string(),
            }),
            Err(e) => self.emit(GatewayEvent::DownloadFailed {
                pair: self.pair.clone(),
                error: e.to_string(),
            }),
        }
    }

    fn emit(&self, event: GatewayEvent) {
        // 没有订阅者时丢弃
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use async_trait::async_trait;

    use crate::translation::core::capability::DownloadMonitor;

    struct Upper;

    #[async_trait(?Send)]
    impl TranslatorHandle for Upper {
        async fn translate(&self, text: &str) -> Result<String, CapabilityError> {
            Ok(text.to_uppercase())
        }
    }

    struct Stalled;

    #[async_trait(?Send)]
    impl TranslatorHandle for Stalled {
        async fn translate(&self, _text: &str) -> Result<String, CapabilityError> {
            futures::future::pending().await
        }
    }

    struct Scripted {
        availability: Cell<Availability>,
        create_error: RefCell<Option<CapabilityError>>,
        stalled: bool,
        creates: Cell<usize>,
    }

    impl Scripted {
        fn new(availability: Availability) -> Self {
            Self {
                availability: Cell::new(availability),
                create_error: RefCell::new(None),
                stalled: false,
                creates: Cell::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl TranslatorCapability for Scripted {
        async fn availability(&self, _pair: &LanguagePair) -> Result<Availability, CapabilityError> {
            Ok(self.availability.get())
        }

        async fn create(
            &self,
            _pair: &LanguagePair,
            monitor: Option<DownloadMonitor>,
        ) -> Result<Rc<dyn TranslatorHandle>, CapabilityError> {
            self.creates.set(self.creates.get() + 1);
            if let Some(monitor) = monitor {
                monitor.report(0.5);
                tokio::time::sleep(Duration::from_secs(1)).await;
                monitor.report(1.0);
            }
            if let Some(error) = self.create_error.borrow_mut().take() {
                return Err(error);
            }
            if self.stalled {
                Ok(Rc::new(Stalled))
            } else {
                Ok(Rc::new(Upper))
            }
        }
    }

    fn gateway(capability: Option<Rc<dyn TranslatorCapability>>) -> TranslationGateway {
        TranslationGateway::new(
            capability,
            LanguageClassifier::heuristic_only(),
            &OverlayConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_absent_capability_placeholder() {
        let gateway = gateway(None);
        assert!(!gateway.has_capability());
        let result = gateway.translate_detailed("你好世界", "en").await.expect("result");
        assert_eq!(result.placeholder, Some(Placeholder::CapabilityAbsent));
        assert_eq!(result.text, "[translated:en] 你好世界");
        assert!(gateway.translate("   ", "en").await.is_none());
    }

    #[tokio::test]
    async fn test_available_translates_and_caches_handle() {
        let capability = Rc::new(Scripted::new(Availability::Available));
        let gateway = gateway(Some(capability.clone()));
        assert!(gateway.has_capability());

        assert_eq!(gateway.translate("hello there", "ja").await.as_deref(), Some("HELLO THERE"));
        assert_eq!(gateway.translate("second line", "ja").await.as_deref(), Some("SECOND LINE"));
        assert_eq!(gateway.translate("hello there", "ja").await.as_deref(), Some("HELLO THERE"));
        assert_eq!(capability.creates.get(), 1);
        assert_eq!(gateway.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_identity_pair_is_skipped() {
        let gateway = gateway(Some(Rc::new(Scripted::new(Availability::Available))));
        assert!(gateway.translate("hello there", "en").await.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_and_creation_failure() {
        let gateway_unavailable = gateway(Some(Rc::new(Scripted::new(Availability::Unavailable))));
        let text = gateway_unavailable.translate("hello", "ja").await.expect("placeholder");
        assert_eq!(text, "[翻譯功能暫不可用:ja] hello");

        let failing = Scripted::new(Availability::Available);
        *failing.create_error.borrow_mut() = Some(CapabilityError::Failed("boom".to_string()));
        let gateway_failing = gateway(Some(Rc::new(failing)));
        let text = gateway_failing.translate("hello", "ja").await.expect("placeholder");
        assert_eq!(text, "[翻譯失敗:ja] hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_failed_placeholder() {
        let mut stalled = Scripted::new(Availability::Available);
        stalled.stalled = true;
        let gateway = gateway(Some(Rc::new(stalled)));

        let result = gateway.translate_detailed("hello", "ja").await.expect("result");
        assert_eq!(result.placeholder, Some(Placeholder::Failed));
        assert!(result.text.ends_with("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_reports_progress_and_late_translation() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let capability = Rc::new(Scripted::new(Availability::Downloadable));
                let gateway = gateway(Some(capability.clone()));
                let mut events = gateway.subscribe();

                let first = gateway.translate_detailed("hello", "ja").await.expect("result");
                assert!(first.is_download_pending());
                // 第二次调用不会启动第二个下载
                let second = gateway.translate_detailed("hello", "ja").await.expect("result");
                assert!(second.is_download_pending());
                assert!(gateway.is_downloading(&LanguagePair::new("en", "ja")));

                let mut received = Vec::new();
                loop {
                    let event = events.recv().await.expect("event");
                    let done = matches!(event, GatewayEvent::DownloadReady { .. });
                    received.push(event);
                    if done {
                        break;
                    }
                }

                let pair = LanguagePair::new("en", "ja");
                assert_eq!(
                    received,
                    vec![
                        GatewayEvent::DownloadProgress { pair: pair.clone(), percent: 50 },
                        GatewayEvent::DownloadProgress { pair: pair.clone(), percent: 100 },
                        GatewayEvent::DownloadReady {
                            pair: pair.clone(),
                            late_translation: Some(LateTranslation {
                                original: "hello".to_string(),
                                translated: "HELLO".to_string(),
                            }),
                        },
                    ]
                );
                assert_eq!(capability.creates.get(), 1);
                assert_eq!(gateway.check_availability(&pair).await, Availability::Available);
                assert_eq!(gateway.translate("hello", "ja").await.as_deref(), Some("HELLO"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_activation_error_rechecks_once() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let capability = Rc::new(Scripted::new(Availability::Downloadable));
                *capability.create_error.borrow_mut() =
                    Some(CapabilityError::RequiresUserActivation("gesture".to_string()));
                let gateway = gateway(Some(capability.clone()));
                let mut events = gateway.subscribe();

                gateway.translate("hello", "ja").await;
                capability.availability.set(Availability::Available);

                let ready = loop {
                    match events.recv().await.expect("event") {
                        GatewayEvent::DownloadProgress { .. } => continue,
                        other => break other,
                    }
                };
                assert_eq!(
                    ready,
                    GatewayEvent::DownloadReady {
                        pair: LanguagePair::new("en", "ja"),
                        late_translation: None,
                    }
                );
            })
            .await;
    }
}
