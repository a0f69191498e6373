// 集成测试公共模块
//
// 提供模拟翻译能力、测试页面与环境构建

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use serde_json::json;

use translationgummy::parsers::html::dom::{find_elements, get_node_attr};
use translationgummy::parsers::html::serialize_node;
use translationgummy::parsers::LiveDocument;
use translationgummy::translation::config::constants::{KEY_TARGET_READ_LANG, KEY_TOGGLE_STATE};
use translationgummy::translation::core::capability::DownloadMonitor;
use translationgummy::translation::storage::TabState;
use translationgummy::translation::{
    Availability, CapabilityError, LanguageClassifier, LanguagePair, MemorySettings,
    OverlayConfig, OverlayController, ShellChannel, TranslationError, TranslationGateway,
    TranslationResult, TranslatorCapability, TranslatorHandle,
};

/// 译文 = `目标语言:原文`
pub struct PrefixTranslator {
    target: String,
    calls: Rc<Cell<usize>>,
}

#[async_trait(?Send)]
impl TranslatorHandle for PrefixTranslator {
    async fn translate(&self, text: &str) -> Result<String, CapabilityError> {
        self.calls.set(self.calls.get() + 1);
        Ok(format!("{}:{}", self.target, text))
    }
}

/// 可切换可用性的模拟翻译能力
///
/// 需要下载时 `create` 永不返回，由测试切换可用性来模拟下载完成
pub struct MockCapability {
    pub availability: Cell<Availability>,
    pub calls: Rc<Cell<usize>>,
}

impl MockCapability {
    pub fn new(availability: Availability) -> Rc<Self> {
        Rc::new(Self {
            availability: Cell::new(availability),
            calls: Rc::new(Cell::new(0)),
        })
    }

    pub fn set(&self, availability: Availability) {
        self.availability.set(availability);
    }

    pub fn translate_calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait(?Send)]
impl TranslatorCapability for MockCapability {
    async fn availability(&self, _pair: &LanguagePair) -> Result<Availability, CapabilityError> {
        Ok(self.availability.get())
    }

    async fn create(
        &self,
        pair: &LanguagePair,
        monitor: Option<DownloadMonitor>,
    ) -> Result<Rc<dyn TranslatorHandle>, CapabilityError> {
        if let Some(monitor) = monitor {
            monitor.report(0.25);
            futures::future::pending::<()>().await;
        }
        Ok(Rc::new(PrefixTranslator {
            target: pair.target.clone(),
            calls: self.calls.clone(),
        }))
    }
}

/// 固定应答的外壳通道，`None` 表示查询失败
pub struct FixedShell {
    pub enabled: Option<bool>,
    pub queries: Cell<usize>,
}

impl FixedShell {
    pub fn new(enabled: Option<bool>) -> Rc<Self> {
        Rc::new(Self {
            enabled,
            queries: Cell::new(0),
        })
    }
}

#[async_trait(?Send)]
impl ShellChannel for FixedShell {
    async fn query_tab_state(&self) -> TranslationResult<TabState> {
        self.queries.set(self.queries.get() + 1);
        match self.enabled {
            Some(enabled) => Ok(TabState {
                tab_id: Some("tab-1".to_string()),
                enabled,
            }),
            None => Err(TranslationError::ShellError("no receiving end".to_string())),
        }
    }
}

/// 测试页面
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub const LONG_PARAGRAPH: &'static str = "This paragraph is comfortably longer than ten chars.";

    /// 50 字符左右的段落、5 字符段落和导航链接
    pub fn create_mixed_page() -> String {
        format!(
            concat!(
                "<html><head><title>t</title></head><body>",
                "<nav><ul><li><a href=\"/\">Home</a></li></ul></nav>",
                "<p id=\"long\">{}</p>",
                "<p id=\"short\">Tiny.</p>",
                "</body></html>"
            ),
            Self::LONG_PARAGRAPH
        )
    }

    pub fn create_single_paragraph() -> String {
        format!(
            "<html><head></head><body><p id=\"long\">{}</p></body></html>",
            Self::LONG_PARAGRAPH
        )
    }

    pub fn by_id(document: &LiveDocument, id: &str) -> Handle {
        find_elements(document.document(), &["p", "a", "div", "li", "span"])
            .into_iter()
            .find(|e| get_node_attr(e, "id").as_deref() == Some(id))
            .unwrap_or_else(|| panic!("element #{id} not found"))
    }

    pub fn first(document: &LiveDocument, tag: &str) -> Handle {
        find_elements(document.document(), &[tag])
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("<{tag}> not found"))
    }

    pub fn body_html(document: &LiveDocument) -> String {
        serialize_node(&document.body().expect("body"))
    }
}

/// 测试环境：文档 + 模拟能力 + 控制器
pub struct TestEnvironment {
    pub document: Rc<LiveDocument>,
    pub capability: Rc<MockCapability>,
    pub settings: Rc<MemorySettings>,
    pub controller: Rc<OverlayController>,
}

impl TestEnvironment {
    pub fn new(html: &str, availability: Availability, auto_translate: bool) -> Self {
        Self::with_config(html, availability, auto_translate, OverlayConfig::default())
    }

    pub fn with_config(
        html: &str,
        availability: Availability,
        auto_translate: bool,
        config: OverlayConfig,
    ) -> Self {
        Self::build(html, availability, auto_translate, config, None)
    }

    /// 通过外壳通道查询标签页开关
    pub fn with_shell(
        html: &str,
        availability: Availability,
        auto_translate: bool,
        shell: Rc<dyn ShellChannel>,
    ) -> Self {
        Self::build(
            html,
            availability,
            auto_translate,
            OverlayConfig::default(),
            Some(shell),
        )
    }

    fn build(
        html: &str,
        availability: Availability,
        auto_translate: bool,
        config: OverlayConfig,
        shell: Option<Rc<dyn ShellChannel>>,
    ) -> Self {
        let document = LiveDocument::parse(html);
        let capability = MockCapability::new(availability);
        let gateway = Rc::new(TranslationGateway::new(
            Some(capability.clone() as Rc<dyn TranslatorCapability>),
            LanguageClassifier::heuristic_only(),
            &config,
        ));
        let settings = Rc::new(MemorySettings::with_values([
            (KEY_TARGET_READ_LANG, json!("ja")),
            (KEY_TOGGLE_STATE, json!(auto_translate)),
        ]));
        let controller = match shell {
            Some(shell) => OverlayController::with_shell(
                config,
                gateway,
                settings.clone(),
                shell,
                Some("tab-1".to_string()),
            ),
            None => OverlayController::new(config, gateway, settings.clone()),
        };
        Self {
            document,
            capability,
            settings,
            controller,
        }
    }

    pub async fn attach(&self) {
        self.controller
            .attach(self.document.clone())
            .await
            .expect("attach");
    }

    /// 等待队列与后台任务跑完
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        while self.controller.pending_tasks() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }
}
