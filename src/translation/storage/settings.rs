//! 设置存储与外壳通道
//!
//! 语言偏好与开关状态保存在外部存储中（扩展里是 `chrome.storage`），
//! 这里只依赖 `SettingsStore` 契约；`MemorySettings` 是进程内实现。

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::translation::config::constants::{
    KEY_TARGET_READ_LANG, KEY_TARGET_WRITE_LANG, KEY_TOGGLE_STATE, KEY_TOGGLE_STATE_BY_TAB,
};
use crate::translation::error::{TranslationError, TranslationResult};

const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// 一次设置变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// 设置存储
#[async_trait(?Send)]
pub trait SettingsStore {
    async fn get(&self, key: &str) -> TranslationResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> TranslationResult<()>;

    /// 订阅变更通知
    fn subscribe(&self) -> broadcast::Receiver<SettingChange>;
}

/// 进程内设置存储
pub struct MemorySettings {
    values: RefCell<HashMap<String, Value>>,
    changes: broadcast::Sender<SettingChange>,
}

impl MemorySettings {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RefCell::new(HashMap::new()),
            changes,
        }
    }

    /// 以初始值构造，不发出变更通知
    pub fn with_values<K: Into<String>>(values: impl IntoIterator<Item = (K, Value)>) -> Self {
        let settings = Self::new();
        settings
            .values
            .borrow_mut()
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        settings
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.borrow().clone()
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> TranslationResult<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> TranslationResult<()> {
        let old = self
            .values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        if old.as_ref() != Some(&value) {
            tracing::debug!("设置已更新: {}", key);
            // 没有订阅者时丢弃
            let _ = self.changes.send(SettingChange {
                key: key.to_string(),
                old,
                new: Some(value),
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
        self.changes.subscribe()
    }
}

/// 读取字符串设置，缺失或为空时使用默认值
pub async fn get_string(store: &dyn SettingsStore, key: &str, default: &str) -> String {
    match store.get(key).await {
        Ok(Some(Value::String(value))) if !value.trim().is_empty() => value,
        Ok(_) => default.to_string(),
        Err(e) => {
            tracing::warn!("读取设置 {} 失败，使用默认值: {}", key, e);
            default.to_string()
        }
    }
}

/// 页面阅读翻译的目标语言
pub async fn target_read_lang(store: &dyn SettingsStore, default: &str) -> String {
    get_string(store, KEY_TARGET_READ_LANG, default).await
}

/// 输入框翻译的目标语言
pub async fn target_write_lang(store: &dyn SettingsStore, default: &str) -> String {
    get_string(store, KEY_TARGET_WRITE_LANG, default).await
}

/// 从存储读取标签页的开关：先看按标签页的表，再看全局开关
pub async fn stored_tab_enabled(
    store: &dyn SettingsStore,
    tab_id: Option<&str>,
) -> TranslationResult<bool> {
    if let Some(tab_id) = tab_id {
        if let Some(Value::Object(map)) = store.get(KEY_TOGGLE_STATE_BY_TAB).await? {
            if let Some(enabled) = map.get(tab_id).and_then(Value::as_bool) {
                return Ok(enabled);
            }
        }
    }
    Ok(store
        .get(KEY_TOGGLE_STATE)
        .await?
        .and_then(|value| value.as_bool())
        .unwrap_or(false))
}

/// 关闭某个标签页的自动翻译，同时关闭全局开关
pub async fn reset_tab_state(store: &dyn SettingsStore, tab_id: &str) -> TranslationResult<()> {
    if tab_id.is_empty() {
        return Err(TranslationError::InvalidInput("标签页 ID 为空".to_string()));
    }

    let mut map = match store.get(KEY_TOGGLE_STATE_BY_TAB).await? {
        Some(Value::Object(map)) => map,
        Some(other) => {
            tracing::warn!("{} 不是对象，重置为空表: {}", KEY_TOGGLE_STATE_BY_TAB, other);
            Map::new()
        }
        None => Map::new(),
    };
    map.insert(tab_id.to_string(), Value::Bool(false));

    store.set(KEY_TOGGLE_STATE_BY_TAB, Value::Object(map)).await?;
    store.set(KEY_TOGGLE_STATE, Value::Bool(false)).await?;
    tracing::info!("已重置标签页 {} 的翻译状态", tab_id);
    Ok(())
}

/// 标签页状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    pub tab_id: Option<String>,
    pub enabled: bool,
}

/// 与扩展外壳（后台页）的查询通道
#[async_trait(?Send)]
pub trait ShellChannel {
    async fn query_tab_state(&self) -> TranslationResult<TabState>;
}

/// 查询标签页开关；通道失败时退回存储
pub async fn resolve_tab_enabled(
    shell: Option<&dyn ShellChannel>,
    store: &dyn SettingsStore,
    tab_id: Option<&str>,
) -> bool {
    if let Some(shell) = shell {
        match shell.query_tab_state().await {
            Ok(state) => return state.enabled,
            Err(e) => tracing::warn!("查询标签页状态失败，改读存储: {}", e),
        }
    }

    match stored_tab_enabled(store, tab_id).await {
        Ok(enabled) => enabled,
        Err(e) => {
            tracing::warn!("读取开关状态失败: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BrokenShell;

    #[async_trait(?Send)]
    impl ShellChannel for BrokenShell {
        async fn query_tab_state(&self) -> TranslationResult<TabState> {
            Err(TranslationError::ShellError("receiving end does not exist".to_string()))
        }
    }

    struct FixedShell(bool);

    #[async_trait(?Send)]
    impl ShellChannel for FixedShell {
        async fn query_tab_state(&self) -> TranslationResult<TabState> {
            Ok(TabState { tab_id: Some("7".to_string()), enabled: self.0 })
        }
    }

    #[tokio::test]
    async fn test_set_notifies_only_on_change() {
        let settings = MemorySettings::new();
        let mut changes = settings.subscribe();

        settings.set(KEY_TARGET_READ_LANG, json!("ja")).await.unwrap();
        settings.set(KEY_TARGET_READ_LANG, json!("ja")).await.unwrap();
        settings.set(KEY_TARGET_READ_LANG, json!("ko")).await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.old, None);
        assert_eq!(first.new, Some(json!("ja")));
        let second = changes.recv().await.unwrap();
        assert_eq!(second.old, Some(json!("ja")));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_language_defaults() {
        let settings = MemorySettings::with_values([(KEY_TARGET_WRITE_LANG, json!(""))]);
        assert_eq!(target_read_lang(&settings, "en").await, "en");
        assert_eq!(target_write_lang(&settings, "en").await, "en");

        settings.set(KEY_TARGET_READ_LANG, json!("zh-Hant")).await.unwrap();
        assert_eq!(target_read_lang(&settings, "en").await, "zh-Hant");
    }

    #[tokio::test]
    async fn test_tab_flag_takes_precedence_over_global() {
        let settings = MemorySettings::with_values([
            (KEY_TOGGLE_STATE, json!(true)),
            (KEY_TOGGLE_STATE_BY_TAB, json!({ "3": false })),
        ]);
        assert!(!stored_tab_enabled(&settings, Some("3")).await.unwrap());
        assert!(stored_tab_enabled(&settings, Some("4")).await.unwrap());
        assert!(stored_tab_enabled(&settings, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_shell_failure_falls_back_to_storage() {
        let settings = MemorySettings::with_values([(KEY_TOGGLE_STATE_BY_TAB, json!({ "9": true }))]);
        assert!(resolve_tab_enabled(Some(&BrokenShell), &settings, Some("9")).await);
        assert!(!resolve_tab_enabled(Some(&FixedShell(false)), &settings, Some("9")).await);
        assert!(!resolve_tab_enabled(None, &settings, Some("1")).await);
    }

    #[tokio::test]
    async fn test_reset_tab_state() {
        let settings = MemorySettings::with_values([
            (KEY_TOGGLE_STATE, json!(true)),
            (KEY_TOGGLE_STATE_BY_TAB, json!({ "1": true, "2": true })),
        ]);
        reset_tab_state(&settings, "2").await.unwrap();

        let snapshot = settings.snapshot();
        assert_eq!(snapshot[KEY_TOGGLE_STATE], json!(false));
        assert_eq!(snapshot[KEY_TOGGLE_STATE_BY_TAB], json!({ "1": true, "2": false }));
        assert!(reset_tab_state(&settings, "").await.is_err());
    }
}
