//! 翻译核心模块
//!
//! 对外部翻译能力的封装。调用方只和 `TranslationGateway` 打交道，
//! 能力本身通过 `capability` 中的 trait 注入。
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationGateway (gateway.rs)
//!     ├── LanguageClassifier (pipeline/classifier.rs)
//!     ├── TranslationCache (storage/cache.rs)
//!     ├── ModelDownload (download.rs)
//!     └── TranslatorCapability / TranslatorHandle (capability.rs)
//! ```

pub mod capability;
pub mod download;
pub mod gateway;
pub mod placeholder;

pub use capability::{
    Availability, CapabilityError, DetectionCandidate, DownloadMonitor, LanguageDetector,
    LanguageHintProvider, LanguagePair, TranslatorCapability, TranslatorHandle,
};
pub use download::{DownloadEvent, ModelDownload};
pub use gateway::{GatewayEvent, LateTranslation, Translation, TranslationGateway};
pub use placeholder::{is_download_placeholder, is_placeholder, Placeholder};
