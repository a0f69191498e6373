//! 日志初始化
//!
//! 级别来自 `GUMMY_LOG_LEVEL`（默认 info），输出到 stderr。

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt;

use crate::env::{core::LogLevel, EnvVar};

/// 解析日志级别，无效值退回 info
pub fn level_from_env() -> Level {
    match LogLevel::get() {
        Ok(level) => Level::from_str(&level).unwrap_or(Level::INFO),
        Err(e) => {
            eprintln!("{}, falling back to info", e);
            Level::INFO
        }
    }
}

/// 安装全局 fmt 订阅器；重复调用时保留已安装的订阅器
pub fn init() {
    init_with_level(level_from_env());
}

pub fn init_with_level(level: Level) {
    let _ = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
}
