//! 捕获日志记录的 `log::Log` 实现
//!
//! 测试并行运行时共享同一个日志器，断言时应使用各测试独有的名字过滤。

use std::string::{String, ToString};
use std::sync::Mutex;
use std::vec::Vec;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// 一条被捕获的日志
#[derive(Debug, Clone)]
pub struct CapturedRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// 捕获所有日志的 Mock 日志器
pub struct MockLogger {
    records: Mutex<Vec<CapturedRecord>>,
}

impl MockLogger {
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl Log for MockLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let captured = CapturedRecord {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(captured);
        }
    }

    fn flush(&self) {}
}

/// 全局 Mock 实例
pub static MOCK_LOGGER: MockLogger = MockLogger::new();

/// 安装 [`MOCK_LOGGER`]；已安装其它日志器时保持不变
pub fn init_logger() {
    if log::set_logger(&MOCK_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

/// 所有已捕获日志的快照
pub fn captured() -> Vec<CapturedRecord> {
    MOCK_LOGGER
        .records
        .lock()
        .map(|r| r.clone())
        .unwrap_or_default()
}

/// 是否捕获到指定级别且包含 `needle` 的日志
pub fn contains(level: Level, needle: &str) -> bool {
    captured()
        .iter()
        .any(|r| r.level == level && r.message.contains(needle))
}
