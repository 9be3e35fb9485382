//! 捕获日志
//!
//! 一个把所有记录存入内存的 [`log::Log`] 实现，供测试断言某条事件确实被输出。
//! `log` 的全局 logger 只能安装一次，所以 [`CaptureLogger::install`] 返回进程级单例。

use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

/// 一条被捕获的日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    /// 级别
    pub level: Level,
    /// 来源模块
    pub target: String,
    /// 格式化后的消息
    pub message: String,
}

/// 内存日志收集器
#[derive(Debug)]
pub struct CaptureLogger {
    records: Mutex<Vec<CapturedRecord>>,
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: parking_lot::const_mutex(Vec::new()),
};
static INSTALL: Once = Once::new();

impl CaptureLogger {
    /// 安装为全局 logger 并返回它；重复调用返回同一实例。
    ///
    /// 并发调用者都会等到安装完成后才返回。
    pub fn install() -> &'static CaptureLogger {
        INSTALL.call_once(|| {
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(LevelFilter::Trace);
            }
        });
        &LOGGER
    }

    /// 已捕获记录的快照。
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().clone()
    }

    /// 是否存在给定级别且消息包含 `needle` 的记录。
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }

    /// 丢弃已捕获的记录。
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records.lock().push(CapturedRecord {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_records() {
        let logger = CaptureLogger::install();
        log::warn!("capture probe {}", 42);
        assert!(logger.contains(Level::Warn, "capture probe 42"));
        assert!(!logger.contains(Level::Error, "capture probe 42"));
        assert!(std::ptr::eq(logger, CaptureLogger::install()));
    }
}
