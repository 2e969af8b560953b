//! Pipeline callbacks and process-scoped log pooling
//!
//! All callbacks are optional. They run on the processing thread, so a
//! panicking callback is caught at the invocation site and logged rather
//! than rethrown into the stage loop.

use std::collections::VecDeque;
use std::fmt;

use pf_core::{PfError, Sample};

/// Capacity of the per-process log pool; overflow drops the oldest entry
pub const LOG_POOL_CAPACITY: usize = 32;

/// Severity of a pooled log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// One pooled log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub topic: String,
    pub message: String,
    pub context: Option<String>,
}

impl LogEntry {
    pub fn new(
        level: LogLevel,
        topic: impl Into<String>,
        message: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            level,
            topic: topic.into(),
            message: message.into(),
            context,
        }
    }
}

/// Fixed-capacity entry pool, flushed at the end of every `process`
#[derive(Debug, Default)]
pub(crate) struct LogPool {
    entries: VecDeque<LogEntry>,
}

impl LogPool {
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == LOG_POOL_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn drain(&mut self) -> Vec<LogEntry> {
        self.entries.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Chunk view handed to `on_batch` after each stage completes
///
/// The slice borrow is valid only until the callback returns.
pub struct BatchInfo<'a> {
    /// Stage label, e.g. `rms[1]`
    pub stage: &'a str,
    pub samples: &'a [Sample],
    pub start_index: usize,
    pub count: usize,
}

pub type BatchCallback = Box<dyn FnMut(&BatchInfo<'_>) + Send>;
pub type StageCompleteCallback = Box<dyn FnMut(&str, f64) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&str, &PfError) + Send>;
pub type TapCallback = Box<dyn FnMut(&[Sample]) + Send>;
pub type LogCallback = Box<dyn FnMut(&LogEntry) + Send>;
pub type LogBatchCallback = Box<dyn FnMut(&[LogEntry]) + Send>;

/// The optional callback set
#[derive(Default)]
pub struct PipelineCallbacks {
    /// Invoked once per stage per `process` call, after the stage completes
    pub on_batch: Option<BatchCallback>,
    /// Invoked with the stage label and its measured duration in ms
    pub on_stage_complete: Option<StageCompleteCallback>,
    /// Invoked when a stage surfaces a recoverable error
    pub on_error: Option<ErrorCallback>,
    /// Invoked per pooled entry at flush time
    pub on_log: Option<LogCallback>,
    /// Invoked once per flush with all pooled entries
    pub on_log_batch: Option<LogBatchCallback>,
}

impl fmt::Debug for PipelineCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCallbacks")
            .field("on_batch", &self.on_batch.is_some())
            .field("on_stage_complete", &self.on_stage_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_log", &self.on_log.is_some())
            .field("on_log_batch", &self.on_log_batch.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_pool_drops_oldest_on_overflow() {
        let mut pool = LogPool::default();
        for i in 0..LOG_POOL_CAPACITY + 4 {
            pool.push(LogEntry::new(LogLevel::Info, "test", format!("entry {i}"), None));
        }
        let entries = pool.drain();
        assert_eq!(entries.len(), LOG_POOL_CAPACITY);
        assert_eq!(entries[0].message, "entry 4");
        assert!(pool.is_empty());
    }
}
