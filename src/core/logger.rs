//! A buffered, background-thread logger.
//!
//! A lock-free ring buffer drained by a dedicated flush thread, with a
//! `buffering_enabled` toggle so the controller can disable buffering around
//! startup/shutdown diagnostics and enable it only for the hot run phase.
//! Writes to stderr.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use log::{Level, LevelFilter, Log, Metadata, Record};

const QUEUE_CAPACITY: usize = 100_000;
const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

struct LogLine {
    level: Level,
    target: String,
    message: String,
}

struct Shared {
    queue: ArrayQueue<LogLine>,
    buffering_enabled: AtomicBool,
    shutdown: AtomicBool,
}

pub struct BufferedLogger {
    shared: Arc<Shared>,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
    max_level: LevelFilter,
}

impl BufferedLogger {
    pub fn init(max_level: LevelFilter) -> anyhow::Result<&'static BufferedLogger> {
        let shared = Arc::new(Shared {
            queue: ArrayQueue::new(QUEUE_CAPACITY),
            buffering_enabled: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let flush_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("simctl-logger".to_string())
            .spawn(move || logger_thread_fn(flush_shared))
            .map_err(|e| anyhow::anyhow!("could not spawn logger thread: {e}"))?;

        let logger = Box::leak(Box::new(BufferedLogger {
            shared,
            flush_thread: Mutex::new(Some(handle)),
            max_level,
        }));

        log::set_logger(logger)
            .map_err(|e| anyhow::anyhow!("a logger is already installed: {e}"))?;
        log::set_max_level(max_level);
        Ok(logger)
    }

    /// Enable buffering for the hot run phase; lines are queued rather than
    /// written synchronously.
    pub fn set_buffering_enabled(&self, enabled: bool) {
        self.shared.buffering_enabled.store(enabled, Ordering::SeqCst);
    }

    fn write_line(line: &LogLine) {
        let _ = writeln!(std::io::stderr(), "[{}] {}: {}", line.level, line.target, line.message);
    }

    fn drain(shared: &Shared) {
        while let Some(line) = shared.queue.pop() {
            Self::write_line(&line);
        }
    }
}

fn logger_thread_fn(shared: Arc<Shared>) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(MIN_FLUSH_INTERVAL);
        BufferedLogger::drain(&shared);
    }
    BufferedLogger::drain(&shared);
}

impl Log for BufferedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = LogLine {
            level: record.level(),
            target: record.target().to_string(),
            message: format!("{}", record.args()),
        };
        if self.shared.buffering_enabled.load(Ordering::SeqCst) {
            if self.shared.queue.push(line).is_err() {
                // Queue is full: fall back to a synchronous write rather
                // than dropping the line.
                Self::drain(&self.shared);
                let _ = self.shared.queue.push(LogLine {
                    level: record.level(),
                    target: record.target().to_string(),
                    message: format!("{}", record.args()),
                });
            }
        } else {
            Self::write_line(&LogLine {
                level: record.level(),
                target: record.target().to_string(),
                message: format!("{}", record.args()),
            });
        }
    }

    fn flush(&self) {
        Self::drain(&self.shared);
    }
}

impl Drop for BufferedLogger {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        Self::drain(&self.shared);
        if let Some(handle) = self.flush_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffering_toggle_defaults_to_off() {
        let shared = Shared {
            queue: ArrayQueue::new(4),
            buffering_enabled: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        };
        assert!(!shared.buffering_enabled.load(Ordering::SeqCst));
        shared.buffering_enabled.store(true, Ordering::SeqCst);
        assert!(shared.buffering_enabled.load(Ordering::SeqCst));
    }
}
