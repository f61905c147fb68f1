use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// Writes `[LEVEL] target: message` lines to the console (stderr).
pub struct ConsoleLogger {
    max_level: LevelFilter,
}

impl ConsoleLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// [`SetLoggerError`] if a logger is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        static LOGGER: SyncOnceCell<ConsoleLogger> = SyncOnceCell::new();

        let max_level = self.max_level;
        let logger = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // One locked write per record so lines from different cores do not interleave.
        let mut out = std::io::stderr().lock();
        let _ = writeln!(out, "[{}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
