use crate::qemu_fmt::QemuSink;
use core::fmt::{self, Write};
use kernel_sync::{SpinMutex, SyncOnceCell};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Returns the index of the core currently executing, if known yet.
pub type CoreIdFn = fn() -> Option<u32>;

pub struct QemuLogger {
    max_level: LevelFilter,
    core_id: Option<CoreIdFn>,
}

/// Serializes whole lines across cores.
static LINE_LOCK: SpinMutex<()> = SpinMutex::new(());

static LOGGER: SyncOnceCell<QemuLogger> = SyncOnceCell::new();

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            core_id: None,
        }
    }

    /// Prefix every line with the index returned by `core_id`.
    #[must_use]
    pub const fn with_core_id(mut self, core_id: CoreIdFn) -> Self {
        self.core_id = Some(core_id);
        self
    }

    /// Install as the global `log` backend. Call this once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        // A second call leaves the first logger in place and fails in set_logger.
        log::set_logger(LOGGER.get_or_init(|| self))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn write_record(&self, out: &mut impl Write, record: &Record) -> fmt::Result {
        if let Some(core) = self.core_id.and_then(|f| f()) {
            write!(out, "[core {core}]")?;
        }
        writeln!(out, "[{}] {}: {}", record.level(), record.target(), record.args())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _line = LINE_LOCK.lock_irq();
        let _ = self.write_record(&mut QemuSink, record);
    }

    fn flush(&self) {
        // no-op for qemu debug port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn render(logger: &QemuLogger, level: Level, msg: &str) -> String {
        let mut out = String::new();
        logger
            .write_record(
                &mut out,
                &Record::builder()
                    .level(level)
                    .target("kernel_alloc")
                    .args(format_args!("{msg}"))
                    .build(),
            )
            .unwrap();
        out
    }

    #[test]
    fn formats_one_line_per_record() {
        let logger = QemuLogger::new(LevelFilter::Debug);
        assert_eq!(
            render(&logger, Level::Info, "ring has 3 extents"),
            "[INFO] kernel_alloc: ring has 3 extents\n"
        );
    }

    #[test]
    fn prefixes_core_index_when_known() {
        let logger = QemuLogger::new(LevelFilter::Debug).with_core_id(|| Some(2));
        assert_eq!(
            render(&logger, Level::Warn, "late"),
            "[core 2][WARN] kernel_alloc: late\n"
        );

        let unknown = QemuLogger::new(LevelFilter::Debug).with_core_id(|| None);
        assert_eq!(render(&unknown, Level::Warn, "x"), "[WARN] kernel_alloc: x\n");
    }

    #[test]
    fn level_filter_applies() {
        let logger = QemuLogger::new(LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let error = Metadata::builder().level(Level::Error).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&error));
    }
}
