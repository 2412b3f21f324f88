//! Kernel logger backend for the `log` facade
//!
//! Formats records as `[LEVEL] target: message` and hands each line to a
//! registered console sink. The sink is written once, when the logger is
//! installed, and read without a lock afterwards, so a record logged from
//! interrupt context never waits on the code it interrupted. Records logged
//! before the sink is published are dropped.

use core::cell::UnsafeCell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{LevelFilter, Log, Metadata, Record};

use crate::{Error, Result};

/// Byte sink for log output (UART, memory ring, ...)
pub trait ConsoleSink: Sync {
    /// Write a string fragment
    fn write_str(&self, s: &str);
}

/// `log::Log` implementation writing to a [`ConsoleSink`]
pub struct KernelLogger {
    sink: UnsafeCell<Option<&'static dyn ConsoleSink>>,
    published: AtomicBool,
    level: AtomicUsize,
}

// SAFETY: `sink` is written once, before `published` is set, and only read
// after `published` is observed
unsafe impl Sync for KernelLogger {}

static LOGGER: KernelLogger = KernelLogger::new();

impl KernelLogger {
    const fn new() -> Self {
        Self {
            sink: UnsafeCell::new(None),
            published: AtomicBool::new(false),
            level: AtomicUsize::new(LevelFilter::Info as usize),
        }
    }

    fn sink(&self) -> Option<&'static dyn ConsoleSink> {
        if !self.published.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: published, so no further writes happen
        unsafe { *self.sink.get() }
    }

    /// Publish the sink
    ///
    /// # Safety
    ///
    /// Must be called at most once.
    unsafe fn publish(&self, sink: &'static dyn ConsoleSink) {
        *self.sink.get() = Some(sink);
        self.published.store(true, Ordering::Release);
    }

    fn level(&self) -> LevelFilter {
        match self.level.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let Some(sink) = self.sink() else {
            return;
        };

        let mut writer = SinkWriter(sink);
        let _ = writeln!(
            writer,
            "[{:<5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

struct SinkWriter(&'static dyn ConsoleSink);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Compile-time default log level
pub fn default_level() -> LevelFilter {
    if cfg!(feature = "verbose") {
        LevelFilter::Trace
    } else if cfg!(feature = "debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Install the kernel logger
///
/// Only the first call succeeds; a later one leaves the installed sink and
/// level alone.
pub fn init(sink: &'static dyn ConsoleSink, level: LevelFilter) -> Result<()> {
    log::set_logger(&LOGGER).map_err(|_| Error::AlreadyInstalled)?;
    // SAFETY: `set_logger` succeeds once per program
    unsafe { LOGGER.publish(sink) };
    set_level(level);
    Ok(())
}

/// Change the log level at runtime
pub fn set_level(level: LevelFilter) {
    LOGGER.level.store(level as usize, Ordering::Relaxed);
    log::set_max_level(level);
}
