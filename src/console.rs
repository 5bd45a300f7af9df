//! Console Driver Interface and Kernel Logger
//!
//! The console driver itself lives outside this crate. This module defines
//! what the syscall layer needs from it, a `fmt::Write` adapter over it, and
//! the `log` backend that prints kernel log records on it.
//!
//! # Design
//! - `getc` blocks inside the driver until a character is available
//! - `putbuf` writes a whole buffer without interleaving with other writers
//! - The logger is installed once; records below the configured level are
//!   filtered by the `log` facade before any formatting happens

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

/// The console driver.
pub trait Console: Send + Sync {
    /// Read one character, blocking until one is available.
    fn getc(&self) -> u8;

    /// Write `buf` to the console as one unit.
    fn putbuf(&self, buf: &[u8]);
}

impl<T: Console + ?Sized> Console for alloc::sync::Arc<T> {
    fn getc(&self) -> u8 {
        (**self).getc()
    }

    fn putbuf(&self, buf: &[u8]) {
        (**self).putbuf(buf)
    }
}

/// `fmt::Write` over a console, for `write!`/`writeln!`.
pub struct ConsoleWriter<'a, C: ?Sized> {
    console: &'a C,
}

impl<'a, C: Console + ?Sized> ConsoleWriter<'a, C> {
    pub fn new(console: &'a C) -> Self {
        Self { console }
    }
}

impl<C: Console + ?Sized> Write for ConsoleWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.putbuf(s.as_bytes());
        Ok(())
    }
}

/// `log` backend printing on the console.
struct ConsoleLogger {
    console: Once<&'static dyn Console>,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = self.console.get() {
            let mut out = ConsoleWriter::new(*console);
            let _ = writeln!(out, "[{:<5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger {
    console: Once::new(),
};

/// Route `log` records to `console`, showing records up to `level`.
///
/// Fails if a logger is already installed.
pub fn init_logger(console: &'static dyn Console, level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.console.call_once(|| console);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
