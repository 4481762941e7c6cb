use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{stderr, stdout, Write};
use std::sync::{Mutex, Once};

/// Log implementation for standard output streams
///
/// Errors go to standard error, everything else to standard output, next to the probe lines. The
/// mutex keeps lines written from the listener, timeout and scheduler threads from interleaving.
pub struct StdLogger(Mutex<()>);

impl StdLogger {
    /// Initialize logger
    ///
    /// Even if this function is called multiple times, initialization will only be done once. If
    /// another logger has already been installed, that one stays in place.
    pub fn init(verbose: bool) {
        static INIT: Once = Once::new();

        // Initialization may run from more than one thread
        INIT.call_once(|| {
            let level = if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Warn
            };
            if log::set_boxed_logger(Box::new(StdLogger(Mutex::new(())))).is_ok() {
                log::set_max_level(level);
            }
        });
    }

    fn prefix(level: Level) -> &'static str {
        match level {
            Level::Error | Level::Warn => "[-]",
            Level::Info => "[i]",
            Level::Debug | Level::Trace => "[+]",
        }
    }
}

impl Log for StdLogger {
    /// This logger is enabled by default
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let _guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let prefix = Self::prefix(record.level());
        match record.level() {
            Level::Error => {
                let stderr = stderr();
                let mut handle = stderr.lock();
                let _ = writeln!(handle, "{} {}", prefix, record.args());
            }
            _ => {
                let stdout = stdout();
                let mut handle = stdout.lock();
                let _ = writeln!(handle, "{} {}", prefix, record.args());
            }
        }
    }

    /// Flush buffered output stream
    fn flush(&self) {
        let _ = stdout().flush();
    }
}
