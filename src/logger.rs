//! Structured logging with visual formatting.
//!
//! Blueshift's log output is a single vertical pipe of related blocks.
//! `log_block_start` opens a new conceptual block, `log_decorated` and
//! `log_indented` continue it, and the `[WARN]`/`[ERR]`-style levels are
//! for semantic messages that fall outside the box-drawing flow.
//!
//! Logging can be disabled at runtime for quiet operation in tests.

use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Log level enumeration for categorizing message importance.
#[derive(Debug)]
pub enum LogLevel {
    Log,  // Normal operational logs
    Warn, // Warning messages (non-fatal issues)
    Err,  // Error messages (recoverable failures)
    Crit, // Critical errors (may require user intervention)
    Info, // Informational messages (status updates)
}

/// Main logging interface providing structured output formatting.
pub struct Log;

impl Log {
    /// Enable or disable logging temporarily.
    ///
    /// Useful for quiet operation during automated processes or testing
    /// where log output would interfere with results.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Check if logging is currently enabled.
    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Main log function with level-based prefixes.
    pub fn log(level: LogLevel, message: &str) {
        if !Self::is_enabled() {
            return;
        }

        match level {
            LogLevel::Log => print!("[LOG] "),
            LogLevel::Warn => print!("[WARN] "),
            LogLevel::Err => print!("[ERR] "),
            LogLevel::Crit => print!("[CRIT] "),
            LogLevel::Info => print!("[INFO] "),
        }

        println!("{}", message);
    }

    // ═══ Convenience Methods for Common Log Levels ═══

    /// Log an error message (e.g., `[ERR] message`).
    pub fn log_error(message: &str) {
        Self::log(LogLevel::Err, message);
    }

    /// Log a warning message (e.g., `[WARN] message`).
    pub fn log_warning(message: &str) {
        Self::log(LogLevel::Warn, message);
    }

    /// Log an informational message (e.g., `[INFO] message`).
    pub fn log_info(message: &str) {
        Self::log(LogLevel::Info, message);
    }

    /// Log a default debug/operational message (e.g., `[LOG] message`).
    pub fn log_debug(message: &str) {
        Self::log(LogLevel::Log, message);
    }

    /// Log a critical error message (e.g., `[CRIT] message`).
    pub fn log_critical(message: &str) {
        Self::log(LogLevel::Crit, message);
    }

    // ═══ Visual Formatting Functions ═══

    /// Log a decorated message as part of an existing block.
    ///
    /// **Output**: Prints `┣ message`.
    pub fn log_decorated(message: &str) {
        if !Self::is_enabled() {
            return;
        }
        println!("┣ {}", message);
    }

    /// Log an indented message for sub-items or details within a block.
    ///
    /// **Output**: Prints `┃   message` (pipe, three spaces, then message).
    pub fn log_indented(message: &str) {
        if !Self::is_enabled() {
            return;
        }
        println!("┃   {}", message);
    }

    /// Insert a single empty prefixed line (`┃`) for vertical spacing
    /// before a level-prefixed block. Not for use at the end of a block.
    pub fn log_pipe() {
        if !Self::is_enabled() {
            return;
        }
        println!("┃");
    }

    /// Start a new conceptual block of log information.
    ///
    /// **Output**: An empty pipe `┃` for spacing, then `┣ message`.
    pub fn log_block_start(message: &str) {
        if !Self::is_enabled() {
            return;
        }
        println!("┃");
        println!("┣ {}", message);
    }

    /// Log the application version header, once at application start.
    ///
    /// **Output**: `┏ blueshift vX.Y.Z ━━╸`.
    pub fn log_version() {
        if !Self::is_enabled() {
            return;
        }
        println!("┏ blueshift v{} ━━╸", env!("CARGO_PKG_VERSION"));
    }

    /// Log the final termination marker, once at shutdown.
    ///
    /// **Output**: `╹`.
    pub fn log_end() {
        if !Self::is_enabled() {
            return;
        }
        println!("╹");
    }
}
