//! Structured Logging with Sensitive Data Redaction
//!
//! Log lines go to stderr as `timestamp LEVEL [module] message | k=v ...`.
//! Field values are redacted by key name:
//! - key material (`secret`, `seed`, `mnemonic`, `xpriv`, ...) is never printed
//! - raw transaction payloads (`psbt`, `tx_hex`) are reduced to their length
//! - addresses and transaction ids are shortened to a prefix and suffix
//!
//! The logger is configured once by the process entry point through [`init`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static REDACTION_ENABLED: AtomicBool = AtomicBool::new(true);

/// Configure the logger. Called by the entry point after settings are loaded.
pub fn init(debug: bool, redact: bool) {
    DEBUG_ENABLED.store(debug, Ordering::SeqCst);
    REDACTION_ENABLED.store(redact, Ordering::SeqCst);
}

pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

fn is_redaction_enabled() -> bool {
    REDACTION_ENABLED.load(Ordering::SeqCst)
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured log entry
#[derive(Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub module: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEntry {
    pub fn new(level: LogLevel, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            module,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field, redacted according to its key
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let value_str = value.to_string();
        let shown = if is_redaction_enabled() {
            redact_if_sensitive(key, &value_str)
        } else if is_key_material(key) {
            // Key material is withheld even with redaction turned off
            redact_value(&value_str)
        } else {
            value_str
        };
        self.fields.push((key, shown));
        self
    }

    pub fn render(&self) -> String {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let fields_str = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        if fields_str.is_empty() {
            format!("[{}] {} [{}] {}", timestamp, self.level, self.module, self.message)
        } else {
            format!(
                "[{}] {} [{}] {} | {}",
                timestamp, self.level, self.module, self.message, fields_str
            )
        }
    }

    pub fn log(self) {
        if self.level == LogLevel::Debug && !is_debug_enabled() {
            return;
        }
        eprintln!("{}", self.render());
    }
}

fn is_key_material(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    ["private", "secret", "seed", "mnemonic", "passphrase", "wif", "xpriv", "tweak"]
        .iter()
        .any(|k| key_lower.contains(k))
}

fn redact_if_sensitive(key: &str, value: &str) -> String {
    if is_key_material(key) {
        return redact_value(value);
    }

    let key_lower = key.to_lowercase();

    if ["psbt", "tx_hex", "raw_tx", "invoice"].iter().any(|k| key_lower.contains(k)) {
        return redact_value(value);
    }

    if ["address", "signer", "recipient"].iter().any(|k| key_lower.contains(k)) {
        return redact_address(value);
    }

    if ["txid", "tx_id", "hash"].iter().any(|k| key_lower.contains(k)) {
        return redact_hash(value);
    }

    value.to_string()
}

fn redact_value(value: &str) -> String {
    if value.is_empty() {
        return "[EMPTY]".to_string();
    }

    let len = value.len();
    if len <= 4 {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED:{}chars]", len)
    }
}

/// Show the first 6 and last 4 characters of an address
fn redact_address(address: &str) -> String {
    let trimmed = address.trim();

    if trimmed.is_empty() {
        return "[EMPTY]".to_string();
    }

    // Address lists are logged joined by commas
    if trimmed.contains(',') {
        return trimmed
            .split(',')
            .map(redact_address)
            .collect::<Vec<_>>()
            .join(",");
    }

    if trimmed.len() <= 13 {
        return redact_value(trimmed);
    }

    format!("{}...{}", &trimmed[..6], &trimmed[trimmed.len() - 4..])
}

/// Show the first 10 and last 6 characters of a hash
fn redact_hash(hash: &str) -> String {
    let trimmed = hash.trim();

    if trimmed.is_empty() {
        return "[EMPTY]".to_string();
    }

    if trimmed.len() <= 20 {
        return trimmed.to_string();
    }

    format!("{}...{}", &trimmed[..10], &trimmed[trimmed.len() - 6..])
}

#[macro_export]
macro_rules! log_debug {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Debug,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Debug,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

#[macro_export]
macro_rules! log_info {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Info,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Info,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

#[macro_export]
macro_rules! log_warn {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Warn,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Warn,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

#[macro_export]
macro_rules! log_error {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Error,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Error,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}
