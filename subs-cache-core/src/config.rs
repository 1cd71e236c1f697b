//! Configuration and diagnostics.
//!
//! [`CacheOptions`] configure a cache made through the
//! [`CacheManager`](crate::CacheManager). [`Diagnostics`] holds the global
//! debug toggle and the pluggable log sink shared by every cache made from
//! the same manager.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::Level;

/// Default time-to-live for released subscriptions, in minutes.
pub const DEFAULT_EXPIRE_AFTER_MINUTES: f64 = 5.0;

/// Options for one subscription cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Minutes a released subscription is kept before it is torn down.
    /// Slots without their own `expire_after` use this. `None` subscribes
    /// without a TTL.
    pub expire_after: Option<f64>,
    /// Maximum number of cached subscriptions; `None` is unbounded.
    pub cache_limit: Option<usize>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expire_after: Some(DEFAULT_EXPIRE_AFTER_MINUTES),
            cache_limit: None,
        }
    }
}

/// One diagnostic line, as handed to a custom log sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// When the line was emitted.
    pub at: SystemTime,
    /// Severity.
    pub level: Level,
    /// Component label (`TypeName|instance-id`), when the line concerns one.
    pub component: Option<String>,
    /// Slot id, when the line concerns one.
    pub slot: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Cached Subscription] {} ", self.level)?;
        if let Some(slot) = &self.slot {
            write!(f, "{slot}: ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(component) = &self.component {
            write!(f, " ({component})")?;
        }
        Ok(())
    }
}

/// Custom log sink.
pub type LogSink = Rc<dyn Fn(&LogRecord)>;

/// Debug toggle and logger.
///
/// Every line goes to `tracing`. A sink, when set, receives the same lines
/// as [`LogRecord`]s. Debug lines are produced only while debug mode is on;
/// their message closures are not even evaluated otherwise.
#[derive(Default)]
pub struct Diagnostics {
    debug_mode: Cell<bool>,
    sink: RefCell<Option<LogSink>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.get()
    }

    pub fn set_debug_mode(&self, on: bool) {
        self.debug_mode.set(on);
    }

    /// Replace the log sink. `None` leaves only `tracing` output.
    pub fn set_logger(&self, sink: Option<LogSink>) {
        *self.sink.borrow_mut() = sink;
    }

    /// Emit a transition line when debug mode is on.
    pub fn debug<F>(&self, component: Option<&str>, slot: Option<&str>, message: F)
    where
        F: FnOnce() -> String,
    {
        if self.debug_mode() {
            self.emit(Level::DEBUG, component, slot, message());
        }
    }

    pub fn info(&self, component: Option<&str>, slot: Option<&str>, message: impl Into<String>) {
        self.emit(Level::INFO, component, slot, message.into());
    }

    pub fn warn(&self, component: Option<&str>, slot: Option<&str>, message: impl Into<String>) {
        self.emit(Level::WARN, component, slot, message.into());
    }

    fn emit(&self, level: Level, component: Option<&str>, slot: Option<&str>, message: String) {
        let c = component.unwrap_or("-");
        let s = slot.unwrap_or("-");
        if level == Level::WARN {
            tracing::warn!(component = c, slot = s, "{message}");
        } else if level == Level::INFO {
            tracing::info!(component = c, slot = s, "{message}");
        } else {
            tracing::debug!(component = c, slot = s, "{message}");
        }

        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink(&LogRecord {
                at: SystemTime::now(),
                level,
                component: component.map(str::to_owned),
                slot: slot.map(str::to_owned),
                message,
            });
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("debug_mode", &self.debug_mode())
            .field("has_sink", &self.sink.borrow().is_some())
            .finish()
    }
}
