/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Bounded in-memory diagnostic log.
//!
//! Every operational event the dashboard wants an operator to see lands here:
//! reload failures, clipboard errors, debug traces. Lines live in a fixed
//! capacity ring guarded by a single mutex, which is also the only lock the
//! viewport takes on its read path. Nothing here touches the terminal.
//!
//! The log is usable before any viewport exists; lines appended early are
//! simply waiting in the ring when the first viewport opens.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use time::OffsetDateTime;
use time::macros::format_description;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Message stored for a marker line. Markers render as [`MARKER_BANNER`].
pub(crate) const MARKER_TEXT: &str = "------";
pub(crate) const MARKER_BANNER: &str =
    "_________________ New Messages Below _______________________";

const NEWLINE_SEPARATOR: &str = " | ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    /// Boundary sentinel: at most one exists in the buffer.
    Marker,
}

impl LogLevel {
    pub fn code(self) -> &'static str {
        match self {
            LogLevel::Debug => "D",
            LogLevel::Info => "I",
            LogLevel::Warn => "W",
            LogLevel::Error => "E",
            LogLevel::Marker => "M",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    level: LogLevel,
    message: String,
    timestamp: OffsetDateTime,
}

impl LogLine {
    pub fn new(level: LogLevel, message: &str, timestamp: OffsetDateTime) -> Self {
        Self {
            level,
            message: message.replace("\r\n", "\n").replace('\n', NEWLINE_SEPARATOR),
            timestamp,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// `<timestamp> <level-code> <message>`, or the banner for a marker.
    pub fn format(&self) -> String {
        self.format_panned(0)
    }

    /// Same as [`Self::format`] with the first `horizontal_offset` characters
    /// of the message dropped. The timestamp and level code are never panned.
    pub fn format_panned(&self, horizontal_offset: usize) -> String {
        if self.level == LogLevel::Marker {
            return MARKER_BANNER.to_string();
        }
        let message: String = self.message.chars().skip(horizontal_offset).collect();
        format!(
            "{} {} {}",
            format_timestamp(self.timestamp),
            self.level.code(),
            message
        )
    }
}

pub(crate) fn format_timestamp(timestamp: OffsetDateTime) -> String {
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let utc = timestamp.to_offset(time::UtcOffset::UTC);
    match utc.format(&format) {
        Ok(text) => format!("{text} UTC"),
        Err(_) => utc.unix_timestamp().to_string(),
    }
}

/// Per-level counts of lines appended while no viewport was open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelDeltas {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

impl LevelDeltas {
    fn record(&mut self, level: LogLevel) {
        match level {
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Error => self.error += 1,
            LogLevel::Marker => {}
        }
    }

    pub fn total(&self) -> usize {
        self.debug + self.info + self.warn + self.error
    }
}

#[derive(Debug, Default)]
struct LogState {
    lines: VecDeque<LogLine>,
    deltas: LevelDeltas,
    open_viewers: usize,
}

#[derive(Debug)]
pub struct DiagnosticLog {
    capacity: usize,
    state: Mutex<LogState>,
    debug_enabled: AtomicBool,
    auto_open_on_error: AtomicBool,
    open_requested: AtomicBool,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is bumped to one so the latest line is always kept.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(LogState {
                lines: VecDeque::with_capacity(capacity),
                ..LogState::default()
            }),
            debug_enabled: AtomicBool::new(false),
            auto_open_on_error: AtomicBool::new(false),
            open_requested: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.debug_enabled.load(Ordering::Relaxed)
    }

    pub fn set_debug_enabled(&self, enabled: bool) {
        self.debug_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn toggle_debug(&self) -> bool {
        let enabled = !self.debug_enabled.fetch_xor(true, Ordering::Relaxed);
        self.info(format!("debugEnabled now set to {enabled}"));
        enabled
    }

    pub fn is_auto_open_on_error(&self) -> bool {
        self.auto_open_on_error.load(Ordering::Relaxed)
    }

    pub fn set_auto_open_on_error(&self, enabled: bool) {
        self.auto_open_on_error.store(enabled, Ordering::Relaxed);
    }

    pub fn toggle_auto_open_on_error(&self) -> bool {
        let enabled = !self.auto_open_on_error.fetch_xor(true, Ordering::Relaxed);
        self.info(format!("autoShowErrorEnabled now set to {enabled}"));
        enabled
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.append(LogLevel::Error, message);
    }

    /// Replaces any existing marker with a new one at the tail.
    pub fn mark(&self) {
        self.append(LogLevel::Marker, MARKER_TEXT);
    }

    pub fn append(&self, level: LogLevel, message: impl AsRef<str>) {
        // Checked before the lock so disabled debug output costs one load.
        if level == LogLevel::Debug && !self.is_debug_enabled() {
            return;
        }
        self.record(LogLine::new(
            level,
            message.as_ref(),
            OffsetDateTime::now_utc(),
        ));
    }

    pub(crate) fn record(&self, line: LogLine) {
        let level = line.level;
        {
            let mut state = self.state.lock();
            if level == LogLevel::Marker {
                state.lines.retain(|existing| existing.level != LogLevel::Marker);
            }
            if state.open_viewers == 0 {
                state.deltas.record(level);
            }
            state.lines.push_back(line);
            while state.lines.len() > self.capacity {
                state.lines.pop_front();
            }
        }
        if level == LogLevel::Error && self.is_auto_open_on_error() {
            self.open_requested.store(true, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of every buffered line, oldest first.
    pub fn lines(&self) -> Vec<LogLine> {
        self.state.lock().lines.iter().cloned().collect()
    }

    /// Runs `read` against the buffered lines while holding the log lock.
    /// Keep `read` short: appends from every worker wait on it.
    pub(crate) fn with_lines<R>(&self, read: impl FnOnce(&VecDeque<LogLine>) -> R) -> R {
        let state = self.state.lock();
        read(&state.lines)
    }

    pub fn message_deltas(&self) -> LevelDeltas {
        self.state.lock().deltas
    }

    /// Most severe non-marker level currently buffered.
    pub fn max_level(&self) -> Option<LogLevel> {
        self.state
            .lock()
            .lines
            .iter()
            .map(LogLine::level)
            .filter(|level| *level != LogLevel::Marker)
            .max()
    }

    /// Plain-text dump of every buffered line, one per row, ignoring any
    /// viewport scroll position.
    pub fn export(&self) -> String {
        self.with_lines(|lines| {
            let mut buffer = String::new();
            for line in lines {
                buffer.push_str(&line.format());
                buffer.push('\n');
            }
            buffer
        })
    }

    pub(crate) fn viewer_opened(&self) {
        let mut state = self.state.lock();
        state.open_viewers += 1;
        state.deltas = LevelDeltas::default();
    }

    pub(crate) fn viewer_closed(&self) {
        let mut state = self.state.lock();
        state.open_viewers = state.open_viewers.saturating_sub(1);
    }

    /// Consumes a pending auto-open request raised by an error line.
    pub(crate) fn take_open_request(&self) -> bool {
        self.open_requested.swap(false, Ordering::AcqRel)
    }
}

struct DiagnosticLogBridge {
    log: Arc<DiagnosticLog>,
}

impl log::Log for DiagnosticLogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        match metadata.level() {
            log::Level::Error | log::Level::Warn => true,
            // Dependencies are chatty below warn; only our own crate gets through.
            log::Level::Info => metadata.target().starts_with(env!("CARGO_CRATE_NAME")),
            log::Level::Debug | log::Level::Trace => {
                self.log.is_debug_enabled()
                    && metadata.target().starts_with(env!("CARGO_CRATE_NAME"))
            }
        }
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug | log::Level::Trace => LogLevel::Debug,
        };
        self.log.append(level, record.args().to_string());
    }

    fn flush(&self) {}
}

/// Routes the `log` facade (`log::warn!` and friends) into `log`.
///
/// Optional: services take their `DiagnosticLog` by injection and work
/// without this. Fails if another logger was installed first.
pub fn install_global_logger(log: Arc<DiagnosticLog>) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(DiagnosticLogBridge { log }))?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
