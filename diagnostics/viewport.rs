/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Scrollable view over a [`DiagnosticLog`].
//!
//! A viewport is either closed, tailing (the newest line stays at the bottom
//! as lines arrive) or frozen (the operator scrolled up and is reading
//! history). Scrolling back down to the tail unfreezes it. Closing drops a
//! marker line so the next open shows where new messages begin.
//!
//! Only the render/input context mutates a viewport. Background workers
//! talk to it indirectly: an error line with auto-open enabled raises a
//! request that [`Viewport::poll_auto_open`] consumes on the next tick.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::log::{DiagnosticLog, LogLevel};

pub const WINDOW_HEADER_ROWS: usize = 2;
pub const WINDOW_TITLE: &str = "Top Internal Log View";
pub const WINDOW_HELP: &str = "ENTER:close  UP/DOWN arrow to scroll  a:auto open toggle";

const HORIZONTAL_PAN_STEP: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportMode {
    Closed,
    Tailing,
    Frozen,
}

/// Frame placement inside a terminal of `cols` x `rows` cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportGeometry {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl ViewportGeometry {
    pub fn for_terminal(cols: usize, rows: usize) -> Self {
        let left = 5;
        let mut right = cols.saturating_sub(5);
        if right <= left {
            right = left + 1;
        }
        let top = 3;
        let mut bottom = rows.saturating_sub(2);
        if bottom <= top {
            bottom = top + 1;
        }
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn frame_height(&self) -> usize {
        self.bottom.saturating_sub(self.top).saturating_sub(1)
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    /// Log rows that fit under the title and help rows.
    pub fn visible_rows(&self) -> usize {
        self.frame_height().saturating_sub(WINDOW_HEADER_ROWS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineTone {
    Normal,
    Warn,
    Error,
    Emphasis,
}

impl From<LogLevel> for LineTone {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LineTone::Error,
            LogLevel::Warn => LineTone::Warn,
            LogLevel::Debug | LogLevel::Info => LineTone::Normal,
            LogLevel::Marker => LineTone::Emphasis,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedLine {
    pub text: String,
    pub tone: LineTone,
}

/// Input the viewport understands, already decoded from key events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportAction {
    Close,
    ArrowUp,
    ArrowDown,
    PageUp,
    PageDown,
    PanLeft,
    PanRight,
    CopyToClipboard,
    ToggleDebug,
    ToggleAutoOpen,
    EmitTestMessage(LogLevel),
}

impl ViewportAction {
    /// Key map used while the log view has focus.
    pub fn for_key(key: char) -> Option<Self> {
        match key {
            '\n' | '\u{1b}' | 'x' => Some(ViewportAction::Close),
            'c' => Some(ViewportAction::CopyToClipboard),
            'D' => Some(ViewportAction::ToggleDebug),
            'a' => Some(ViewportAction::ToggleAutoOpen),
            'e' => Some(ViewportAction::EmitTestMessage(LogLevel::Error)),
            'w' => Some(ViewportAction::EmitTestMessage(LogLevel::Warn)),
            'i' => Some(ViewportAction::EmitTestMessage(LogLevel::Info)),
            'd' => Some(ViewportAction::EmitTestMessage(LogLevel::Debug)),
            _ => None,
        }
    }
}

pub struct Viewport {
    log: Arc<DiagnosticLog>,
    mode: ViewportMode,
    // Only meaningful while frozen; tailing derives the offset from the log length.
    offset: usize,
    horizontal_offset: usize,
    visible_rows: usize,
    highlight: bool,
    #[cfg(feature = "clipboard")]
    clipboard: Option<arboard::Clipboard>,
}

impl Viewport {
    pub fn new(log: Arc<DiagnosticLog>) -> Self {
        Self {
            log,
            mode: ViewportMode::Closed,
            offset: 0,
            horizontal_offset: 0,
            visible_rows: ViewportGeometry::for_terminal(80, 24).visible_rows(),
            highlight: false,
            #[cfg(feature = "clipboard")]
            clipboard: None,
        }
    }

    pub fn log(&self) -> &Arc<DiagnosticLog> {
        &self.log
    }

    pub fn mode(&self) -> ViewportMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.mode != ViewportMode::Closed
    }

    pub fn is_frozen(&self) -> bool {
        self.mode == ViewportMode::Frozen
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlight
    }

    pub fn visible_rows(&self) -> usize {
        self.visible_rows
    }

    pub fn horizontal_offset(&self) -> usize {
        self.horizontal_offset
    }

    pub fn resize(&mut self, geometry: ViewportGeometry) {
        self.set_visible_rows(geometry.visible_rows());
    }

    pub fn set_visible_rows(&mut self, visible_rows: usize) {
        if self.mode == ViewportMode::Frozen {
            self.offset = self.current_offset();
        }
        self.visible_rows = visible_rows;
        if self.mode == ViewportMode::Frozen {
            self.offset = self.offset.min(self.max_offset(self.log.len()));
        }
    }

    fn max_offset(&self, total_lines: usize) -> usize {
        total_lines.saturating_sub(self.visible_rows)
    }

    fn offset_for(&self, total_lines: usize) -> usize {
        match self.mode {
            ViewportMode::Frozen => self.offset.min(self.max_offset(total_lines)),
            ViewportMode::Tailing | ViewportMode::Closed => self.max_offset(total_lines),
        }
    }

    /// Index of the first visible line, always within `[0, max(0, L - H)]`.
    pub fn current_offset(&self) -> usize {
        self.offset_for(self.log.len())
    }

    pub fn open(&mut self) {
        if self.is_open() {
            return;
        }
        self.log.viewer_opened();
        self.mode = ViewportMode::Tailing;
        self.offset = self.current_offset();
        self.highlight = true;
    }

    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        self.highlight = false;
        self.mode = ViewportMode::Closed;
        self.log.viewer_closed();
        self.log.mark();
    }

    /// Opens the viewport if an error line asked for it since the last poll.
    pub fn poll_auto_open(&mut self) -> bool {
        if !self.log.take_open_request() || self.is_open() {
            return false;
        }
        self.open();
        true
    }

    pub fn arrow_up(&mut self) {
        if !self.is_open() {
            return;
        }
        let offset = self.current_offset();
        if offset > 0 {
            self.offset = offset - 1;
            self.mode = ViewportMode::Frozen;
        }
    }

    pub fn arrow_down(&mut self) {
        if !self.is_open() {
            return;
        }
        let max_offset = self.max_offset(self.log.len());
        let next = self.current_offset().saturating_add(1).min(max_offset);
        self.offset = next;
        if next >= max_offset {
            self.mode = ViewportMode::Tailing;
        }
    }

    pub fn page_up(&mut self) {
        if !self.is_open() {
            return;
        }
        let offset = self.current_offset();
        if offset > 0 {
            self.offset = offset.saturating_sub(self.visible_rows);
            self.mode = ViewportMode::Frozen;
        }
    }

    pub fn page_down(&mut self) {
        if !self.is_open() {
            return;
        }
        let max_offset = self.max_offset(self.log.len());
        self.offset = self.current_offset().saturating_add(self.visible_rows);
        if self.offset >= max_offset {
            self.offset = max_offset;
            self.mode = ViewportMode::Tailing;
        }
    }

    pub fn pan_left(&mut self) {
        self.horizontal_offset = self.horizontal_offset.saturating_sub(HORIZONTAL_PAN_STEP);
    }

    pub fn pan_right(&mut self) {
        self.horizontal_offset = self.horizontal_offset.saturating_add(HORIZONTAL_PAN_STEP);
    }

    pub fn title(&self) -> String {
        let mut title = WINDOW_TITLE.to_string();
        if self.log.is_auto_open_on_error() {
            title.push_str(", autoShowError:ON");
        }
        if self.log.is_debug_enabled() {
            title.push_str(", DebugMode:ON");
        }
        if self.is_frozen() {
            title.push_str(", AUTO SCROLL OFF");
        }
        title
    }

    /// Title row, help row, then the visible slice of the log.
    pub fn render(&self) -> Vec<RenderedLine> {
        let mut rows = vec![
            RenderedLine {
                text: self.title(),
                tone: if self.is_frozen() {
                    LineTone::Warn
                } else {
                    LineTone::Normal
                },
            },
            RenderedLine {
                text: WINDOW_HELP.to_string(),
                tone: LineTone::Normal,
            },
        ];
        self.log.with_lines(|lines| {
            let offset = self.offset_for(lines.len());
            rows.extend(
                lines
                    .iter()
                    .skip(offset)
                    .take(self.visible_rows)
                    .map(|line| RenderedLine {
                        text: line.format_panned(self.horizontal_offset),
                        tone: LineTone::from(line.level()),
                    }),
            );
        });
        rows
    }

    pub fn export(&self) -> String {
        self.log.export()
    }

    /// Writes the export to `cftop-log-<unix secs>.txt` under `dir`.
    pub fn export_to_file(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let path = dir.join(format!("cftop-log-{secs}.txt"));
        fs::write(&path, self.export())?;
        Ok(path)
    }

    #[cfg(feature = "clipboard")]
    pub fn copy_to_clipboard(&mut self) -> bool {
        if self.clipboard.is_none() {
            self.clipboard = arboard::Clipboard::new().ok();
        }
        let Some(clipboard) = self.clipboard.as_mut() else {
            self.log.error("Copy into Clipboard error: clipboard unavailable");
            return false;
        };
        match clipboard.set_text(self.log.export()) {
            Ok(()) => true,
            Err(err) => {
                self.log.error(format!("Copy into Clipboard error: {err}"));
                false
            }
        }
    }

    #[cfg(not(feature = "clipboard"))]
    pub fn copy_to_clipboard(&mut self) -> bool {
        self.log
            .error("Copy into Clipboard error: built without clipboard support");
        false
    }

    pub fn apply(&mut self, action: ViewportAction) {
        match action {
            ViewportAction::Close => self.close(),
            ViewportAction::ArrowUp => self.arrow_up(),
            ViewportAction::ArrowDown => self.arrow_down(),
            ViewportAction::PageUp => self.page_up(),
            ViewportAction::PageDown => self.page_down(),
            ViewportAction::PanLeft => self.pan_left(),
            ViewportAction::PanRight => self.pan_right(),
            ViewportAction::CopyToClipboard => {
                let _ = self.copy_to_clipboard();
            }
            ViewportAction::ToggleDebug => {
                self.log.toggle_debug();
            }
            ViewportAction::ToggleAutoOpen => {
                self.log.toggle_auto_open_on_error();
            }
            ViewportAction::EmitTestMessage(level) => {
                let label = match level {
                    LogLevel::Error => "ERROR",
                    LogLevel::Warn => "WARN",
                    LogLevel::Info => "INFO",
                    LogLevel::Debug => "DEBUG",
                    LogLevel::Marker => return,
                };
                self.log.append(level, format!("Test {label} Message"));
            }
        }
    }
}

/// A viewport torn down while open stops counting as a viewer. No marker is
/// dropped; that only happens on an explicit close.
impl Drop for Viewport {
    fn drop(&mut self) {
        if self.is_open() {
            self.log.viewer_closed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::log::LogLine;
    use proptest::prelude::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn log_with_lines(count: usize) -> Arc<DiagnosticLog> {
        let log = Arc::new(DiagnosticLog::new());
        for index in 0..count {
            log.info(format!("line {index}"));
        }
        log
    }

    fn open_viewport(log: &Arc<DiagnosticLog>, visible_rows: usize) -> Viewport {
        let mut viewport = Viewport::new(log.clone());
        viewport.set_visible_rows(visible_rows);
        viewport.open();
        viewport
    }

    #[rstest]
    #[case(80, 24, 16)]
    #[case(200, 60, 52)]
    #[case(10, 4, 0)]
    fn geometry_matches_terminal_layout(
        #[case] cols: usize,
        #[case] rows: usize,
        #[case] expected_visible: usize,
    ) {
        let geometry = ViewportGeometry::for_terminal(cols, rows);
        assert_eq!(geometry.visible_rows(), expected_visible);
        assert!(geometry.right > geometry.left);
        assert!(geometry.bottom > geometry.top);
    }

    #[test]
    fn open_tails_the_newest_lines() {
        let log = log_with_lines(30);
        let viewport = open_viewport(&log, 10);

        assert_eq!(viewport.mode(), ViewportMode::Tailing);
        assert_eq!(viewport.current_offset(), 20);
        assert!(viewport.is_highlighted());
    }

    #[test]
    fn tailing_follows_new_lines_and_frozen_does_not() {
        let log = log_with_lines(30);
        let mut viewport = open_viewport(&log, 10);

        log.info("appended while tailing");
        assert_eq!(viewport.current_offset(), 21);

        viewport.arrow_up();
        assert_eq!(viewport.mode(), ViewportMode::Frozen);
        assert_eq!(viewport.current_offset(), 20);
        log.info("appended while frozen");
        assert_eq!(viewport.current_offset(), 20);
    }

    #[test]
    fn scrolling_down_to_the_tail_unfreezes() {
        let log = log_with_lines(30);
        let mut viewport = open_viewport(&log, 10);

        viewport.page_up();
        assert_eq!(viewport.current_offset(), 10);
        assert!(viewport.is_frozen());

        viewport.arrow_down();
        assert_eq!(viewport.current_offset(), 11);
        assert!(viewport.is_frozen());

        viewport.page_down();
        assert_eq!(viewport.current_offset(), 20);
        assert_eq!(viewport.mode(), ViewportMode::Tailing);
    }

    #[test]
    fn arrow_up_at_top_does_not_freeze() {
        let log = log_with_lines(3);
        let mut viewport = open_viewport(&log, 10);

        viewport.arrow_up();
        viewport.page_up();
        assert_eq!(viewport.current_offset(), 0);
        assert_eq!(viewport.mode(), ViewportMode::Tailing);
    }

    #[test]
    fn scrolling_is_ignored_while_closed() {
        let log = log_with_lines(30);
        let mut viewport = Viewport::new(log.clone());
        viewport.set_visible_rows(10);
        viewport.page_up();
        viewport.arrow_up();
        assert_eq!(viewport.mode(), ViewportMode::Closed);
    }

    #[test]
    fn close_unfreezes_and_drops_a_single_marker() {
        let log = log_with_lines(5);
        let mut viewport = open_viewport(&log, 2);
        viewport.arrow_up();
        viewport.close();

        assert_eq!(viewport.mode(), ViewportMode::Closed);
        assert!(!viewport.is_highlighted());
        let lines = log.lines();
        assert_eq!(lines.last().map(LogLine::level), Some(LogLevel::Marker));

        viewport.open();
        viewport.close();
        let markers = log
            .lines()
            .iter()
            .filter(|line| line.level() == LogLevel::Marker)
            .count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn reopen_resets_deltas_collected_while_closed() {
        let log = log_with_lines(0);
        let mut viewport = open_viewport(&log, 10);
        viewport.close();

        log.warn("missed");
        log.error("missed too");
        assert_eq!(log.message_deltas().total(), 2);

        viewport.open();
        assert_eq!(log.message_deltas().total(), 0);
    }

    #[test]
    fn dropping_an_open_viewport_resumes_delta_counting() {
        let log = log_with_lines(3);
        {
            let viewport = open_viewport(&log, 10);
            assert!(viewport.is_open());
        }

        log.warn("after teardown");
        assert_eq!(log.message_deltas().warn, 1);
        assert_ne!(log.lines().last().map(LogLine::level), Some(LogLevel::Marker));

        let mut closed = open_viewport(&log, 10);
        closed.close();
        drop(closed);
        log.error("after close and drop");
        assert_eq!(log.message_deltas().error, 1);
    }

    #[test]
    fn auto_open_is_consumed_on_poll() {
        let log = log_with_lines(0);
        log.set_auto_open_on_error(true);
        let mut viewport = Viewport::new(log.clone());

        assert!(!viewport.poll_auto_open());
        log.error("reload failed");
        assert!(viewport.poll_auto_open());
        assert!(viewport.is_open());
        assert!(!viewport.poll_auto_open());
    }

    #[test]
    fn pan_clamps_at_zero() {
        let log = log_with_lines(0);
        let mut viewport = Viewport::new(log);
        viewport.pan_left();
        assert_eq!(viewport.horizontal_offset(), 0);
        viewport.pan_right();
        viewport.pan_right();
        viewport.pan_left();
        assert_eq!(viewport.horizontal_offset(), 5);
    }

    #[test]
    fn title_reflects_toggles_and_freeze() {
        let log = log_with_lines(20);
        let mut viewport = open_viewport(&log, 5);
        assert_eq!(viewport.title(), "Top Internal Log View");

        viewport.apply(ViewportAction::ToggleAutoOpen);
        viewport.apply(ViewportAction::ToggleDebug);
        viewport.apply(ViewportAction::ArrowUp);
        assert_eq!(
            viewport.title(),
            "Top Internal Log View, autoShowError:ON, DebugMode:ON, AUTO SCROLL OFF"
        );
    }

    #[test]
    fn render_shows_headers_and_panned_visible_slice() {
        let log = Arc::new(DiagnosticLog::new());
        for message in ["alpha one", "bravo two", "charlie three", "delta four"] {
            log.record(LogLine::new(
                LogLevel::Warn,
                message,
                datetime!(2024-03-05 07:08:09.123 UTC),
            ));
        }
        let mut viewport = open_viewport(&log, 2);
        viewport.pan_right();

        let rows: Vec<String> = viewport.render().into_iter().map(|row| row.text).collect();
        insta::assert_debug_snapshot!(rows, @r###"
        [
            "Top Internal Log View",
            "ENTER:close  UP/DOWN arrow to scroll  a:auto open toggle",
            "2024-03-05 07:08:09.123 UTC W ie three",
            "2024-03-05 07:08:09.123 UTC W  four",
        ]
        "###);
    }

    #[test]
    fn export_ignores_scroll_position() {
        let log = log_with_lines(12);
        let mut viewport = open_viewport(&log, 3);
        viewport.page_up();
        viewport.page_up();

        assert_eq!(viewport.export().lines().count(), 12);
    }

    #[test]
    fn export_to_file_writes_every_line() {
        let log = log_with_lines(4);
        let viewport = Viewport::new(log);
        let dir = tempfile::TempDir::new().expect("temp dir");

        let path = viewport.export_to_file(dir.path()).expect("export should write");
        let written = fs::read_to_string(path).expect("export should be readable");
        assert_eq!(written.lines().count(), 4);
        assert!(written.contains(" I line 3"));
    }

    #[test]
    fn test_message_keys_append_at_their_level() {
        let log = log_with_lines(0);
        let mut viewport = Viewport::new(log.clone());
        for key in ['e', 'w', 'i', 'd'] {
            let action = ViewportAction::for_key(key).expect("test message key");
            viewport.apply(action);
        }
        let levels: Vec<LogLevel> = log.lines().iter().map(LogLine::level).collect();
        assert_eq!(levels, vec![LogLevel::Error, LogLevel::Warn, LogLevel::Info]);
    }

    #[derive(Clone, Copy, Debug)]
    enum Scroll {
        Up,
        Down,
        PageUp,
        PageDown,
        Append,
    }

    fn scroll_strategy() -> impl Strategy<Value = Scroll> {
        prop_oneof![
            Just(Scroll::Up),
            Just(Scroll::Down),
            Just(Scroll::PageUp),
            Just(Scroll::PageDown),
            Just(Scroll::Append),
        ]
    }

    proptest! {
        #[test]
        fn proptest_scroll_offset_stays_in_bounds(
            initial in 0_usize..60,
            visible in 0_usize..20,
            steps in prop::collection::vec(scroll_strategy(), 0..80)
        ) {
            let log = Arc::new(DiagnosticLog::with_capacity(40));
            for index in 0..initial {
                log.info(index.to_string());
            }
            let mut viewport = open_viewport(&log, visible);
            for step in steps {
                match step {
                    Scroll::Up => viewport.arrow_up(),
                    Scroll::Down => viewport.arrow_down(),
                    Scroll::PageUp => viewport.page_up(),
                    Scroll::PageDown => viewport.page_down(),
                    Scroll::Append => log.info("appended"),
                }
                let max_offset = log.len().saturating_sub(visible);
                prop_assert!(viewport.current_offset() <= max_offset);
                prop_assert!(viewport.render().len() <= WINDOW_HEADER_ROWS + visible);
            }
        }
    }
}
