/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Operator-facing diagnostics: the bounded log and its scrollable view.

pub mod log;
pub mod viewport;

pub use self::log::{
    DEFAULT_LOG_CAPACITY, DiagnosticLog, LevelDeltas, LogLevel, LogLine, install_global_logger,
};
pub use self::viewport::{
    LineTone, RenderedLine, Viewport, ViewportAction, ViewportGeometry, ViewportMode,
};
